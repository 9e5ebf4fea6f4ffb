//! Purpose: Hand-off seam between composition and the network write stage.
//! Exports: `BatchWriter`, `dry_run`, `finish_write`.
//! Role: The batch writer itself is an external collaborator; this module
//! only defines its contract and the cancellation outcome policy.
//! Invariants: Operator cancellation is a clean termination, not a failure.
//! Invariants: Strict-mode row rejections surface through the stream copy
//! with their original error intact.

use std::io::{self, Read, Write};

use crate::core::error::{Error, ErrorKind};

/// Consumes the fully-composed stream and performs the network write,
/// including batching and transport retry. Out of scope here; implemented by
/// the ingestion tool around this crate.
pub trait BatchWriter {
    fn write(&mut self, org: &str, bucket: &str, stream: &mut dyn Read) -> Result<(), Error>;
}

/// Copies the composed stream to a sink instead of writing it to the
/// database. Returns the number of bytes copied.
pub fn dry_run(stream: &mut dyn Read, out: &mut dyn Write) -> Result<u64, Error> {
    io::copy(stream, out).map_err(unwrap_stream_error)
}

/// Maps an operator-initiated cancellation to a clean termination; every
/// other outcome passes through unchanged.
pub fn finish_write(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(err) if err.kind() == ErrorKind::Cancelled => Ok(()),
        other => other,
    }
}

// Strict-abort rejections travel through the io layer boxed; recover the
// original error instead of wrapping it again.
fn unwrap_stream_error(err: io::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(inner) => inner,
        Err(err) => Error::new(ErrorKind::Io)
            .with_message("failed to copy stream")
            .with_source(err),
    }
}
