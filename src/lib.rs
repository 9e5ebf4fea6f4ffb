//! Purpose: Compose mixed input sources into one line-protocol byte stream.
//! Exports: `compose` plus the source, format, tracking, and transcoding
//! types it is built from.
//! Invariants: Composition either returns an open stream with a release
//! handle or fails having already released everything it opened.
//! Invariants: Configuration is immutable per invocation; no state bleeds
//! between runs.

pub mod core;

pub use crate::core::cancel::CancelToken;
pub use crate::core::compose::{
    ComposeOptions, ComposedStream, SkipLinesReader, StdinInput, compose,
};
pub use crate::core::csv2lp::CsvToLines;
pub use crate::core::encoding::Decoder;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::{Format, FormatSelector};
pub use crate::core::rejects::{RejectSink, RejectedRowFile};
pub use crate::core::source::{Source, resolve_sources};
pub use crate::core::track::{ReleaseHandle, ResourceTracker, TrackedReader};
pub use crate::core::write::{BatchWriter, dry_run, finish_write};
