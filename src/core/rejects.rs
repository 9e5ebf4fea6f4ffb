//! Purpose: Side channel for rows the transcoder refuses to convert.
//! Exports: `RejectSink`, `RejectedRowFile`.
//! Role: Preserves rejected rows with their original formatting so a run can
//! be repaired and replayed; never interferes with the main stream.
//! Invariants: A sink callback never raises; write failures are logged only.
//! Invariants: Output is flushed after every row so it survives a crash.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::StringRecord;

use crate::core::error::{Error, ErrorKind};

/// Rejection capability handed to the transcoder at construction. Called
/// synchronously with the row's original fields and the delimiter the
/// rejecting stream used.
pub trait RejectSink: Send {
    fn on_rejected_row(&mut self, delimiter: u8, error: &Error, row: &StringRecord);
}

/// Persists rejected rows as CSV: a `# error : ...` annotation record
/// followed by the raw row, using the same delimiter as the input.
pub struct RejectedRowFile {
    out: Box<dyn Write + Send>,
}

impl RejectedRowFile {
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path).map_err(|err| {
            Error::new(ErrorKind::SourceOpen)
                .with_message("failed to create errors file")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self {
            out: Box::new(file),
        })
    }

    pub fn from_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl RejectSink for RejectedRowFile {
    fn on_rejected_row(&mut self, delimiter: u8, error: &Error, row: &StringRecord) {
        tracing::warn!(%error, "row rejected");
        // One-shot writer per row: the delimiter follows the input stream
        // and the annotation record has a different field count.
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_writer(&mut self.out);
        if let Err(err) = writer.write_record([format!("# error : {error}")]) {
            tracing::warn!(%err, "unable to write to errors file");
            return;
        }
        if let Err(err) = writer.write_record(row) {
            tracing::warn!(%err, "unable to write to errors file");
            return;
        }
        if let Err(err) = writer.flush() {
            tracing::warn!(%err, "unable to flush errors file");
        }
    }
}
