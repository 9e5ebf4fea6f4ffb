//! Purpose: Normalize independently-encoded byte sources to UTF-8.
//! Exports: `Decoder`.
//! Role: Wraps each opened source so downstream stages see clean UTF-8.
//! Invariants: Unknown labels fail before any resource is opened.
//! Invariants: UTF-8 input passes through without an extra adapter.

use std::io::Read;

use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::core::error::{Error, ErrorKind};

/// Per-run decoder resolved once from a WHATWG encoding label.
#[derive(Clone, Copy, Debug)]
pub struct Decoder {
    encoding: &'static Encoding,
}

impl Decoder {
    /// Resolves an encoding label such as `UTF-8`, `latin1`, or `windows-1250`.
    pub fn for_label(label: &str) -> Result<Self, Error> {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) => Ok(Self { encoding }),
            None => Err(Error::new(ErrorKind::Config)
                .with_message(format!("unsupported encoding: {label}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Wraps a raw byte source with a transcoding reader. UTF-8 sources are
    /// returned untouched.
    pub fn wrap(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        if self.encoding == encoding_rs::UTF_8 {
            return reader;
        }
        Box::new(
            DecodeReaderBytesBuilder::new()
                .encoding(Some(self.encoding))
                .build(reader),
        )
    }
}
