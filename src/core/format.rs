//! Purpose: Resolve the transport format for one composition run.
//! Exports: `Format`, `FormatSelector`, `CSV_SUFFIX`, `CSV_CONTENT_TYPE`.
//! Role: Shared inference policy applied while sources are resolved in order.
//! Invariants: An explicit format always wins and skips inference entirely.
//! Invariants: The first inference signal freezes the mode for the run; later
//! sources never override it, even when they would imply a different mode.

pub const CSV_SUFFIX: &str = ".csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    LineProtocol,
    Csv,
}

impl Format {
    /// Parses an explicit format name from configuration.
    pub fn parse(name: &str) -> Result<Self, crate::core::error::Error> {
        match name {
            "lp" => Ok(Format::LineProtocol),
            "csv" => Ok(Format::Csv),
            other => Err(crate::core::error::Error::new(crate::core::error::ErrorKind::Config)
                .with_message(format!("unsupported input format: {other}"))),
        }
    }
}

/// Per-run format resolution. Constructed with any explicit override, then
/// fed signals in source-resolution order.
#[derive(Clone, Copy, Debug)]
pub struct FormatSelector {
    resolved: Option<Format>,
}

impl FormatSelector {
    pub fn new(explicit: Option<Format>) -> Self {
        Self { resolved: explicit }
    }

    /// Literal headers with no explicit format imply a structured table.
    pub fn note_headers(&mut self, count: usize) {
        if self.resolved.is_none() && count > 0 {
            self.resolved = Some(Format::Csv);
        }
    }

    pub fn note_file(&mut self, name: &str) {
        if self.resolved.is_none() && name.ends_with(CSV_SUFFIX) {
            self.resolved = Some(Format::Csv);
        }
    }

    pub fn note_url(&mut self, path: &str, content_type: Option<&str>) {
        if self.resolved.is_some() {
            return;
        }
        let by_path = path.ends_with(CSV_SUFFIX);
        let by_type = content_type.is_some_and(|value| value.starts_with(CSV_CONTENT_TYPE));
        if by_path || by_type {
            self.resolved = Some(Format::Csv);
        }
    }

    /// Line protocol is the default assumption when no signal fired.
    pub fn resolve(&self) -> Format {
        self.resolved.unwrap_or(Format::LineProtocol)
    }
}
