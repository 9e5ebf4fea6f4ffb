//! Purpose: Tag every input the aggregator may draw from.
//! Exports: `Source`, `resolve_sources`.
//! Role: Replaces reader-type sniffing with one exhaustive variant resolved
//! before anything is opened.
//! Invariants: Fixed precedence: headers, files, URLs, then one of
//! stdin/inline; insertion order is kept within each kind.
//! Invariants: At most one of `Stdin`/`Inline` appears per run.

use std::path::PathBuf;

/// One input to compose. `Header` and `Inline` are literal text and carry no
/// release obligation; the rest resolve to closable handles at open time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Source {
    Header(String),
    File(PathBuf),
    Url(String),
    Stdin,
    Inline(String),
}

impl Source {
    /// Literal sources are in-memory text: never decoded, never skipped,
    /// never tracked for release.
    pub fn is_literal(&self) -> bool {
        matches!(self, Source::Header(_) | Source::Inline(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Source::Header(_) => "header".to_string(),
            Source::File(path) => path.display().to_string(),
            Source::Url(url) => url.clone(),
            Source::Stdin => "stdin".to_string(),
            Source::Inline(_) => "argument".to_string(),
        }
    }
}

/// Resolves the ordered source list for one run.
///
/// An argument of the form `@path` is shorthand for one more file; `-` forces
/// stdin; any other non-empty argument is literal inline text. With no
/// argument, stdin participates only when it is not an interactive terminal.
pub fn resolve_sources(
    headers: &[String],
    files: &[PathBuf],
    urls: &[String],
    arg: Option<&str>,
    stdin_is_terminal: bool,
) -> Vec<Source> {
    let mut sources = Vec::with_capacity(headers.len() + files.len() + urls.len() + 2);
    for header in headers {
        sources.push(Source::Header(header.clone()));
    }
    for file in files {
        sources.push(Source::File(file.clone()));
    }

    let mut arg = arg;
    if let Some(value) = arg
        && let Some(path) = value.strip_prefix('@')
        && !path.is_empty()
    {
        sources.push(Source::File(PathBuf::from(path)));
        arg = None;
    }

    for url in urls {
        sources.push(Source::Url(url.clone()));
    }

    match arg {
        None | Some("") => {
            if !stdin_is_terminal {
                sources.push(Source::Stdin);
            }
        }
        Some("-") => sources.push(Source::Stdin),
        Some(text) => sources.push(Source::Inline(text.to_string())),
    }

    sources
}
