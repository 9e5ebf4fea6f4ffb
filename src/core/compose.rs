//! Purpose: Compose headers, files, URLs, and stdin into one ordered stream.
//! Exports: `ComposeOptions`, `StdinInput`, `ComposedStream`, `compose`,
//! `SkipLinesReader`.
//! Role: Central aggregation step; opens sources lazily in precedence order,
//! registers every closable handle with the resource tracker, and wraps the
//! result with the transcoder when csv mode resolves.
//! Invariants: Sources open one at a time; a failed open releases everything
//! opened before it, on every path.
//! Invariants: Every source is followed by exactly one separator.
//! Invariants: The skip-lines transform applies to the last non-literal
//! source only, never to synthetic headers.

use std::fs::File;
use std::io::{self, Cursor, IsTerminal, Read};
use std::path::PathBuf;

use crate::core::cancel::CancelToken;
use crate::core::csv2lp::CsvToLines;
use crate::core::encoding::Decoder;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{Format, FormatSelector};
use crate::core::rejects::RejectedRowFile;
use crate::core::source::{Source, resolve_sources};
use crate::core::track::{ReleaseHandle, ResourceTracker};

const SEPARATOR: &[u8] = b"\n";

/// Immutable per-invocation configuration. Built once by the caller from
/// already-validated values; nothing in here mutates across calls.
#[derive(Debug, Default)]
pub struct ComposeOptions {
    pub format: Option<Format>,
    pub headers: Vec<String>,
    pub files: Vec<PathBuf>,
    pub urls: Vec<String>,
    pub argument: Option<String>,
    pub encoding: String,
    pub skip_lines: usize,
    pub skip_row_on_error: bool,
    pub log_table_columns: bool,
    pub ignore_data_type_in_column_name: bool,
    pub errors_path: Option<PathBuf>,
}

impl ComposeOptions {
    pub fn new() -> Self {
        Self {
            encoding: "UTF-8".to_string(),
            ..Self::default()
        }
    }
}

/// Standard input as seen by one run. Tests substitute an in-memory reader;
/// production callers use [`StdinInput::process`].
pub struct StdinInput {
    pub reader: Box<dyn Read + Send>,
    pub is_terminal: bool,
}

impl StdinInput {
    pub fn process() -> Self {
        let stdin = io::stdin();
        Self {
            is_terminal: stdin.is_terminal(),
            reader: Box::new(stdin),
        }
    }

    pub fn piped(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            is_terminal: false,
        }
    }

    pub fn terminal() -> Self {
        Self {
            reader: Box::new(io::empty()),
            is_terminal: true,
        }
    }
}

/// Result of a successful composition: the ordered stream, the combined
/// release operation for everything opened along the way, and the format the
/// run resolved to.
pub struct ComposedStream {
    pub stream: Box<dyn Read + Send>,
    pub release: ReleaseHandle,
    pub format: Format,
}

impl std::fmt::Debug for ComposedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedStream")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Builds the composed input stream for one run.
///
/// Resolution order is fixed: literal headers, files, URLs, then one of
/// stdin/inline-argument. URL fetches are eager, sequential, and blocking;
/// `cancel` is checked before each one. On any failure everything opened so
/// far is released before the error is returned.
pub fn compose(
    options: &ComposeOptions,
    stdin: StdinInput,
    cancel: &CancelToken,
) -> Result<ComposedStream, Error> {
    // Config validation happens before any resource is opened.
    let decoder = Decoder::for_label(&options.encoding)?;
    let mut selector = FormatSelector::new(options.format);
    let sources = resolve_sources(
        &options.headers,
        &options.files,
        &options.urls,
        options.argument.as_deref(),
        stdin.is_terminal,
    );

    let mut tracker = ResourceTracker::new();
    let opened = open_sources(
        &sources,
        decoder,
        &mut selector,
        &mut tracker,
        stdin.reader,
        cancel,
    );
    let (mut readers, last_skippable) = match opened {
        Ok(parts) => parts,
        Err(err) => return Err(release_now(tracker, err)),
    };

    if options.skip_lines > 0
        && let Some(index) = last_skippable
    {
        let inner = std::mem::replace(&mut readers[index], Box::new(io::empty()));
        readers[index] = Box::new(SkipLinesReader::new(inner, options.skip_lines));
    }

    let format = selector.resolve();
    let mut stream: Box<dyn Read + Send> = Box::new(ChainReader::new(readers));

    if format == Format::Csv {
        let mut transcoder = CsvToLines::new(stream)
            .skip_row_on_error(options.skip_row_on_error)
            .log_table_columns(options.log_table_columns)
            .ignore_data_type_in_column_name(options.ignore_data_type_in_column_name)
            .with_line_number(options.skip_lines as i64 - options.headers.len() as i64);
        if let Some(path) = &options.errors_path {
            let sink = match RejectedRowFile::create(path) {
                Ok(sink) => sink,
                Err(err) => return Err(release_now(tracker, err)),
            };
            transcoder = transcoder.with_reject_sink(Box::new(sink));
        }
        stream = Box::new(transcoder);
    }

    Ok(ComposedStream {
        stream,
        release: tracker.into_release_handle(),
        format,
    })
}

fn release_now(tracker: ResourceTracker, err: Error) -> Error {
    tracker.into_release_handle().release();
    err
}

type Readers = Vec<Box<dyn Read + Send>>;

fn open_sources(
    sources: &[Source],
    decoder: Decoder,
    selector: &mut FormatSelector,
    tracker: &mut ResourceTracker,
    stdin: Box<dyn Read + Send>,
    cancel: &CancelToken,
) -> Result<(Readers, Option<usize>), Error> {
    let mut readers: Readers = Vec::with_capacity(sources.len() * 2);
    let mut last_skippable = None;
    let mut stdin = Some(stdin);
    let agent = ureq::AgentBuilder::new().build();

    for source in sources {
        match source {
            Source::Header(text) => {
                selector.note_headers(1);
                readers.push(Box::new(Cursor::new(text.clone().into_bytes())));
            }
            Source::Inline(text) => {
                // Inline text is literal: no decode, no skip transform.
                readers.push(Box::new(Cursor::new(text.clone().into_bytes())));
            }
            Source::File(path) => {
                let file = File::open(path).map_err(|err| {
                    Error::new(ErrorKind::SourceOpen)
                        .with_message("failed to open file")
                        .with_path(path)
                        .with_source(err)
                })?;
                selector.note_file(&path.to_string_lossy());
                let tracked = tracker.track(path.display().to_string(), Box::new(file));
                readers.push(decoder.wrap(Box::new(tracked)));
                last_skippable = Some(readers.len() - 1);
            }
            Source::Url(addr) => {
                cancel.check()?;
                let parsed = url::Url::parse(addr).map_err(|err| {
                    Error::new(ErrorKind::SourceOpen)
                        .with_message("failed to parse url")
                        .with_url(addr)
                        .with_source(err)
                })?;
                let response = match agent.request("GET", addr).call() {
                    Ok(response) => response,
                    Err(ureq::Error::Status(code, _)) => {
                        return Err(Error::new(ErrorKind::SourceOpen)
                            .with_message(format!("response status_code={code}"))
                            .with_url(addr));
                    }
                    Err(ureq::Error::Transport(err)) => {
                        return Err(Error::new(ErrorKind::SourceOpen)
                            .with_message("failed to fetch url")
                            .with_url(addr)
                            .with_source(err));
                    }
                };
                selector.note_url(parsed.path(), response.header("Content-Type"));
                let tracked = tracker.track(addr.clone(), Box::new(response.into_reader()));
                readers.push(decoder.wrap(Box::new(tracked)));
                last_skippable = Some(readers.len() - 1);
            }
            Source::Stdin => {
                let reader = stdin.take().ok_or_else(|| {
                    Error::new(ErrorKind::Internal).with_message("stdin used twice")
                })?;
                readers.push(decoder.wrap(reader));
                last_skippable = Some(readers.len() - 1);
            }
        }
        readers.push(Box::new(SEPARATOR));
    }

    Ok((readers, last_skippable))
}

/// Sequential concatenation of per-source readers. Pulls from one reader at
/// a time; no buffering beyond what a single read call requires.
struct ChainReader {
    readers: Readers,
    index: usize,
}

impl ChainReader {
    fn new(readers: Readers) -> Self {
        Self { readers, index: 0 }
    }
}

impl Read for ChainReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.index < self.readers.len() {
            let read = self.readers[self.index].read(buf)?;
            if read > 0 {
                return Ok(read);
            }
            self.index += 1;
        }
        Ok(0)
    }
}

/// Discards a fixed number of leading physical lines, then passes bytes
/// through untouched.
pub struct SkipLinesReader<R> {
    inner: R,
    remaining: usize,
}

impl<R: Read> SkipLinesReader<R> {
    pub fn new(inner: R, lines: usize) -> Self {
        Self {
            inner,
            remaining: lines,
        }
    }
}

impl<R: Read> Read for SkipLinesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.remaining > 0 {
            let read = self.inner.read(buf)?;
            if read == 0 {
                self.remaining = 0;
                return Ok(0);
            }
            let mut resume = read;
            for (offset, byte) in buf[..read].iter().enumerate() {
                if *byte == b'\n' {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        resume = offset + 1;
                        break;
                    }
                }
            }
            if self.remaining == 0 && resume < read {
                buf.copy_within(resume..read, 0);
                return Ok(read - resume);
            }
        }
        self.inner.read(buf)
    }
}
