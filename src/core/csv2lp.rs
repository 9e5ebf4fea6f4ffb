//! Purpose: Convert structured-table rows into line protocol on the fly.
//! Exports: `CsvToLines`.
//! Role: Transcoder wrapped around the composed stream in csv mode; rejects
//! individual rows through the configured sink instead of aborting.
//! Invariants: The header row defines the column mapping for the whole run.
//! Invariants: Line numbering is seeded by the aggregator so diagnostics
//! refer to the original file, not the synthetic concatenation.
//! Invariants: In strict mode the first rejected row aborts the stream.

use std::io::{self, Read};

use csv::{ReaderBuilder, StringRecord};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};
use crate::core::rejects::RejectSink;

const DEFAULT_DELIMITER: u8 = b',';

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FieldType {
    String,
    Double,
    Long,
    UnsignedLong,
    Boolean,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TimeFormat {
    Rfc3339,
    Number,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ColumnRole {
    Measurement,
    Tag,
    Field(FieldType),
    Time(TimeFormat),
    Ignored,
}

#[derive(Clone, Debug)]
struct Column {
    name: String,
    role: ColumnRole,
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<Column>,
}

impl Table {
    fn from_header(record: &StringRecord, ignore_data_type: bool) -> Self {
        let columns = record
            .iter()
            .map(|label| parse_label(label, ignore_data_type))
            .collect();
        Self { columns }
    }

    fn convert(&self, record: &StringRecord, line: i64) -> Result<String, Error> {
        let mut measurement: Option<&str> = None;
        let mut tags: Vec<(&str, &str)> = Vec::new();
        let mut fields: Vec<String> = Vec::new();
        let mut timestamp: Option<i64> = None;

        for (index, column) in self.columns.iter().enumerate() {
            let value = record.get(index).unwrap_or("");
            match column.role {
                ColumnRole::Ignored => {}
                ColumnRole::Measurement => {
                    if !value.is_empty() {
                        measurement = Some(value);
                    }
                }
                ColumnRole::Tag => {
                    if !value.is_empty() {
                        tags.push((column.name.as_str(), value));
                    }
                }
                ColumnRole::Field(field_type) => {
                    if value.is_empty() {
                        continue;
                    }
                    fields.push(encode_field(&column.name, field_type, value, line)?);
                }
                ColumnRole::Time(time_format) => {
                    if value.is_empty() {
                        continue;
                    }
                    timestamp = Some(parse_time(&column.name, time_format, value, line)?);
                }
            }
        }

        let measurement = measurement.ok_or_else(|| {
            Error::new(ErrorKind::RowRejected)
                .with_message("no measurement supplied")
                .with_line(line)
        })?;
        if fields.is_empty() {
            return Err(Error::new(ErrorKind::RowRejected)
                .with_message("no field data found")
                .with_line(line));
        }

        // Line protocol expects tag keys in lexical order.
        tags.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = escape(measurement, &[',', ' ']);
        for (key, value) in tags {
            out.push(',');
            out.push_str(&escape(key, &[',', '=', ' ']));
            out.push('=');
            out.push_str(&escape(value, &[',', '=', ' ']));
        }
        out.push(' ');
        out.push_str(&fields.join(","));
        if let Some(timestamp) = timestamp {
            out.push(' ');
            out.push_str(&timestamp.to_string());
        }
        Ok(out)
    }
}

fn parse_label(label: &str, ignore_data_type: bool) -> Column {
    let label = label.trim();
    if !ignore_data_type
        && let Some((name, annotation)) = label.split_once(':')
        && let Some(role) = role_for(annotation)
    {
        return Column {
            name: name.to_string(),
            role,
        };
    }
    Column {
        name: label.to_string(),
        role: default_role(label),
    }
}

fn role_for(annotation: &str) -> Option<ColumnRole> {
    match annotation {
        "measurement" => Some(ColumnRole::Measurement),
        "tag" => Some(ColumnRole::Tag),
        "ignored" => Some(ColumnRole::Ignored),
        "field" | "string" => Some(ColumnRole::Field(FieldType::String)),
        "double" => Some(ColumnRole::Field(FieldType::Double)),
        "long" => Some(ColumnRole::Field(FieldType::Long)),
        "unsignedLong" => Some(ColumnRole::Field(FieldType::UnsignedLong)),
        "boolean" => Some(ColumnRole::Field(FieldType::Boolean)),
        "dateTime" | "dateTime:RFC3339" => Some(ColumnRole::Time(TimeFormat::Rfc3339)),
        "dateTime:number" => Some(ColumnRole::Time(TimeFormat::Number)),
        _ => None,
    }
}

fn default_role(name: &str) -> ColumnRole {
    match name {
        "_measurement" => ColumnRole::Measurement,
        "_time" => ColumnRole::Time(TimeFormat::Rfc3339),
        _ => ColumnRole::Field(FieldType::String),
    }
}

fn encode_field(name: &str, field_type: FieldType, value: &str, line: i64) -> Result<String, Error> {
    let key = escape(name, &[',', '=', ' ']);
    let rejected = |type_name: &str| {
        Error::new(ErrorKind::RowRejected)
            .with_message(format!("column {name}: invalid {type_name} value {value:?}"))
            .with_line(line)
    };
    let encoded = match field_type {
        FieldType::String => {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{key}=\"{escaped}\"")
        }
        FieldType::Double => {
            let parsed: f64 = value.parse().map_err(|_| rejected("double"))?;
            format!("{key}={parsed}")
        }
        FieldType::Long => {
            let parsed: i64 = value.parse().map_err(|_| rejected("long"))?;
            format!("{key}={parsed}i")
        }
        FieldType::UnsignedLong => {
            let parsed: u64 = value.parse().map_err(|_| rejected("unsignedLong"))?;
            format!("{key}={parsed}u")
        }
        FieldType::Boolean => match value.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => format!("{key}=true"),
            "false" | "f" | "0" => format!("{key}=false"),
            _ => return Err(rejected("boolean")),
        },
    };
    Ok(encoded)
}

fn parse_time(name: &str, format: TimeFormat, value: &str, line: i64) -> Result<i64, Error> {
    let rejected = || {
        Error::new(ErrorKind::RowRejected)
            .with_message(format!("column {name}: invalid dateTime value {value:?}"))
            .with_line(line)
    };
    match format {
        TimeFormat::Number => value.parse::<i64>().map_err(|_| rejected()),
        TimeFormat::Rfc3339 => {
            let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| rejected())?;
            i64::try_from(parsed.unix_timestamp_nanos()).map_err(|_| rejected())
        }
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Streaming CSV-to-line-protocol transcoder. Reads table rows from the
/// composed input and yields converted protocol lines on demand.
pub struct CsvToLines<R: Read> {
    reader: csv::Reader<R>,
    record: StringRecord,
    table: Option<Table>,
    line_number: i64,
    skip_row_on_error: bool,
    log_table_columns: bool,
    ignore_data_type: bool,
    delimiter: u8,
    sink: Option<Box<dyn RejectSink>>,
    pending: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> CsvToLines<R> {
    pub fn new(input: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(DEFAULT_DELIMITER)
            .from_reader(input);
        Self {
            reader,
            record: StringRecord::new(),
            table: None,
            line_number: 0,
            skip_row_on_error: false,
            log_table_columns: false,
            ignore_data_type: false,
            delimiter: DEFAULT_DELIMITER,
            sink: None,
            pending: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Log rejections and continue instead of aborting the stream.
    pub fn skip_row_on_error(mut self, enabled: bool) -> Self {
        self.skip_row_on_error = enabled;
        self
    }

    /// Dump the parsed column mapping once the header row is read.
    pub fn log_table_columns(mut self, enabled: bool) -> Self {
        self.log_table_columns = enabled;
        self
    }

    /// Treat `:type` suffixes in column labels as part of the column name.
    pub fn ignore_data_type_in_column_name(mut self, enabled: bool) -> Self {
        self.ignore_data_type = enabled;
        self
    }

    /// Seeds the physical line counter. The aggregator passes a negative
    /// baseline when synthetic header lines were prepended.
    pub fn with_line_number(mut self, line_number: i64) -> Self {
        self.line_number = line_number;
        self
    }

    pub fn with_reject_sink(mut self, sink: Box<dyn RejectSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    fn reject(&mut self, error: Error, row: &StringRecord) -> io::Result<()> {
        if !self.skip_row_on_error {
            self.done = true;
            return Err(io::Error::other(error));
        }
        match self.sink.as_mut() {
            Some(sink) => sink.on_rejected_row(self.delimiter, &error, row),
            None => tracing::warn!(%error, "row rejected"),
        }
        Ok(())
    }

    /// Pulls records until one converts (filling `pending`) or input ends.
    fn next_line(&mut self) -> io::Result<bool> {
        loop {
            let has_record = match self.reader.read_record(&mut self.record) {
                Ok(has_record) => has_record,
                Err(err) => {
                    if err.is_io_error() {
                        self.done = true;
                        if let csv::ErrorKind::Io(io_err) = err.into_kind() {
                            return Err(io_err);
                        }
                        return Err(io::Error::other("csv read failed"));
                    }
                    self.line_number += 1;
                    let rejection = Error::new(ErrorKind::RowRejected)
                        .with_message(err.to_string())
                        .with_line(self.line_number);
                    self.reject(rejection, &StringRecord::new())?;
                    continue;
                }
            };
            if !has_record {
                self.done = true;
                return Ok(false);
            }
            self.line_number += 1;

            if self.table.is_none() {
                let table = Table::from_header(&self.record, self.ignore_data_type);
                if self.log_table_columns {
                    tracing::debug!(columns = ?table.columns, "csv table columns");
                }
                self.table = Some(table);
                continue;
            }

            let line = self.line_number;
            let converted = self
                .table
                .as_ref()
                .map(|table| table.convert(&self.record, line));
            match converted {
                Some(Ok(text)) => {
                    self.pending.clear();
                    self.pending.extend_from_slice(text.as_bytes());
                    self.pending.push(b'\n');
                    self.pos = 0;
                    return Ok(true);
                }
                Some(Err(error)) => {
                    let row = self.record.clone();
                    self.reject(error, &row)?;
                }
                None => {
                    self.done = true;
                    return Ok(false);
                }
            }
        }
    }
}

impl<R: Read> Read for CsvToLines<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            if self.done || !self.next_line()? {
                return Ok(0);
            }
        }
        let available = &self.pending[self.pos..];
        let take = available.len().min(buf.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.pos += take;
        Ok(take)
    }
}
