//! Row-level cleanup of source CSV files.
//!
//! Quoting is disabled while reading, so quote characters are ordinary data
//! and a field can never contain the delimiter or a line break. That makes
//! the unquoted output re-parse to the same records, which is what keeps
//! `sanitize` idempotent.

use crate::domain::model::SanitizedPayload;
use crate::utils::error::{EtlError, Result};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};

pub const DEFAULT_DELIMITER: u8 = b',';

pub fn sanitize(raw: &[u8]) -> Result<SanitizedPayload> {
    sanitize_with_delimiter(raw, DEFAULT_DELIMITER)
}

/// Drops records whose field count differs from the header's and rewrites
/// the rest verbatim. Only undecodable input is an error.
pub fn sanitize_with_delimiter(raw: &[u8], delimiter: u8) -> Result<SanitizedPayload> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .quoting(false)
        .flexible(true)
        .from_reader(raw);

    let header = reader.headers().map_err(malformed)?.clone();
    if header.is_empty() {
        return Err(EtlError::malformed("source file", "no header row"));
    }

    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(raw.len()));
    writer.write_record(&header)?;

    let mut kept_rows = 0;
    let mut dropped_rows = 0;
    let mut record = StringRecord::new();
    while reader.read_record(&mut record).map_err(malformed)? {
        if record.len() != header.len() {
            dropped_rows += 1;
            continue;
        }
        writer.write_record(&record)?;
        kept_rows += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::Io(e.into_error()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| EtlError::malformed("sanitized output", e.to_string()))?;

    Ok(SanitizedPayload {
        text,
        header: header.iter().map(str::to_string).collect(),
        kept_rows,
        dropped_rows,
    })
}

fn malformed(err: csv::Error) -> EtlError {
    let position = err
        .position()
        .map(|p| format!(" at line {}", p.line()))
        .unwrap_or_default();
    EtlError::malformed("source file", format!("{}{}", err, position))
}
