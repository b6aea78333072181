//! Tabular (delimited text) adapter.
//!
//! Decodes an uploaded file as comma-delimited UTF-8 text with a header row.
//! Fields may be double-quoted; a doubled quote inside a quoted field escapes
//! it. Embedded newlines inside quoted fields are not supported.
//!
//! The adapter enforces the required-column contract up front and drops every
//! column that is not on the known allow-list, so raw extras never enter the
//! pipeline. The batch `content_hash` is the SHA-256 of the raw bytes.

use sha2::{Digest, Sha256};

use super::{Column, ParsedBatch, RowMap};
use crate::error::{Error, Result};

/// Upper bound on data rows per upload.
pub const MAX_ROWS: usize = 2_000_000;

/// Parse uploaded bytes into rows and a content hash.
///
/// # Errors
///
/// - [`Error::BadRequest`] for empty input, non-UTF-8 input, or more than
///   [`MAX_ROWS`] data rows
/// - [`Error::MissingRequiredColumn`] when the header lacks required columns
pub fn parse_tabular(bytes: &[u8]) -> Result<ParsedBatch> {
    if bytes.is_empty() {
        return Err(Error::BadRequest("empty file".to_string()));
    }

    let content_hash = hex::encode(Sha256::digest(bytes));

    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::BadRequest("file is not valid UTF-8".to_string()))?;

    let mut lines = text.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| Error::BadRequest("empty file".to_string()))?;

    // Header cell -> known column, or None for dropped extras.
    let layout: Vec<Option<Column>> = split_fields(header_line)
        .iter()
        .map(|h| Column::from_header(h))
        .collect();

    let missing: Vec<&'static str> = Column::REQUIRED
        .iter()
        .filter(|required| !layout.contains(&Some(**required)))
        .map(|c| c.name())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingRequiredColumn(missing));
    }

    let has_status_column = layout.contains(&Some(Column::RecordStatus));

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if rows.len() >= MAX_ROWS {
            return Err(Error::BadRequest(format!(
                "too many rows: exceeds {MAX_ROWS}"
            )));
        }

        let mut row = RowMap::new();
        for (value, slot) in split_fields(line).into_iter().zip(layout.iter()) {
            if let Some(column) = slot {
                row.set(*column, value);
            }
        }
        rows.push(row);
    }

    Ok(ParsedBatch {
        rows,
        has_status_column,
        content_hash,
    })
}

/// Split one line into fields, honoring double quotes.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
