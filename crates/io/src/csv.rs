// CSV/TSV source import

use std::path::Path;

use fiscal_recon::config::ColumnOverrides;
use fiscal_recon::model::RawRow;

use crate::error::IoError;
use crate::table::{assemble_rows, resolve_columns, text_cell};

/// Load a delimited export as raw rows. The delimiter is sniffed.
pub fn load(path: &Path, overrides: &ColumnOverrides) -> Result<Vec<RawRow>, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::read(path, e))?;
    let content = decode_text(bytes);
    let origin = display_name(path);
    parse(&content, overrides, &origin)
}

/// Parse delimited text whose first record is the header.
pub fn parse(content: &str, overrides: &ColumnOverrides, origin: &str) -> Result<Vec<RawRow>, IoError> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .map_err(|e| IoError::Csv(format!("{origin}: {e}")))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => {
            tracing::warn!("{origin}: empty file");
            return Ok(Vec::new());
        }
    };

    let map = resolve_columns(&headers, overrides, origin)?;

    let mut body = Vec::new();
    for record in records {
        let record = record.map_err(|e| IoError::Csv(format!("{origin}: {e}")))?;
        body.push(record.iter().map(text_cell).collect());
    }

    let rows = assemble_rows(&map, body, origin, 2);
    tracing::debug!("{origin}: {} rows (delimiter {:?})", rows.len(), delimiter as char);
    Ok(rows)
}

/// Delimiters tried by [`sniff_delimiter`]. On a tie the earlier entry wins.
const DELIMITERS: &[u8] = &[b';', b'\t', b',', b'|'];

/// Lines sampled, header included.
const SNIFF_LINES: usize = 10;

/// Pick the delimiter that splits the header into the most columns while the
/// sampled data lines keep that same column count. Falls back to `,`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(SNIFF_LINES).collect();

    let mut best = (b',', 0usize);
    for &delimiter in DELIMITERS {
        let counts: Vec<usize> = sample.iter().map(|line| field_count(line, delimiter)).collect();
        let Some(&header_fields) = counts.first() else {
            break;
        };
        if header_fields < 2 {
            continue;
        }
        let agreeing = counts.iter().filter(|&&n| n == header_fields).count();
        let score = agreeing * header_fields;
        if score > best.1 {
            best = (delimiter, score);
        }
    }
    best.0
}

/// Quote-aware field count of a single line.
fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}

/// Decode file bytes as UTF-8, falling back to Windows-1252 (common for
/// Excel-exported CSVs and older ERP XML).
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
