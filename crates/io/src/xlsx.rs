// Excel source import (xlsx, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Days, NaiveDate};

use fiscal_recon::config::ColumnOverrides;
use fiscal_recon::model::{RawRow, RawValue};

use crate::csv::display_name;
use crate::error::IoError;
use crate::table::{assemble_rows, resolve_columns, text_cell};

/// Load the first worksheet as raw rows. Row 1 is the header.
///
/// Numeric cells stay numbers so that amount scaling sees the stored value;
/// date cells become ISO dates.
pub fn load(path: &Path, overrides: &ColumnOverrides) -> Result<Vec<RawRow>, IoError> {
    let origin = display_name(path);

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| IoError::Xlsx(format!("failed to open {origin}: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IoError::Xlsx(format!("{origin} contains no sheets")))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IoError::Xlsx(format!("failed to read sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(cells) => cells.iter().map(header_text).collect(),
        None => {
            tracing::warn!("{origin}: sheet '{sheet_name}' is empty");
            return Ok(Vec::new());
        }
    };

    let map = resolve_columns(&headers, overrides, &origin)?;
    let body: Vec<Vec<Option<RawValue>>> = rows.map(|cells| cells.iter().map(cell_value).collect()).collect();

    // Range starts at the first used cell, so line numbers are relative to it.
    let first_line = range.start().map_or(1, |(row, _)| row as usize + 1) + 1;
    let rows = assemble_rows(&map, body, &origin, first_line);
    tracing::debug!("{origin}: {} rows from sheet '{sheet_name}'", rows.len());
    Ok(rows)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Option<RawValue> {
    match cell {
        Data::Empty => None,
        Data::String(s) => text_cell(s),
        Data::Float(n) => Some(RawValue::Number(*n)),
        Data::Int(n) => Some(RawValue::Number(*n as f64)),
        Data::Bool(b) => Some(RawValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string())),
        Data::Error(_) => None,
        Data::DateTime(dt) => serial_to_iso(dt.as_f64()).map(RawValue::Text),
        Data::DateTimeIso(s) => text_cell(s),
        Data::DurationIso(_) => None,
    }
}

/// Convert an Excel 1900-system serial to `YYYY-MM-DD`. Time of day is dropped.
fn serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // Serial 1 is 1900-01-01; the epoch absorbs the 1900 leap-year bug for
    // every date after February 1900.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_days(Days::new(serial.floor() as u64))?;
    Some(date.format("%Y-%m-%d").to_string())
}
