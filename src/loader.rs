use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::error::{Result, SavingsError};
use crate::models::{RawRow, Table};
use crate::settings::{InputSource, Settings, YieldSource};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a numeric cell. Thousands separators are stripped; blanks, text and
/// non-finite values yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse a timestamp cell. Bare clock times (`00:06:30`) are anchored to a
/// fixed date so that they compare within one table.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    let anchor = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(|t| anchor.and_time(t))
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(SavingsError::Config(format!(
            "delimiter {delimiter:?} is not a single-byte character"
        )))
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Read a delimited table. A missing file is not an error: it means there is
/// no data for that month and yields `Ok(None)`.
pub fn read_table(path: &Path, delimiter: char) -> Result<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter_byte(delimiter)?)
        .from_path(path)?;

    let mut records = rdr.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
        None => return Ok(Some(Table::default())),
    };
    let mut rows: Vec<RawRow> = Vec::new();
    for result in records {
        let record = result?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(Some(Table::new(headers, rows)))
}

/// Write a table back to its source file. The whole table goes to a sibling
/// temporary file first and is renamed over the original, so a failure never
/// leaves a half-written source.
pub fn persist_table(path: &Path, table: &Table, delimiter: char) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter_byte(delimiter)?)
            .from_path(&tmp)?;
        wtr.write_record(&table.headers)?;
        for row in &table.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    info!("Wrote cleaned table to {}", path.display());
    Ok(())
}

/// Rows of a yearly table whose `month_column` names `month`.
pub fn split_month(table: &Table, month_column: &str, month: &str) -> Option<Table> {
    let col = table.column(month_column)?;
    let rows = table
        .rows
        .iter()
        .filter(|row| row[col].trim().eq_ignore_ascii_case(month))
        .cloned()
        .collect();
    Some(Table::new(table.headers.clone(), rows))
}

/// Load one month's raw table for a domain input. `Ok(None)` means the month
/// has no data (file absent, or no matching rows in a yearly table).
pub fn load_month(source: &InputSource, settings: &Settings, month: &str) -> Result<Option<Table>> {
    let path = source.resolve(&settings.data_root, settings.year, month);
    let Some(table) = read_table(&path, source.delimiter)? else {
        warn!("{} does not exist. Skipping {month}.", path.display());
        return Ok(None);
    };
    let Some(month_column) = &source.month_column else {
        return Ok(Some(table));
    };
    match split_month(&table, month_column, month) {
        Some(t) if !t.is_empty() => Ok(Some(t)),
        Some(_) => {
            warn!("No rows for {month} in {}. Skipping.", path.display());
            Ok(None)
        }
        None => {
            warn!(
                "Column '{month_column}' not found in {}. Skipping {month}.",
                path.display()
            );
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Yield tables
// ---------------------------------------------------------------------------

/// Per-month yield figures keyed by the `Category` column. A missing file or
/// missing columns produce an empty map and a warning.
pub fn load_yields(path: &Path, source: &YieldSource) -> BTreeMap<String, f64> {
    let table = match read_table(path, ',') {
        Ok(Some(t)) => t,
        Ok(None) => {
            warn!("{} does not exist. Skipping.", source.file);
            return BTreeMap::new();
        }
        Err(e) => {
            warn!("Could not read {}: {e}. Skipping.", path.display());
            return BTreeMap::new();
        }
    };
    let (Some(cat), Some(val)) = (table.column("Category"), table.column(&source.column)) else {
        warn!("Required columns not found in {}. Skipping.", path.display());
        return BTreeMap::new();
    };
    table
        .rows
        .iter()
        .filter_map(|row| {
            let value = parse_number(&row[val])?;
            Some((row[cat].trim().to_string(), value))
        })
        .collect()
}
