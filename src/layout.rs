use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets};
use chrono::Month;
use rust_xlsxwriter::Worksheet;
use tracing::{debug, warn};

use crate::error::{Result, SavingsError};
use crate::loader::parse_number;
use crate::metrics::*;
use crate::models::{MetricSet, Table};

pub const LAYOUT_VERSION: u32 = 1;

/// Column of the row-count anchor: label in row 0, value in row 1.
pub const ANCHOR_COL: u16 = 51;

const LABEL_COL: u16 = 0;
const VALUE_COL: u16 = 1;
const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub metric: &'static str,
    pub row_offset: u32,
    pub column: u16,
}

const fn slot(metric: &'static str, row_offset: u32) -> Slot {
    Slot {
        metric,
        row_offset,
        column: VALUE_COL,
    }
}

const GENSET_SLOTS: &[Slot] = &[
    slot(TOTAL_KWH_SAVED, 2),
    slot(NUMBER_OF_OUTAGES, 4),
    slot(GENSET_FUEL_SAVINGS, 6),
    slot(OUTAGE_SAVINGS, 8),
    slot(SOLAR_YIELD, 10),
    slot(GRID_YIELD, 11),
    slot(GENSET_YIELD, 12),
    slot(TOTAL_MONTH_SAVINGS, 20),
];

const FREQUENCY_SLOTS: &[Slot] = &[
    slot(TOTAL_KWH_SAVED, 2),
    slot(NUMBER_OF_OUTAGES, 4),
    slot(FREQUENCY_FUEL_SAVINGS, 6),
    slot(OUTAGE_SAVINGS, 8),
    slot(DEVIATION_COST, 10),
    slot(MAINTENANCE_COST_DELTA, 11),
    slot(DOWNTIME_COST, 12),
    slot(PENALTY_COST, 13),
    slot(TOTAL_MONTH_SAVINGS, 20),
];

const HARMONIC_SLOTS: &[Slot] = &[
    slot(NON_COMPLIANT_ENERGY, 2),
    slot(ENERGY_LOSSES, 3),
    slot(HARMONIC_COST_SAVINGS, 4),
    slot(TOTAL_MONTH_SAVINGS, 6),
];

const POWER_FACTOR_SLOTS: &[Slot] = &[
    slot(LOW_POWER_FACTOR_SAMPLES, 2),
    slot(POWER_FACTOR_PENALTY, 3),
    slot(TOTAL_MONTH_SAVINGS, 5),
];

const VOLTAGE_SLOTS: &[Slot] = &[
    slot(VOLTAGE_EXCURSIONS, 2),
    slot(VOLTAGE_MISMATCH_SAVINGS, 3),
    slot(TOTAL_MONTH_SAVINGS, 5),
];

/// Fixed placement of computed figures beneath a month's data: one table of
/// metric to row offset, shared by the write path (month sheets) and the read
/// path (summaries rebuilt from a saved workbook). Offsets count from the
/// month's data row count, header included, which is also stored in a
/// reserved anchor cell so the read path does not have to re-clean the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub version: u32,
    slots: &'static [Slot],
}

impl Layout {
    pub fn for_domain(domain: Domain) -> Self {
        let slots = match domain {
            Domain::Genset => GENSET_SLOTS,
            Domain::Frequency => FREQUENCY_SLOTS,
            Domain::Harmonics => HARMONIC_SLOTS,
            Domain::PowerFactor => POWER_FACTOR_SLOTS,
            Domain::Voltage => VOLTAGE_SLOTS,
        };
        Self {
            version: LAYOUT_VERSION,
            slots,
        }
    }

    pub fn metric_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.metric).collect()
    }

    /// Offsets must strictly increase so that no two figures share a row.
    pub fn validate(&self) -> Result<()> {
        for pair in self.slots.windows(2) {
            if pair[1].row_offset <= pair[0].row_offset {
                return Err(SavingsError::Layout(format!(
                    "'{}' at offset {} does not follow '{}' at offset {}",
                    pair[1].metric, pair[1].row_offset, pair[0].metric, pair[0].row_offset
                )));
            }
        }
        if self.slots.iter().any(|s| s.column == LABEL_COL || s.column >= ANCHOR_COL) {
            return Err(SavingsError::Layout(
                "value column collides with the label or anchor column".to_string(),
            ));
        }
        Ok(())
    }

    fn anchor_label(&self) -> String {
        format!("Data Rows (layout v{})", self.version)
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    pub fn write_block(
        &self,
        worksheet: &mut Worksheet,
        data_row_count: usize,
        metrics: &MetricSet,
    ) -> Result<()> {
        for s in self.slots {
            let row = block_row(data_row_count, s.row_offset)?;
            worksheet.write_string(row, LABEL_COL, s.metric)?;
            match metrics.get(s.metric) {
                Some(v) => worksheet.write_number(row, s.column, v)?,
                None => worksheet.write_string(row, s.column, "N/A")?,
            };
        }
        Ok(())
    }

    pub fn write_anchor(&self, worksheet: &mut Worksheet, data_row_count: usize) -> Result<()> {
        worksheet.write_string(0, ANCHOR_COL, self.anchor_label())?;
        worksheet.write_number(1, ANCHOR_COL, data_row_count as f64)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Read figures back from a month sheet. A slot whose label does not
    /// match, or whose value is not numeric, is left out of the result.
    pub fn read_block(&self, range: &Range<Data>, data_row_count: usize) -> MetricSet {
        let mut metrics = MetricSet::new();
        for s in self.slots {
            let Ok(row) = block_row(data_row_count, s.row_offset) else {
                continue;
            };
            let label = range.get_value((row, LABEL_COL as u32));
            if !matches!(label, Some(Data::String(l)) if l == s.metric) {
                debug!("No '{}' label at row {row}", s.metric);
                continue;
            }
            match range.get_value((row, s.column as u32)).and_then(cell_number) {
                Some(v) => metrics.insert(s.metric, v),
                None => debug!("'{}' has no numeric value at row {row}", s.metric),
            }
        }
        metrics
    }

    pub fn read_anchor(&self, range: &Range<Data>) -> Option<usize> {
        match range.get_value((0, ANCHOR_COL as u32)) {
            Some(Data::String(label)) if *label == self.anchor_label() => {}
            Some(Data::String(label)) => {
                warn!("Layout anchor '{label}' does not match '{}'", self.anchor_label());
                return None;
            }
            _ => return None,
        }
        let rows = range.get_value((1, ANCHOR_COL as u32)).and_then(cell_number)?;
        (rows >= 0.0).then_some(rows as usize)
    }
}

fn block_row(data_row_count: usize, offset: u32) -> Result<u32> {
    u32::try_from(data_row_count)
        .ok()
        .and_then(|r| r.checked_add(offset))
        .ok_or_else(|| SavingsError::Layout(format!("row {data_row_count} + {offset} out of range")))
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_number(s),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sheet names
// ---------------------------------------------------------------------------

/// Build a sheet name within Excel's 31 character limit by shortening the
/// site part, never the distinguishing tail.
fn sheet_name(site: &str, tail: &str) -> String {
    let room = MAX_SHEET_NAME.saturating_sub(tail.chars().count() + 1);
    let site: String = site.chars().take(room).collect();
    format!("{site}_{tail}")
}

pub fn month_sheet_name(site: &str, month: Month) -> String {
    sheet_name(site, &format!("{}_Savings", month.name()))
}

pub fn summary_sheet_name(site: &str, year: i32) -> String {
    sheet_name(site, &format!("{year}_Savings_Summary"))
}

// ---------------------------------------------------------------------------
// Column widths
// ---------------------------------------------------------------------------

/// Size each data column to its longest header or cell text, plus padding.
pub fn autofit_columns(worksheet: &mut Worksheet, table: &Table) -> Result<()> {
    for (col, header) in table.headers.iter().enumerate() {
        let widest = table
            .rows
            .iter()
            .map(|row| row.get(col).map_or(0, |v| v.chars().count()))
            .chain(std::iter::once(header.chars().count()))
            .max()
            .unwrap_or(0);
        let Ok(col) = u16::try_from(col) else {
            break;
        };
        worksheet.set_column_width(col, (widest + 2) as f64)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Persisted workbooks
// ---------------------------------------------------------------------------

/// A previously saved report opened for reading. Opening never fails: a
/// missing or unreadable file reads as a report without sheets.
pub struct PersistedReport {
    sheets: Option<Sheets<BufReader<File>>>,
    label: String,
}

impl PersistedReport {
    pub fn open(path: &Path) -> Self {
        let label = path.display().to_string();
        if !path.exists() {
            warn!("File {label} not found. Every month will read as empty.");
            return Self { sheets: None, label };
        }
        match calamine::open_workbook_auto(path) {
            Ok(sheets) => Self {
                sheets: Some(sheets),
                label,
            },
            Err(e) => {
                warn!("Could not open {label}: {e}. Every month will read as empty.");
                Self { sheets: None, label }
            }
        }
    }

    /// Read one month's block. `fallback_rows` is the data row count
    /// recomputed from the month's cleaned input, used when the sheet carries
    /// no matching anchor.
    pub fn read_month(
        &mut self,
        layout: &Layout,
        sheet: &str,
        fallback_rows: Option<usize>,
    ) -> MetricSet {
        let Some(sheets) = self.sheets.as_mut() else {
            return MetricSet::new();
        };
        let range = match sheets.worksheet_range(sheet) {
            Ok(r) => r,
            Err(_) => {
                warn!("Worksheet {sheet} not found in {}. Skipping.", self.label);
                return MetricSet::new();
            }
        };
        let rows = match (layout.read_anchor(&range), fallback_rows) {
            (Some(rows), _) => rows,
            (None, Some(rows)) => {
                warn!("Worksheet {sheet} has no layout anchor; using recomputed row count {rows}");
                rows
            }
            (None, None) => {
                warn!("Worksheet {sheet} has no layout anchor. Skipping.");
                return MetricSet::new();
            }
        };
        layout.read_block(&range, rows)
    }
}
