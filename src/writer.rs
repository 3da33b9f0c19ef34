use chrono::Month;
use rust_xlsxwriter::Worksheet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::layout::{self, Layout, ANCHOR_COL};
use crate::loader::parse_number;
use crate::metrics::Calculator;
use crate::models::{MetricSet, Table};

/// Build one month's worksheet: the cleaned table from the origin, the
/// computed block beneath it and the row-count anchor. Returns the figures so
/// the caller can aggregate without reading the sheet back.
pub fn write_month(
    worksheet: &mut Worksheet,
    site: &str,
    month: Month,
    table: &Table,
    calculator: &Calculator,
    layout: &Layout,
) -> Result<MetricSet> {
    worksheet.set_name(layout::month_sheet_name(site, month))?;
    write_table(worksheet, table)?;

    let metrics = calculator.compute(month, table);
    let data_row_count = table.data_row_count();
    layout.write_block(worksheet, data_row_count, &metrics)?;

    if table.headers.len() >= ANCHOR_COL as usize {
        warn!(
            "{} table is {} columns wide; layout anchor not written",
            month.name(),
            table.headers.len()
        );
    } else {
        layout.write_anchor(worksheet, data_row_count)?;
    }

    layout::autofit_columns(worksheet, table)?;
    debug!("Wrote {} rows for {}", table.rows.len(), month.name());
    Ok(metrics)
}

/// Cells that parse as numbers are written as numbers, everything else as
/// text. Empty cells are left empty.
fn write_table(worksheet: &mut Worksheet, table: &Table) -> Result<()> {
    if table.headers.is_empty() {
        return Ok(());
    }
    let header: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    write_row(worksheet, 0, &header)?;
    for (i, row) in table.rows.iter().enumerate() {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        write_row(worksheet, i as u32 + 1, &cells)?;
    }
    Ok(())
}

fn write_row(worksheet: &mut Worksheet, row: u32, cells: &[&str]) -> Result<()> {
    for (col, value) in cells.iter().enumerate() {
        let col = col as u16;
        if value.trim().is_empty() {
            continue;
        }
        match parse_number(value) {
            Some(n) => worksheet.write_number(row, col, n)?,
            None => worksheet.write_string(row, col, *value)?,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PersistedReport;
    use crate::metrics::{Domain, Yields, TOTAL_KWH_SAVED, TOTAL_MONTH_SAVINGS};
    use crate::settings::Settings;
    use calamine::{Data, Reader};
    use rust_xlsxwriter::Workbook;

    fn settings() -> Settings {
        serde_json::from_value(serde_json::json!({
            "year": 2024,
            "site": "Kisumu",
            "cost_fuel_plus_MTCE": 0.1,
            "cost_per_outage": 50.0,
        }))
        .unwrap()
    }

    fn genset_table() -> Table {
        Table::new(
            vec!["Timestamp".into(), "Energy Saving (kWh)".into()],
            vec![
                vec!["00:00".into(), "10".into()],
                vec!["00:05".into(), "20".into()],
                vec!["00:10".into(), "".into()],
            ],
        )
    }

    #[test]
    fn test_written_month_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genset.xlsx");
        let settings = settings();
        let calc = Calculator::with_yields(Domain::Genset, &settings, Yields::default());
        let layout = Layout::for_domain(Domain::Genset);

        let mut ws = Worksheet::new();
        let written =
            write_month(&mut ws, "Kisumu", Month::January, &genset_table(), &calc, &layout).unwrap();
        let mut wb = Workbook::new();
        wb.push_worksheet(ws);
        wb.save(&path).unwrap();

        let mut report = PersistedReport::open(&path);
        let read = report.read_month(&layout, "Kisumu_January_Savings", None);
        for (name, value) in written.iter() {
            if layout.metric_names().contains(&name) {
                assert_eq!(read.get(name), Some(value), "{name}");
            }
        }
        assert_eq!(read.get(TOTAL_KWH_SAVED), Some(30.0));
        assert_eq!(read.get(TOTAL_MONTH_SAVINGS), written.get(TOTAL_MONTH_SAVINGS));
    }

    #[test]
    fn test_cells_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.xlsx");
        let settings = settings();
        let calc = Calculator::with_yields(Domain::Genset, &settings, Yields::default());
        let layout = Layout::for_domain(Domain::Genset);

        let mut ws = Worksheet::new();
        write_month(&mut ws, "Kisumu", Month::June, &genset_table(), &calc, &layout).unwrap();
        let mut wb = Workbook::new();
        wb.push_worksheet(ws);
        wb.save(&path).unwrap();

        let mut sheets = calamine::open_workbook_auto(&path).unwrap();
        let range = sheets.worksheet_range("Kisumu_June_Savings").unwrap();
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Energy Saving (kWh)".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("00:00".into())));
        assert_eq!(range.get_value((2, 1)), Some(&Data::Float(20.0)));
    }

    #[test]
    fn test_empty_month_still_gets_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let settings = settings();
        let calc = Calculator::with_yields(Domain::PowerFactor, &settings, Yields::default());
        let layout = Layout::for_domain(Domain::PowerFactor);

        let mut ws = Worksheet::new();
        let m = write_month(&mut ws, "Kisumu", Month::March, &Table::default(), &calc, &layout)
            .unwrap();
        let mut wb = Workbook::new();
        wb.push_worksheet(ws);
        wb.save(&path).unwrap();

        let mut report = PersistedReport::open(&path);
        let read = report.read_month(&layout, "Kisumu_March_Savings", None);
        assert_eq!(read.get(TOTAL_MONTH_SAVINGS), m.get(TOTAL_MONTH_SAVINGS));
    }
}
