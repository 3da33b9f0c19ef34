use std::path::Path;

use chrono::Month;
use rust_xlsxwriter::Worksheet;
use tracing::{info, warn};

use crate::error::Result;
use crate::layout::{self, Layout, PersistedReport};
use crate::metrics::Domain;
use crate::models::{MetricSet, Table, MONTHS};

pub const TOTALS_LABEL: &str = "Yearly Totals";

/// Twelve calendar-ordered month rows plus field-wise totals. Every row holds
/// every metric; gaps were filled with zero while aggregating.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlySummary {
    pub metric_names: Vec<String>,
    pub months: Vec<(Month, MetricSet)>,
    pub totals: MetricSet,
}

impl YearlySummary {
    /// Months that contributed no figures at all.
    pub fn empty_months(&self) -> Vec<Month> {
        self.months
            .iter()
            .filter(|(_, m)| m.iter().all(|(_, v)| v == 0.0))
            .map(|(month, _)| *month)
            .collect()
    }

    /// Text rendering used for the console and CSV export.
    pub fn to_table(&self) -> Table {
        let mut headers = vec!["Month".to_string()];
        headers.extend(self.metric_names.iter().cloned());
        let render = |label: &str, m: &MetricSet| {
            let mut row = vec![label.to_string()];
            row.extend(
                self.metric_names
                    .iter()
                    .map(|n| format!("{:.2}", m.get(n).unwrap_or(0.0))),
            );
            row
        };
        let mut rows: Vec<Vec<String>> = self
            .months
            .iter()
            .map(|(month, m)| render(month.name(), m))
            .collect();
        rows.push(render(TOTALS_LABEL, &self.totals));
        Table::new(headers, rows)
    }
}

/// Sum monthly figures into a yearly summary. Never fails: a month missing
/// from `monthly`, or a metric missing from a month, counts as zero.
pub fn aggregate(monthly: &[(Month, MetricSet)], metric_names: &[&str]) -> YearlySummary {
    let mut totals = MetricSet::new();
    for name in metric_names {
        totals.insert(name, 0.0);
    }

    let mut months = Vec::with_capacity(MONTHS.len());
    for month in MONTHS {
        let found = monthly.iter().find(|(m, _)| *m == month).map(|(_, set)| set);
        let mut row = MetricSet::new();
        match found {
            None => {
                warn!("No figures for {}; counted as zero", month.name());
                for name in metric_names {
                    row.insert(name, 0.0);
                }
            }
            Some(set) => {
                for name in metric_names {
                    let value = set.get(name).unwrap_or_else(|| {
                        warn!("{name} missing for {}; counted as zero", month.name());
                        0.0
                    });
                    row.insert(name, value);
                }
                if let Some(reason) = set.unavailable() {
                    row.flag(reason);
                }
            }
        }
        for (name, value) in row.iter() {
            let sum = totals.get(name).unwrap_or(0.0) + value;
            totals.insert(name, sum);
        }
        months.push((month, row));
    }

    YearlySummary {
        metric_names: metric_names.iter().map(|n| n.to_string()).collect(),
        months,
        totals,
    }
}

/// Summary sheet: a `Month` header row, one row per month, then the totals.
pub fn write_summary(
    worksheet: &mut Worksheet,
    site: &str,
    year: i32,
    summary: &YearlySummary,
) -> Result<()> {
    worksheet.set_name(layout::summary_sheet_name(site, year))?;
    worksheet.write_string(0, 0, "Month")?;
    for (col, name) in summary.metric_names.iter().enumerate() {
        worksheet.write_string(0, col as u16 + 1, name)?;
    }

    let rows = summary
        .months
        .iter()
        .map(|(month, m)| (month.name(), m))
        .chain(std::iter::once((TOTALS_LABEL, &summary.totals)));
    for (i, (label, metrics)) in rows.enumerate() {
        let row = i as u32 + 1;
        worksheet.write_string(row, 0, label)?;
        for (col, name) in summary.metric_names.iter().enumerate() {
            worksheet.write_number(row, col as u16 + 1, metrics.get(name).unwrap_or(0.0))?;
        }
    }
    layout::autofit_columns(worksheet, &summary.to_table())?;
    Ok(())
}

/// Rebuild a domain's summary from a saved workbook. `fallback_rows` supplies
/// a month's data row count from its cleaned input, for sheets without a
/// usable anchor.
pub fn read_persisted(
    path: &Path,
    site: &str,
    domain: Domain,
    mut fallback_rows: impl FnMut(Month) -> Option<usize>,
) -> YearlySummary {
    let layout = Layout::for_domain(domain);
    let mut report = PersistedReport::open(path);
    let monthly: Vec<(Month, MetricSet)> = MONTHS
        .iter()
        .map(|month| {
            let sheet = layout::month_sheet_name(site, *month);
            (*month, report.read_month(&layout, &sheet, fallback_rows(*month)))
        })
        .collect();
    info!("Read {} month sheets from {}", monthly.len(), path.display());
    aggregate(&monthly, &layout.metric_names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{NUMBER_OF_OUTAGES, TOTAL_KWH_SAVED, TOTAL_MONTH_SAVINGS};
    use approx::assert_relative_eq;
    use calamine::{Data, Reader};
    use rust_xlsxwriter::Workbook;

    const NAMES: &[&str] = &[TOTAL_KWH_SAVED, TOTAL_MONTH_SAVINGS];

    fn set(kwh: f64, total: f64) -> MetricSet {
        let mut m = MetricSet::new();
        m.insert(TOTAL_KWH_SAVED, kwh);
        m.insert(TOTAL_MONTH_SAVINGS, total);
        m
    }

    #[test]
    fn test_missing_month_counts_as_zero() {
        let monthly: Vec<(Month, MetricSet)> = MONTHS
            .iter()
            .filter(|m| **m != Month::April)
            .map(|m| (*m, set(10.0, 2.5)))
            .collect();
        let summary = aggregate(&monthly, NAMES);
        assert_eq!(summary.months.len(), 12);
        assert_eq!(summary.months[3].0, Month::April);
        assert_eq!(summary.months[3].1.get(TOTAL_MONTH_SAVINGS), Some(0.0));
        assert_relative_eq!(summary.totals.get(TOTAL_KWH_SAVED).unwrap(), 110.0);
        assert_relative_eq!(summary.totals.get(TOTAL_MONTH_SAVINGS).unwrap(), 27.5);
        assert_eq!(summary.empty_months(), vec![Month::April]);
    }

    #[test]
    fn test_calendar_order_regardless_of_input_order() {
        let monthly = vec![(Month::March, set(3.0, 3.0)), (Month::January, set(1.0, 1.0))];
        let summary = aggregate(&monthly, NAMES);
        let order: Vec<Month> = summary.months.iter().map(|(m, _)| *m).collect();
        assert_eq!(order, MONTHS.to_vec());
        assert_eq!(summary.months[0].1.get(TOTAL_KWH_SAVED), Some(1.0));
        assert_eq!(summary.months[2].1.get(TOTAL_KWH_SAVED), Some(3.0));
    }

    #[test]
    fn test_missing_metric_counts_as_zero() {
        let mut partial = MetricSet::new();
        partial.insert(TOTAL_MONTH_SAVINGS, 4.0);
        let summary = aggregate(&[(Month::May, partial)], NAMES);
        assert_eq!(summary.months[4].1.get(TOTAL_KWH_SAVED), Some(0.0));
        assert_eq!(summary.totals.get(TOTAL_MONTH_SAVINGS), Some(4.0));
        assert_eq!(summary.totals.get(NUMBER_OF_OUTAGES), None);
    }

    #[test]
    fn test_to_table_has_totals_row() {
        let summary = aggregate(&[(Month::January, set(1.5, 2.0))], NAMES);
        let t = summary.to_table();
        assert_eq!(t.headers[0], "Month");
        assert_eq!(t.rows.len(), 13);
        assert_eq!(t.rows[0], vec!["January", "1.50", "2.00"]);
        assert_eq!(t.rows[12][0], TOTALS_LABEL);
    }

    #[test]
    fn test_write_summary_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.xlsx");
        let summary = aggregate(&[(Month::February, set(5.0, 7.0))], NAMES);
        let mut ws = Worksheet::new();
        write_summary(&mut ws, "Kisumu", 2024, &summary).unwrap();
        let mut wb = Workbook::new();
        wb.push_worksheet(ws);
        wb.save(&path).unwrap();

        let mut sheets = calamine::open_workbook_auto(&path).unwrap();
        let range = sheets.worksheet_range("Kisumu_2024_Savings_Summary").unwrap();
        assert_eq!(range.get_value((0, 1)), Some(&Data::String(TOTAL_KWH_SAVED.into())));
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("February".into())));
        assert_eq!(range.get_value((2, 2)), Some(&Data::Float(7.0)));
        assert_eq!(range.get_value((13, 0)), Some(&Data::String(TOTALS_LABEL.into())));
        assert_eq!(range.get_value((13, 1)), Some(&Data::Float(5.0)));
    }

    #[test]
    fn test_read_persisted_from_missing_file_is_all_zero() {
        let dir = tempfile::tempdir().unwrap();
        let summary = read_persisted(&dir.path().join("none.xlsx"), "Kisumu", Domain::Voltage, |_| None);
        assert_eq!(summary.months.len(), 12);
        assert_eq!(summary.totals.get(TOTAL_MONTH_SAVINGS), Some(0.0));
    }
}
