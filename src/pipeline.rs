use std::path::{Path, PathBuf};

use chrono::Month;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::{error, info, warn};

use crate::aggregator::{self, YearlySummary};
use crate::cleaner::{self, FilterRule};
use crate::error::Result;
use crate::layout::{self, Layout};
use crate::loader;
use crate::metrics::{Calculator, Domain};
use crate::models::{MetricSet, Table, MONTHS};
use crate::settings::{InputSource, Settings};
use crate::writer;

#[derive(Debug, Clone, PartialEq)]
pub enum MonthStatus {
    Written,
    /// Sheet written, but figures are zero because they could not be derived.
    Unavailable(String),
    NoData,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MonthReport {
    pub month: Month,
    pub raw_rows: usize,
    pub kept_rows: usize,
    pub status: MonthStatus,
}

/// Outcome of one domain's run: where the workbook went, what each month did,
/// and the summary written into it.
#[derive(Debug)]
pub struct DomainRun {
    pub domain: Domain,
    pub output: PathBuf,
    pub months: Vec<MonthReport>,
    pub summary: YearlySummary,
}

pub fn report_path(settings: &Settings, domain: Domain) -> PathBuf {
    settings.results_path().join(format!(
        "{}_{}_{}_Savings.xlsx",
        settings.year,
        settings.site,
        domain.file_label()
    ))
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Clean, compute and write every month of one domain, then the summary
/// sheet, and save the workbook. A failing month is logged and left out;
/// only errors that stop the workbook itself from being produced propagate.
pub fn run_domain(settings: &Settings, domain: Domain) -> Result<DomainRun> {
    let layout = Layout::for_domain(domain);
    layout.validate()?;
    let calculator = Calculator::new(domain, settings);
    let rules = cleaner::rules_for_domain(domain, &settings.cleaning);
    let source = domain.input(settings);

    let mut workbook = Workbook::new();
    let mut monthly: Vec<(Month, MetricSet)> = Vec::new();
    let mut reports = Vec::with_capacity(MONTHS.len());

    for month in MONTHS {
        let outcome = process_month(settings, source, &rules, &calculator, &layout, month);
        let report = match outcome {
            Ok(Some(done)) => {
                workbook.push_worksheet(done.worksheet);
                let status = match done.metrics.unavailable() {
                    Some(reason) => MonthStatus::Unavailable(reason.to_string()),
                    None => MonthStatus::Written,
                };
                monthly.push((month, done.metrics));
                MonthReport {
                    month,
                    raw_rows: done.raw_rows,
                    kept_rows: done.kept_rows,
                    status,
                }
            }
            Ok(None) => {
                push_empty_sheet(&mut workbook, &settings.site, month);
                MonthReport {
                    month,
                    raw_rows: 0,
                    kept_rows: 0,
                    status: MonthStatus::NoData,
                }
            }
            Err(e) => {
                error!("{} {} failed: {e}", domain.key(), month.name());
                push_empty_sheet(&mut workbook, &settings.site, month);
                MonthReport {
                    month,
                    raw_rows: 0,
                    kept_rows: 0,
                    status: MonthStatus::Failed(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    let summary = aggregator::aggregate(&monthly, &layout.metric_names());
    let mut sheet = Worksheet::new();
    aggregator::write_summary(&mut sheet, &settings.site, settings.year, &summary)?;
    workbook.push_worksheet(sheet);

    let output = report_path(settings, domain);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    workbook.save(&output)?;
    info!("{} savings saved to {}", domain.key(), output.display());

    Ok(DomainRun {
        domain,
        output,
        months: reports,
        summary,
    })
}

/// Months without figures still get their named sheet, left blank.
fn push_empty_sheet(workbook: &mut Workbook, site: &str, month: Month) {
    let mut sheet = Worksheet::new();
    if let Err(e) = sheet.set_name(layout::month_sheet_name(site, month)) {
        warn!("Could not add empty sheet for {}: {e}", month.name());
        return;
    }
    workbook.push_worksheet(sheet);
}

struct WrittenMonth {
    worksheet: Worksheet,
    metrics: MetricSet,
    raw_rows: usize,
    kept_rows: usize,
}

fn process_month(
    settings: &Settings,
    source: &InputSource,
    rules: &[FilterRule],
    calculator: &Calculator,
    layout: &Layout,
    month: Month,
) -> Result<Option<WrittenMonth>> {
    let Some(raw) = loader::load_month(source, settings, month.name())? else {
        return Ok(None);
    };
    let raw_rows = raw.rows.len();
    let table = cleaner::clean(Some(raw), rules);

    if settings.cleaning.overwrite_source {
        if source.month_column.is_some() {
            warn!("{} input is a yearly table; not overwritten per month", month.name());
        } else {
            let path = source.resolve(&settings.data_root, settings.year, month.name());
            loader::persist_table(&path, &table, source.delimiter)?;
        }
    }

    let mut worksheet = Worksheet::new();
    let metrics = writer::write_month(
        &mut worksheet,
        &settings.site,
        month,
        &table,
        calculator,
        layout,
    )?;
    Ok(Some(WrittenMonth {
        worksheet,
        metrics,
        raw_rows,
        kept_rows: table.rows.len(),
    }))
}

// ---------------------------------------------------------------------------
// Cleaning in place
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CleanReport {
    pub path: PathBuf,
    pub raw_rows: usize,
    pub kept_rows: usize,
    /// Set when the file could not be read or written back; it is left as is.
    pub error: Option<String>,
}

/// Clean a domain's input files and write them back. Month files are handled
/// one by one; a yearly source is cleaned as a whole. A file that fails is
/// logged and reported, and the remaining files are still cleaned.
pub fn clean_domain(settings: &Settings, domain: Domain) -> Result<Vec<CleanReport>> {
    let rules = cleaner::rules_for_domain(domain, &settings.cleaning);
    let source = domain.input(settings);

    let paths: Vec<PathBuf> = if source.month_column.is_some() {
        vec![source.resolve(&settings.data_root, settings.year, "")]
    } else {
        MONTHS
            .iter()
            .map(|m| source.resolve(&settings.data_root, settings.year, m.name()))
            .collect()
    };

    let mut reports = Vec::new();
    for path in paths {
        match clean_file(&path, source, &rules) {
            Ok(Some((raw_rows, kept_rows))) => reports.push(CleanReport {
                path,
                raw_rows,
                kept_rows,
                error: None,
            }),
            Ok(None) => warn!("{} does not exist. Skipping.", path.display()),
            Err(e) => {
                error!("Cleaning {} failed: {e}", path.display());
                reports.push(CleanReport {
                    path,
                    raw_rows: 0,
                    kept_rows: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    Ok(reports)
}

/// Row counts before and after cleaning, or `None` when the file is absent.
fn clean_file(
    path: &Path,
    source: &InputSource,
    rules: &[FilterRule],
) -> Result<Option<(usize, usize)>> {
    let Some(raw) = loader::read_table(path, source.delimiter)? else {
        return Ok(None);
    };
    let raw_rows = raw.rows.len();
    let table = cleaner::clean(Some(raw), rules);
    loader::persist_table(path, &table, source.delimiter)?;
    Ok(Some((raw_rows, table.rows.len())))
}

// ---------------------------------------------------------------------------
// Summary from a saved workbook
// ---------------------------------------------------------------------------

/// Rebuild the yearly summary from the domain's saved workbook. Sheets
/// without an anchor are located by re-cleaning that month's input.
pub fn summarize_domain(settings: &Settings, domain: Domain) -> (PathBuf, YearlySummary) {
    let rules = cleaner::rules_for_domain(domain, &settings.cleaning);
    let source = domain.input(settings);
    let path = report_path(settings, domain);
    let summary = aggregator::read_persisted(&path, &settings.site, domain, |month| {
        recount_rows(settings, source, &rules, month)
    });
    (path, summary)
}

fn recount_rows(
    settings: &Settings,
    source: &InputSource,
    rules: &[FilterRule],
    month: Month,
) -> Option<usize> {
    match loader::load_month(source, settings, month.name()) {
        Ok(raw) => {
            let table: Table = cleaner::clean(raw, rules);
            Some(table.data_row_count())
        }
        Err(e) => {
            warn!("Could not re-read {} input: {e}", month.name());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{NUMBER_OF_OUTAGES, TOTAL_KWH_SAVED, TOTAL_MONTH_SAVINGS};
    use crate::metrics::VOLTAGE_EXCURSIONS;
    use approx::assert_relative_eq;
    use calamine::Reader;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn settings(dir: &Path) -> Settings {
        serde_json::from_value(serde_json::json!({
            "year": 2024,
            "site": "Kisumu",
            "data_root": dir.join("data").to_string_lossy(),
            "results_dir": dir.join("results").to_string_lossy(),
            "cost_fuel_plus_MTCE": 0.1,
            "cost_per_outage": 50.0,
        }))
        .unwrap()
    }

    fn shipped_settings(dir: &Path) -> Settings {
        let mut cfg: serde_json::Value =
            serde_json::from_str(include_str!("../config/savings_config.json")).unwrap();
        cfg["data_root"] = dir.join("data").to_string_lossy().into();
        cfg["results_dir"] = dir.join("results").to_string_lossy().into();
        serde_json::from_value(cfg).unwrap()
    }

    const JANUARY: &str = "Timestamp,Time Elapsed (minutes),Energy Saving (kWh),Conditions Met\n\
                           00:00,5,10,TRUE\n\
                           00:10,0.5,99,TRUE\n\
                           00:20,7,20,TRUE\n\
                           ,,,\n";

    #[test]
    fn test_run_domain_writes_workbook_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "data/genset_savings_data/2024/January-Genset-Savings.csv",
            JANUARY,
        );
        let settings = settings(dir.path());
        let run = run_domain(&settings, Domain::Genset).unwrap();

        assert!(run.output.ends_with("2024_Kisumu_Genset_Fuel_Savings.xlsx"));
        assert!(run.output.exists());
        assert_eq!(run.months[0].status, MonthStatus::Written);
        assert_eq!(run.months[0].raw_rows, 4);
        assert_eq!(run.months[0].kept_rows, 2);
        assert_eq!(run.months[1].status, MonthStatus::NoData);

        let mut sheets = calamine::open_workbook_auto(&run.output).unwrap();
        let names = sheets.sheet_names();
        assert_eq!(names.len(), 13);
        assert_eq!(names[1], "Kisumu_February_Savings");
        assert_eq!(names[12], "Kisumu_2024_Savings_Summary");
        assert!(sheets.worksheet_range("Kisumu_February_Savings").unwrap().is_empty());

        let jan = &run.summary.months[0].1;
        assert_relative_eq!(jan.get(TOTAL_KWH_SAVED).unwrap(), 30.0);
        assert_relative_eq!(jan.get(NUMBER_OF_OUTAGES).unwrap(), 1.0);
        assert_relative_eq!(run.summary.totals.get(TOTAL_MONTH_SAVINGS).unwrap(), 53.0);
    }

    #[test]
    fn test_summary_from_saved_workbook_matches_run() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "data/genset_savings_data/2024/January-Genset-Savings.csv",
            JANUARY,
        );
        write(
            dir.path(),
            "data/genset_savings_data/2024/March-Genset-Savings.csv",
            "Time Elapsed (minutes),Energy Saving (kWh)\n3,4\n3,6\n3,8\n",
        );
        let settings = settings(dir.path());
        let run = run_domain(&settings, Domain::Genset).unwrap();
        let (_, read) = summarize_domain(&settings, Domain::Genset);
        assert_eq!(read.totals, run.summary.totals);
        assert_relative_eq!(read.months[2].1.get(TOTAL_KWH_SAVED).unwrap(), 18.0);
    }

    #[test]
    fn test_overwrite_source_persists_cleaned_table() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "data/genset_savings_data/2024/January-Genset-Savings.csv";
        write(dir.path(), rel, JANUARY);
        let mut settings = settings(dir.path());
        settings.cleaning.overwrite_source = true;
        run_domain(&settings, Domain::Genset).unwrap();
        let cleaned = std::fs::read_to_string(dir.path().join(rel)).unwrap();
        assert_eq!(
            cleaned,
            "Timestamp,Time Elapsed (minutes),Energy Saving (kWh)\n00:00,5,10\n00:20,7,20\n"
        );
        // A second run sees the same figures.
        let again = run_domain(&settings, Domain::Genset).unwrap();
        assert_relative_eq!(again.summary.totals.get(TOTAL_KWH_SAVED).unwrap(), 30.0);
    }

    #[test]
    fn test_clean_domain_handles_yearly_source() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "data/harmonic_data/2024/Harmonic-Distortion-Month.csv";
        write(dir.path(), rel, "Month,THD_I\nJanuary,3\n,\nFebruary,4\n");
        let settings = settings(dir.path());
        let reports = clean_domain(&settings, Domain::Harmonics).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].raw_rows, 3);
        assert_eq!(reports[0].kept_rows, 2);
    }

    #[test]
    fn test_run_without_any_input_still_saves_summary() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let run = run_domain(&settings, Domain::Voltage).unwrap();
        assert!(run.output.exists());
        assert!(run.months.iter().all(|m| m.status == MonthStatus::NoData));
        assert_eq!(run.summary.empty_months().len(), 12);
    }

    #[test]
    fn test_voltage_samples_sharing_a_timestamp_are_paired() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "data/voltage_data/2024/January-Voltage-Timeseries.csv",
            "Timestamp,Grid Voltage,Load Voltage\n\
             00:00,180,\n\
             00:00,,229\n\
             00:05,180,\n\
             00:05,,229\n",
        );
        let settings = shipped_settings(dir.path());
        assert_eq!(settings.cleaning.min_spacing_minutes, Some(6.0));
        let run = run_domain(&settings, Domain::Voltage).unwrap();
        assert_eq!(run.months[0].kept_rows, 4);
        assert_eq!(run.months[0].status, MonthStatus::Written);
        let jan = &run.summary.months[0].1;
        assert_eq!(jan.get(VOLTAGE_EXCURSIONS), Some(2.0));
        assert!(jan.get(TOTAL_MONTH_SAVINGS).unwrap() > 0.0);
    }

    #[test]
    fn test_clean_domain_continues_past_unreadable_month() {
        let dir = tempfile::tempdir().unwrap();
        let base = "data/genset_savings_data/2024";
        write(
            dir.path(),
            &format!("{base}/January-Genset-Savings.csv"),
            "Time Elapsed (minutes),Energy Saving (kWh)\n5,10\n0.2,3\n",
        );
        let february = dir.path().join(format!("{base}/February-Genset-Savings.csv"));
        std::fs::write(
            &february,
            b"Time Elapsed (minutes),Energy Saving (kWh)\n5,\xff\xfe\n",
        )
        .unwrap();
        write(
            dir.path(),
            &format!("{base}/March-Genset-Savings.csv"),
            "Time Elapsed (minutes),Energy Saving (kWh),Conditions Met\n5,10,TRUE\n,,\n",
        );

        let settings = settings(dir.path());
        let reports = clean_domain(&settings, Domain::Genset).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].error.is_none());
        assert_eq!(reports[0].kept_rows, 1);
        assert!(reports[1].error.is_some());
        assert!(reports[2].error.is_none());

        let march =
            std::fs::read_to_string(dir.path().join(format!("{base}/March-Genset-Savings.csv")))
                .unwrap();
        assert_eq!(march, "Time Elapsed (minutes),Energy Saving (kWh)\n5,10\n");
        // the unreadable file is left untouched
        assert_eq!(
            std::fs::read(&february).unwrap(),
            b"Time Elapsed (minutes),Energy Saving (kWh)\n5,\xff\xfe\n".to_vec()
        );
    }
}
