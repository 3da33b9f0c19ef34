use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::metrics::TOTAL_MONTH_SAVINGS;
use crate::pipeline::{self, DomainRun, MonthStatus};
use crate::settings::load_settings;

use super::parse_domains;
use super::summarize::print_summary;

pub fn run(config: &str, domain: &str) -> Result<()> {
    let settings = load_settings(Path::new(config))?;
    for domain in parse_domains(domain)? {
        let outcome = pipeline::run_domain(&settings, domain)?;
        print_run_report(&outcome);
        print_summary(&settings, domain, &outcome.summary);
        println!(
            "Yearly total: {}\nSaved {}\n",
            money(outcome.summary.totals.get(TOTAL_MONTH_SAVINGS).unwrap_or(0.0)),
            outcome.output.display()
        );
    }
    Ok(())
}

fn print_run_report(outcome: &DomainRun) {
    let mut table = Table::new();
    table.set_header(vec!["Month", "Rows", "Kept", "Status"]);
    for m in &outcome.months {
        let status = match &m.status {
            MonthStatus::Written => "written".green(),
            MonthStatus::Unavailable(reason) => reason.as_str().yellow(),
            MonthStatus::NoData => "no data".dimmed(),
            MonthStatus::Failed(e) => e.as_str().red(),
        };
        table.add_row(vec![
            Cell::new(m.month.name()),
            Cell::new(m.raw_rows),
            Cell::new(m.kept_rows),
            Cell::new(status),
        ]);
    }
    let written = outcome
        .months
        .iter()
        .filter(|m| !matches!(m.status, MonthStatus::NoData | MonthStatus::Failed(_)))
        .count();
    println!(
        "{} {written} of 12 months written\n{table}",
        outcome.domain.key().bold()
    );
}
