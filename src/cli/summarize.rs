use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregator::{YearlySummary, TOTALS_LABEL};
use crate::error::{Result, SavingsError};
use crate::fmt::amount;
use crate::metrics::Domain;
use crate::pipeline;
use crate::settings::{load_settings, Settings};

use super::parse_domains;

pub fn run(config: &str, domain: &str, csv: Option<&str>) -> Result<()> {
    let settings = load_settings(Path::new(config))?;
    let domain = match parse_domains(domain)?.as_slice() {
        [d] => *d,
        _ => {
            return Err(SavingsError::Other(
                "summarize takes a single domain".to_string(),
            ))
        }
    };

    let (path, summary) = pipeline::summarize_domain(&settings, domain);
    println!("Read from {}", path.display());
    print_summary(&settings, domain, &summary);

    if let Some(out) = csv {
        export_csv(Path::new(out), &summary)?;
        println!("Summary written to {out}");
    }
    Ok(())
}

pub(crate) fn print_summary(settings: &Settings, domain: Domain, summary: &YearlySummary) {
    let mut header = vec!["Month".to_string()];
    header.extend(summary.metric_names.iter().cloned());

    let mut table = Table::new();
    table.set_header(header);
    for (month, metrics) in &summary.months {
        let mut row = vec![Cell::new(month.name())];
        row.extend(
            summary
                .metric_names
                .iter()
                .map(|n| Cell::new(amount(metrics.get(n).unwrap_or(0.0), 2))),
        );
        table.add_row(row);
    }
    let mut totals = vec![Cell::new(TOTALS_LABEL.bold())];
    totals.extend(
        summary
            .metric_names
            .iter()
            .map(|n| Cell::new(amount(summary.totals.get(n).unwrap_or(0.0), 2).bold())),
    );
    table.add_row(totals);

    let title = format!(
        "{} {} savings, {}",
        settings.site,
        domain.key(),
        settings.year
    );
    println!("{}\n{table}", title.green().bold());
}

fn export_csv(path: &Path, summary: &YearlySummary) -> Result<()> {
    let table = summary.to_table();
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
