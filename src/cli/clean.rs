use std::path::Path;

use colored::Colorize;

use crate::error::Result;
use crate::pipeline;
use crate::settings::load_settings;

use super::parse_domains;

pub fn run(config: &str, domain: &str) -> Result<()> {
    let settings = load_settings(Path::new(config))?;
    for domain in parse_domains(domain)? {
        let reports = pipeline::clean_domain(&settings, domain)?;
        if reports.is_empty() {
            println!("{}: no input files found", domain.key());
            continue;
        }
        for r in &reports {
            match &r.error {
                Some(e) => println!("{}: {}", r.path.display(), format!("failed: {e}").red()),
                None => println!(
                    "{}: {} kept, {} dropped",
                    r.path.display(),
                    r.kept_rows,
                    r.raw_rows - r.kept_rows
                ),
            }
        }
    }
    Ok(())
}
