pub mod clean;
pub mod run;
pub mod summarize;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{Result, SavingsError};
use crate::metrics::{self, Domain, ALL_DOMAINS};

/// Resolve a `--domain` value: one domain key, or `all`.
pub(crate) fn parse_domains(key: &str) -> Result<Vec<Domain>> {
    if key.eq_ignore_ascii_case("all") {
        return Ok(ALL_DOMAINS.to_vec());
    }
    match metrics::get_by_key(key) {
        Some(d) => Ok(vec![d]),
        None => {
            let valid: Vec<&str> = ALL_DOMAINS.iter().map(|d| d.key()).collect();
            Err(SavingsError::UnknownDomain(format!(
                "{key} (expected one of: {}, all)",
                valid.join(", ")
            )))
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "site-savings",
    about = "Monthly and yearly cost-savings workbooks for hybrid power sites."
)]
pub struct Cli {
    /// Log verbosity (written to stderr)
    #[arg(long = "log-level", value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean, compute and write the savings workbook for each month of the year.
    Run {
        /// Path to the JSON run configuration
        #[arg(long)]
        config: String,
        /// Domain key (genset, frequency, harmonics, power-factor, voltage) or `all`
        #[arg(long, default_value = "all")]
        domain: String,
    },
    /// Clean input tables and write them back in place.
    Clean {
        /// Path to the JSON run configuration
        #[arg(long)]
        config: String,
        /// Domain key or `all`
        #[arg(long, default_value = "all")]
        domain: String,
    },
    /// Rebuild a yearly summary from a previously saved workbook.
    Summarize {
        /// Path to the JSON run configuration
        #[arg(long)]
        config: String,
        /// Domain key
        #[arg(long)]
        domain: String,
        /// Also write the summary to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },
}
