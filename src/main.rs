mod aggregator;
mod cleaner;
mod cli;
mod error;
mod fmt;
mod layout;
mod loader;
mod metrics;
mod models;
mod pipeline;
mod settings;
mod writer;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Scoped to this invocation; nothing is installed globally.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.log_level.as_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || match cli.command {
        Commands::Run { config, domain } => cli::run::run(&config, &domain),
        Commands::Clean { config, domain } => cli::clean::run(&config, &domain),
        Commands::Summarize {
            config,
            domain,
            csv,
        } => cli::summarize::run(&config, &domain, csv.as_deref()),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
