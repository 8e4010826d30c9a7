mod args;
mod batch;
mod check;
mod input;
mod output;
#[cfg(feature = "with-http")]
mod proxies;

use std::time::Duration;

use anyhow::{Context, Result};
use args::{Cli, Commands};
use clap::Parser;
use mailprobe::Settings;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // 0 = tout est valide, 2 = au moins un échec, 1 = erreur fatale
    match run(cli) {
        Ok(true) => std::process::exit(2),
        Ok(false) => {}
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Retourne `true` quand le code de sortie doit être 2.
fn run(cli: Cli) -> Result<bool> {
    let mut settings = Settings::load(cli.config.as_deref()).context("load configuration")?;
    if let Some(ms) = cli.timeout_ms {
        settings.probe.timeout = Duration::from_millis(ms);
    }

    match &cli.cmd {
        Commands::Check(args) => check::run(settings, args).map(|valid| !valid),
        Commands::Batch(args) => batch::run(settings, args),
        #[cfg(feature = "with-http")]
        Commands::CheckProxies(args) => proxies::run(args),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
