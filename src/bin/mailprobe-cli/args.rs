use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mailprobe-cli", version, about = "Multi-protocol mailbox deliverability probing")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,

    /// fichier de configuration TOML
    #[arg(long, env = "MAILPROBE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// timeout par tentative en ms (prend le pas sur la config)
    #[arg(long = "timeout", global = true)]
    pub timeout_ms: Option<u64>,

    /// verbosité des logs (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a single address
    Check(CheckArgs),
    /// Probe every address of one or more input files
    Batch(BatchArgs),
    /// Test a list of proxies against a URL
    #[cfg(feature = "with-http")]
    #[command(name = "check-proxies")]
    CheckProxies(ProxyArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// adresse e-mail à tester
    pub email: String,

    /// mot de passe de la boîte (sondes imap/pop3)
    #[arg(long, env = "MAILPROBE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// ordre des méthodes: auto | smtp | mx,http,...
    #[arg(long)]
    pub method: Option<String>,

    /// proxy: [scheme://][user:pass@]host:port
    #[arg(long)]
    pub proxy: Option<String>,

    /// pause entre deux méthodes (ms)
    #[arg(long = "delay-ms")]
    pub delay_ms: Option<u64>,

    /// format: human|json
    #[arg(long, default_value = "human")]
    pub format: String,
}

#[derive(Args)]
pub struct BatchArgs {
    /// fichier d'entrée: lignes email[:password] ou tableau .json (répétable)
    #[arg(long, required = true)]
    pub input: Vec<PathBuf>,

    /// ordre des méthodes: auto | smtp | mx,http,...
    #[arg(long)]
    pub method: Option<String>,

    /// nombre d'adresses sondées en parallèle
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// pause entre deux méthodes (ms)
    #[arg(long = "delay-ms")]
    pub delay_ms: Option<u64>,

    /// liste de proxies, un par ligne, attribués en round-robin
    #[arg(long = "proxy-file")]
    pub proxy_file: Option<PathBuf>,

    /// dossier recevant good.csv et bad.csv
    #[arg(long = "results-dir")]
    pub results_dir: Option<PathBuf>,

    /// format: human|json|ndjson
    #[arg(long, default_value = "human")]
    pub format: String,

    /// write report to file (JSON/NDJSON selon --format)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// désactive la barre de progression
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

#[cfg(feature = "with-http")]
#[derive(Args)]
pub struct ProxyArgs {
    /// liste de proxies, un par ligne
    #[arg(long)]
    pub input: PathBuf,

    /// URL interrogée à travers chaque proxy
    #[arg(long = "test-url")]
    pub test_url: Option<String>,

    /// timeout par proxy (ms)
    #[arg(long = "timeout-ms", default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// format: human|json
    #[arg(long, default_value = "human")]
    pub format: String,
}
