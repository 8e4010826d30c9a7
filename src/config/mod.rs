//! Runtime settings: built-in defaults, overridden by an optional TOML file.
//!
//! ```toml
//! [network]
//! timeout = 10
//!
//! [smtp]
//! mail_from = "check@example.com"
//! max_mx = 3
//!
//! [mailbox]
//! imap_hosts = ["imap", "mail"]
//!
//! [batch]
//! concurrency = 10
//! delay_ms = 100
//! results_dir = "results"
//! method = "auto"
//! ```

mod file;

pub use file::ConfigFile;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::batch::{DEFAULT_CONCURRENCY, DEFAULT_DELAY};
use crate::escalate::MethodOrder;
use crate::probe::ProbeOptions;

pub const CONFIG_ENV: &str = "MAILPROBE_CONFIG";
pub const DEFAULT_RESULTS_DIR: &str = "results";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub concurrency: usize,
    pub delay: Duration,
    pub results_dir: PathBuf,
    pub order: MethodOrder,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delay: DEFAULT_DELAY,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            order: MethodOrder::auto(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub probe: ProbeOptions,
    pub batch: BatchSettings,
}

impl Settings {
    /// Defaults, overridden by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "config file loaded");
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        let probe = &mut settings.probe;

        if let Some(secs) = file.network.timeout {
            probe.timeout = Duration::from_secs(secs);
        }
        if let Some(user_agent) = file.network.user_agent {
            probe.user_agent = user_agent;
        }
        if let Some(prefixes) = file.network.http_prefixes {
            probe.http_prefixes = prefixes;
        }

        if let Some(mail_from) = file.smtp.mail_from {
            if !mail_from.contains('@') {
                return Err(ConfigError::Invalid {
                    key: "smtp.mail_from",
                    reason: format!("'{mail_from}' is not an address"),
                });
            }
            probe.mail_from = mail_from;
        }
        if let Some(helo) = file.smtp.helo.filter(|helo| !helo.trim().is_empty()) {
            probe.helo = helo;
        }
        if let Some(max_mx) = file.smtp.max_mx {
            probe.max_mx = max_mx.max(1);
        }

        if let Some(hosts) = file.mailbox.imap_hosts {
            probe.imap_hosts = non_empty("mailbox.imap_hosts", hosts)?;
        }
        if let Some(hosts) = file.mailbox.pop3_hosts {
            probe.pop3_hosts = non_empty("mailbox.pop3_hosts", hosts)?;
        }

        let batch = &mut settings.batch;
        if let Some(concurrency) = file.batch.concurrency {
            batch.concurrency = concurrency.max(1);
        }
        if let Some(delay_ms) = file.batch.delay_ms {
            batch.delay = Duration::from_millis(delay_ms);
        }
        if let Some(dir) = file.batch.results_dir {
            batch.results_dir = PathBuf::from(dir);
        }
        if let Some(order) = file.batch.method {
            batch.order = order;
        }
        Ok(settings)
    }
}

fn non_empty(key: &'static str, hosts: Vec<String>) -> Result<Vec<String>, ConfigError> {
    if hosts.is_empty() {
        Err(ConfigError::Invalid {
            key,
            reason: "at least one host label is required".to_string(),
        })
    } else {
        Ok(hosts)
    }
}
