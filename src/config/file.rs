//! Structure of the TOML configuration file. Every key is optional.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) network: NetworkConfig,
    #[serde(default)]
    pub(crate) smtp: SmtpConfig,
    #[serde(default)]
    pub(crate) mailbox: MailboxConfig,
    #[serde(default)]
    pub(crate) batch: BatchConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct NetworkConfig {
    /// Seconds, per connect/read/DNS/HTTP attempt. 0 disables the deadline.
    pub(crate) timeout: Option<u64>,
    pub(crate) user_agent: Option<String>,
    pub(crate) http_prefixes: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpConfig {
    pub(crate) mail_from: Option<String>,
    pub(crate) helo: Option<String>,
    pub(crate) max_mx: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct MailboxConfig {
    pub(crate) imap_hosts: Option<Vec<String>>,
    pub(crate) pop3_hosts: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct BatchConfig {
    pub(crate) concurrency: Option<usize>,
    /// Milliseconds between two probe attempts of one item.
    pub(crate) delay_ms: Option<u64>,
    pub(crate) results_dir: Option<String>,
    pub(crate) method: Option<crate::escalate::MethodOrder>,
}
