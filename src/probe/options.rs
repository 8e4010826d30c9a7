use std::time::Duration;

/// How a connection to a mail endpoint gets its TLS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Plain text, upgraded with STARTTLS when the server offers it (SMTP only).
    Plain,
    /// Plain text that must be upgraded before credentials or envelope go out.
    StartTls,
    /// TLS from the first byte.
    Tls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub port: u16,
    pub security: Security,
}

impl Endpoint {
    pub const fn new(port: u16, security: Security) -> Self {
        Self { port, security }
    }
}

/// Knobs shared by every probe. One timeout applies to each DNS query,
/// connect, read and HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub mail_from: String,
    pub helo: String,
    pub max_mx: usize,
    pub smtp_endpoints: Vec<Endpoint>,
    pub imap_hosts: Vec<String>,
    pub imap_endpoints: Vec<Endpoint>,
    pub pop3_hosts: Vec<String>,
    pub pop3_endpoints: Vec<Endpoint>,
    pub http_prefixes: Vec<String>,
    pub user_agent: String,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            mail_from: "check@example.com".to_string(),
            helo: "localhost".to_string(),
            max_mx: 3,
            smtp_endpoints: vec![
                Endpoint::new(25, Security::Plain),
                Endpoint::new(587, Security::StartTls),
                Endpoint::new(465, Security::Tls),
            ],
            imap_hosts: vec!["imap".to_string(), "mail".to_string()],
            imap_endpoints: vec![
                Endpoint::new(143, Security::StartTls),
                Endpoint::new(993, Security::Tls),
            ],
            pop3_hosts: vec!["imap".to_string(), "mail".to_string()],
            pop3_endpoints: vec![
                Endpoint::new(110, Security::StartTls),
                Endpoint::new(995, Security::Tls),
            ],
            http_prefixes: vec![
                "mail.".to_string(),
                "webmail.".to_string(),
                "login.".to_string(),
                String::new(),
            ],
            user_agent: format!("mailprobe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProbeOptions {
    /// Socket deadline; a zero timeout disables it.
    pub fn io_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }
}

/// `<label>.<domain>` for every configured label.
pub(crate) fn mailbox_hosts(labels: &[String], domain: &str) -> Vec<String> {
    labels
        .iter()
        .map(|label| label.trim().trim_end_matches('.'))
        .map(|label| {
            if label.is_empty() {
                domain.to_string()
            } else {
                format!("{label}.{domain}")
            }
        })
        .collect()
}
