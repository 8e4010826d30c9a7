use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::proxy::ProxyDescriptor;

/// Which check produced a verdict. The first five are probes; `Syntax` and
/// `None` only appear on synthetic verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Smtp,
    Mx,
    Imap,
    Pop3,
    Http,
    Syntax,
    None,
}

impl Method {
    pub const PROBES: [Method; 5] = [Self::Smtp, Self::Mx, Self::Imap, Self::Pop3, Self::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Mx => "mx",
            Self::Imap => "imap",
            Self::Pop3 => "pop3",
            Self::Http => "http",
            Self::Syntax => "syntax",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown probe method '{0}'")]
pub struct UnknownMethod(pub String);

/// Only probe names parse; `syntax` and `none` are never requested.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "mx" => Ok(Self::Mx),
            "imap" => Ok(Self::Imap),
            "pop3" => Ok(Self::Pop3),
            "http" => Ok(Self::Http),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    /// Not definitively rejected. Does not prove the inbox exists.
    Valid,
    Invalid,
    Disposable,
    Error,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Disposable => "disposable",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of one probe or of a whole escalation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub email: String,
    pub status: VerdictStatus,
    #[serde(rename = "method_used")]
    pub method: Method,
    pub details: String,
    #[serde(rename = "proxy_used")]
    pub proxy: String,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl Verdict {
    pub fn new(
        email: impl Into<String>,
        status: VerdictStatus,
        method: Method,
        details: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            status,
            method,
            details: details.into(),
            proxy: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn error(email: impl Into<String>, method: Method, details: impl Into<String>) -> Self {
        Self::new(email, VerdictStatus::Error, method, details)
    }

    pub fn with_proxy(mut self, proxy: Option<&ProxyDescriptor>) -> Self {
        self.proxy = proxy.map(ToString::to_string).unwrap_or_default();
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == VerdictStatus::Valid
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
