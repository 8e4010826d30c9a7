use std::io;

use thiserror::Error;

use crate::proxy::DialError;

/// DNS failures. An empty answer is not an error: it is reported as
/// [`MxStatus::NoRecords`](super::MxStatus::NoRecords) or `false`.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: io::Error,
    },
    #[error("DNS lookup for {name} timed out")]
    Timeout { name: String },
    #[error("DNS lookup for {name} failed: {message}")]
    Lookup { name: String, message: String },
}

impl DnsError {
    pub(crate) fn lookup(name: &str, message: impl ToString) -> Self {
        Self::Lookup {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Failure of one protocol dialogue with one endpoint.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake failed: {source}")]
    Tls {
        #[source]
        source: io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// True when the configured proxy failed; the probe must stop and report
    /// an `Error` verdict instead of trying the next endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Dial(dial) if dial.is_transport())
    }
}
