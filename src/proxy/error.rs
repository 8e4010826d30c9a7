use std::io;

use thiserror::Error;

/// Failures of the proxy itself: malformed descriptors, unreachable proxy,
/// handshake or authentication problems.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid proxy descriptor '{input}': {reason}")]
    Parse { input: String, reason: String },
    #[error("unknown proxy scheme '{0}'")]
    UnknownScheme(String),
    #[error("connection to proxy {proxy} failed: {source}")]
    Connect {
        proxy: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake with proxy failed: {source}")]
    Tls {
        #[source]
        source: io::Error,
    },
    #[error("proxy handshake failed: {0}")]
    Handshake(String),
    #[error("proxy rejected the supplied credentials")]
    AuthRejected,
    #[error("proxy I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("{probe} probe cannot route traffic through a proxy")]
    Unsupported { probe: &'static str },
    #[cfg(feature = "with-http")]
    #[error("HTTP client proxy configuration failed: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

impl ProxyError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn connect(proxy: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            proxy: proxy.into(),
            source,
        }
    }

    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io { source }
    }
}

/// Outcome of a failed dial towards a mail host, direct or tunnelled.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("no socket address resolved for {target}")]
    Unresolved { target: String },
    #[error("connection to {target} failed: {source}")]
    Target {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("proxy could not reach {target}: {reason}")]
    Refused { target: String, reason: String },
    #[error("transport error: {0}")]
    Proxy(#[from] ProxyError),
}

impl DialError {
    /// True when the failure lies with the proxy rather than the target host.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }
}
