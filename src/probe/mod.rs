//! Protocol probes.
//!
//! Each probe asks one kind of server about one address and folds every
//! outcome, including network failures, into a [`Verdict`]. Probes never
//! return `Err`: a timeout or a refused connection is data.
//!
//! All probes first run the same pre-flight screening: syntax (an invalid
//! address yields an `invalid` verdict with method `syntax`), then the
//! disposable-domain check, then the proxy capability check.

mod dns;
mod error;
#[cfg(feature = "with-http")]
mod http;
mod imap;
mod mx;
mod options;
mod pop3;
mod smtp;
mod stream;
mod verdict;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use native_tls::TlsConnector;

pub use dns::{DnsLookup, MxRecord, MxStatus, SystemDns};
pub use error::{DnsError, SessionError};
#[cfg(feature = "with-http")]
pub use http::HttpProbe;
pub use imap::ImapProbe;
pub use mx::MxProbe;
pub use options::{Endpoint, ProbeOptions, Security};
pub use pop3::Pop3Probe;
pub use smtp::SmtpProbe;
pub use verdict::{Method, UnknownMethod, Verdict, VerdictStatus};

use crate::address::{self, AddressParts};
use crate::proxy::{ProxyDescriptor, ProxyError};

/// Whether a probe can send its traffic through a [`ProxyDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRoute {
    /// TCP tunnelled through SOCKS5 or HTTP CONNECT.
    Tunnel,
    /// Requests go through the HTTP client's proxy support.
    HttpClient,
    /// DNS traffic; cannot be proxied.
    Unsupported,
}

/// One address to check, with the optional mailbox password and proxy.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest<'a> {
    pub address: &'a str,
    pub password: Option<&'a str>,
    pub proxy: Option<&'a ProxyDescriptor>,
}

impl<'a> ProbeRequest<'a> {
    pub fn new(address: &'a str) -> Self {
        Self {
            address,
            password: None,
            proxy: None,
        }
    }

    pub fn with_password(mut self, password: Option<&'a str>) -> Self {
        self.password = password;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<&'a ProxyDescriptor>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Build the verdict for this request, stamping proxy and elapsed time.
    pub(crate) fn conclude(
        &self,
        method: Method,
        status: VerdictStatus,
        details: impl Into<String>,
        started: Instant,
    ) -> Verdict {
        Verdict::new(self.address.trim(), status, method, details)
            .with_proxy(self.proxy)
            .with_elapsed(started.elapsed())
    }
}

/// A single verification strategy.
pub trait Probe: Send + Sync {
    fn method(&self) -> Method;

    fn proxy_route(&self) -> ProxyRoute;

    /// Never panics on network failures; every outcome is a verdict.
    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict;
}

/// Screening shared by all probes. `Err` carries the early verdict.
pub(crate) fn screen<'a>(
    method: Method,
    route: ProxyRoute,
    request: &ProbeRequest<'a>,
    started: Instant,
) -> Result<AddressParts<'a>, Verdict> {
    let parts = address::split_address(request.address).map_err(|err| {
        request.conclude(
            Method::Syntax,
            VerdictStatus::Invalid,
            format!("{}: {err}", err.code()),
            started,
        )
    })?;
    if address::is_disposable(parts.domain) {
        return Err(request.conclude(
            method,
            VerdictStatus::Disposable,
            format!("disposable domain {}", parts.domain),
            started,
        ));
    }
    if request.proxy.is_some() && route == ProxyRoute::Unsupported {
        let err = ProxyError::Unsupported {
            probe: method.as_str(),
        };
        return Err(request.conclude(
            method,
            VerdictStatus::Error,
            format!("transport: {err}"),
            started,
        ));
    }
    Ok(parts)
}

/// Connector for STARTTLS and implicit TLS, with certificate verification:
/// IMAP and POP3 probes send the mailbox password over it.
pub(crate) fn tls_connector() -> Result<TlsConnector, SessionError> {
    TlsConnector::new().map_err(|err| SessionError::Tls {
        source: std::io::Error::other(err),
    })
}

/// Probes keyed by method, shared read-only by concurrent escalations.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: BTreeMap<Method, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in probe, resolving through the system DNS configuration.
    pub fn standard(options: ProbeOptions) -> Self {
        let dns: Arc<dyn DnsLookup> = Arc::new(SystemDns::new(options.timeout));
        Self::with_dns(Arc::new(options), dns)
    }

    pub fn with_dns(options: Arc<ProbeOptions>, dns: Arc<dyn DnsLookup>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SmtpProbe::new(Arc::clone(&options), Arc::clone(&dns))));
        registry.register(Arc::new(MxProbe::new(Arc::clone(&dns))));
        registry.register(Arc::new(ImapProbe::new(Arc::clone(&options))));
        registry.register(Arc::new(Pop3Probe::new(Arc::clone(&options))));
        #[cfg(feature = "with-http")]
        registry.register(Arc::new(HttpProbe::new(Arc::clone(&options), Arc::clone(&dns))));
        registry
    }

    /// Add or replace the probe for `probe.method()`.
    pub fn register(&mut self, probe: Arc<dyn Probe>) {
        self.probes.insert(probe.method(), probe);
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.register(probe);
        self
    }

    pub fn get(&self, method: Method) -> Option<&dyn Probe> {
        self.probes.get(&method).map(|probe| probe.as_ref())
    }

    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.probes.keys().copied()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.probes.keys()).finish()
    }
}
