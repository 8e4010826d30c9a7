use std::time::Duration;

use trust_dns_resolver::Resolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::system_conf::read_system_conf;

use super::DnsError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxStatus {
    /// Sorted by ascending preference, deduplicated.
    Records(Vec<MxRecord>),
    NoRecords,
}

impl MxStatus {
    pub fn records(&self) -> &[MxRecord] {
        match self {
            Self::Records(records) => records.as_slice(),
            Self::NoRecords => &[],
        }
    }
}

/// The DNS queries the probes need. Implemented by [`SystemDns`] and by stubs
/// in tests.
pub trait DnsLookup: Send + Sync {
    fn lookup_mx(&self, domain: &str) -> Result<MxStatus, DnsError>;

    /// Whether `host` has at least one A/AAAA record.
    fn host_exists(&self, host: &str) -> Result<bool, DnsError>;
}

/// System resolver configuration with the probe timeout applied to every
/// query. A fresh resolver is built per lookup so no state is shared between
/// concurrent probes.
#[derive(Debug, Clone)]
pub struct SystemDns {
    timeout: Duration,
}

impl SystemDns {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn resolver(&self) -> Result<Resolver, DnsError> {
        let (config, mut opts) =
            read_system_conf().map_err(|err| DnsError::ResolverInit { source: err.into() })?;
        if !self.timeout.is_zero() {
            opts.timeout = self.timeout;
        }
        opts.attempts = 1;
        Resolver::new(config, opts).map_err(|source| DnsError::ResolverInit { source })
    }
}

impl DnsLookup for SystemDns {
    fn lookup_mx(&self, domain: &str) -> Result<MxStatus, DnsError> {
        let resolver = self.resolver()?;
        let records = match resolver.mx_lookup(domain) {
            Ok(lookup) => lookup
                .iter()
                .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8())))
                .collect(),
            Err(err) if is_empty_answer(&err) => Vec::new(),
            Err(err) => return Err(classify(domain, err)),
        };
        Ok(into_status(records))
    }

    fn host_exists(&self, host: &str) -> Result<bool, DnsError> {
        let resolver = self.resolver()?;
        match resolver.lookup_ip(host) {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(err) if is_empty_answer(&err) => Ok(false),
            Err(err) => Err(classify(host, err)),
        }
    }
}

fn is_empty_answer(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

fn classify(name: &str, err: ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::Timeout => DnsError::Timeout {
            name: name.to_string(),
        },
        _ => DnsError::lookup(name, err),
    }
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

pub(crate) fn into_status(mut records: Vec<MxRecord>) -> MxStatus {
    records.sort();
    records.dedup();
    if records.is_empty() {
        MxStatus::NoRecords
    } else {
        MxStatus::Records(records)
    }
}

/// Up to `max_hosts` SMTP hosts for `domain`, by MX preference. A domain
/// without MX records falls back to itself (implicit MX).
pub(crate) fn smtp_hosts(
    dns: &dyn DnsLookup,
    domain: &str,
    max_hosts: usize,
) -> Result<Vec<String>, DnsError> {
    let mut hosts: Vec<String> = match dns.lookup_mx(domain)? {
        MxStatus::Records(records) => records
            .into_iter()
            .map(|record| record.exchange)
            .filter(|exchange| !exchange.is_empty())
            .collect(),
        MxStatus::NoRecords => Vec::new(),
    };
    // null MX (RFC 7505) leaves nothing to dial either
    if hosts.is_empty() {
        hosts.push(domain.to_string());
    }
    hosts.dedup();
    hosts.truncate(max_hosts.max(1));
    Ok(hosts)
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;

    type MxFn = dyn Fn(&str) -> Result<MxStatus, DnsError> + Send + Sync;
    type HostFn = dyn Fn(&str) -> Result<bool, DnsError> + Send + Sync;

    pub(crate) struct StubDns {
        pub on_mx: Box<MxFn>,
        pub on_host: Box<HostFn>,
    }

    impl StubDns {
        pub(crate) fn new<M, H>(on_mx: M, on_host: H) -> Self
        where
            M: Fn(&str) -> Result<MxStatus, DnsError> + Send + Sync + 'static,
            H: Fn(&str) -> Result<bool, DnsError> + Send + Sync + 'static,
        {
            Self {
                on_mx: Box::new(on_mx),
                on_host: Box::new(on_host),
            }
        }

        pub(crate) fn with_mx(records: Vec<MxRecord>) -> Self {
            let status = into_status(records);
            Self::new(move |_| Ok(status.clone()), |_| Ok(true))
        }
    }

    impl DnsLookup for StubDns {
        fn lookup_mx(&self, domain: &str) -> Result<MxStatus, DnsError> {
            (self.on_mx)(domain)
        }

        fn host_exists(&self, host: &str) -> Result<bool, DnsError> {
            (self.on_host)(host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubDns;
    use super::*;

    #[test]
    fn into_status_sorts_and_dedups() {
        let status = into_status(vec![
            MxRecord::new(20, "mx2.example.com"),
            MxRecord::new(10, "mx1.example.com"),
            MxRecord::new(10, "mx1.example.com"),
        ]);
        assert_eq!(
            status.records(),
            &[
                MxRecord::new(10, "mx1.example.com"),
                MxRecord::new(20, "mx2.example.com")
            ]
        );
        assert_eq!(into_status(Vec::new()), MxStatus::NoRecords);
    }

    #[test]
    fn exchange_is_normalized() {
        assert_eq!(normalize_exchange("MX1.Example.COM."), "mx1.example.com");
    }

    #[test]
    fn smtp_hosts_caps_at_max_mx() {
        let dns = StubDns::with_mx(vec![
            MxRecord::new(30, "c.example.com"),
            MxRecord::new(10, "a.example.com"),
            MxRecord::new(20, "b.example.com"),
            MxRecord::new(40, "d.example.com"),
        ]);
        let hosts = smtp_hosts(&dns, "example.com", 3).unwrap();
        assert_eq!(hosts, vec!["a.example.com", "b.example.com", "c.example.com"]);
    }

    #[test]
    fn smtp_hosts_falls_back_to_domain() {
        let dns = StubDns::new(|_| Ok(MxStatus::NoRecords), |_| Ok(true));
        assert_eq!(smtp_hosts(&dns, "example.com", 3).unwrap(), vec!["example.com"]);
    }

    #[test]
    fn smtp_hosts_propagates_timeouts() {
        let dns = StubDns::new(
            |name| {
                Err(DnsError::Timeout {
                    name: name.to_string(),
                })
            },
            |_| Ok(true),
        );
        assert!(matches!(
            smtp_hosts(&dns, "example.com", 3),
            Err(DnsError::Timeout { .. })
        ));
    }
}
