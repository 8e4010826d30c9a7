use std::sync::Arc;
use std::time::Instant;

use super::dns::{DnsLookup, MxStatus};
use super::{DnsError, Method, Probe, ProbeRequest, ProxyRoute, Verdict, VerdictStatus, screen};

/// Checks that the domain publishes MX records. Says nothing about the
/// mailbox itself.
pub struct MxProbe {
    dns: Arc<dyn DnsLookup>,
}

impl MxProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }
}

impl Probe for MxProbe {
    fn method(&self) -> Method {
        Method::Mx
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Unsupported
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        let started = Instant::now();
        let parts = match screen(Method::Mx, self.proxy_route(), request, started) {
            Ok(parts) => parts,
            Err(verdict) => return verdict,
        };
        let (status, details) = match self.dns.lookup_mx(parts.domain) {
            Ok(MxStatus::Records(records)) => {
                let hosts = records
                    .iter()
                    .map(|record| format!("{} ({})", record.exchange, record.preference))
                    .collect::<Vec<_>>()
                    .join(", ");
                (VerdictStatus::Valid, format!("MX: {hosts}"))
            }
            Ok(MxStatus::NoRecords) => (VerdictStatus::Invalid, "no_mx_records".to_string()),
            Err(err @ DnsError::Timeout { .. }) => (VerdictStatus::Error, format!("dns timeout: {err}")),
            Err(err) => (VerdictStatus::Error, format!("dns: {err}")),
        };
        request.conclude(Method::Mx, status, details, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::dns::stub::StubDns;
    use crate::probe::MxRecord;

    fn probe(dns: StubDns) -> MxProbe {
        MxProbe::new(Arc::new(dns))
    }

    #[test]
    fn records_make_the_domain_valid() {
        let dns = StubDns::with_mx(vec![MxRecord::new(10, "mx1.example.com")]);
        let verdict = probe(dns).probe(&ProbeRequest::new("someone@example.com"));
        assert_eq!(verdict.status, VerdictStatus::Valid);
        assert_eq!(verdict.method, Method::Mx);
        insta::assert_snapshot!(verdict.details, @"MX: mx1.example.com (10)");
    }

    #[test]
    fn empty_answer_is_invalid() {
        let dns = StubDns::new(|_| Ok(MxStatus::NoRecords), |_| Ok(true));
        let verdict = probe(dns).probe(&ProbeRequest::new("someone@example.com"));
        assert_eq!(verdict.status, VerdictStatus::Invalid);
        assert_eq!(verdict.details, "no_mx_records");
    }

    #[test]
    fn timeout_is_an_error() {
        let dns = StubDns::new(
            |name| {
                Err(DnsError::Timeout {
                    name: name.to_string(),
                })
            },
            |_| Ok(true),
        );
        let verdict = probe(dns).probe(&ProbeRequest::new("someone@example.com"));
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(verdict.details.contains("timeout"), "{}", verdict.details);
    }

    #[test]
    fn proxy_cannot_carry_dns() {
        let dns = StubDns::new(|_| panic!("no lookup expected"), |_| panic!("no lookup expected"));
        let proxy = "socks5://127.0.0.1:1080".parse().unwrap();
        let request = ProbeRequest::new("someone@example.com").with_proxy(Some(&proxy));
        let verdict = probe(dns).probe(&request);
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(verdict.details.starts_with("transport:"), "{}", verdict.details);
        assert_eq!(verdict.proxy, "socks5://127.0.0.1:1080");
    }

    #[test]
    fn malformed_address_never_reaches_dns() {
        let dns = StubDns::new(|_| panic!("no lookup expected"), |_| panic!("no lookup expected"));
        let verdict = probe(dns).probe(&ProbeRequest::new("not-an-address"));
        assert_eq!(verdict.status, VerdictStatus::Invalid);
        assert_eq!(verdict.method, Method::Syntax);
        assert!(verdict.details.starts_with("invalid_format"), "{}", verdict.details);
    }
}
