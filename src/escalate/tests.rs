use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use proptest::prelude::*;

use super::*;
use crate::probe::ProxyRoute;

struct FakeProbe {
    method: Method,
    status: VerdictStatus,
    calls: AtomicUsize,
}

impl FakeProbe {
    fn new(method: Method, status: VerdictStatus) -> Arc<Self> {
        Arc::new(Self {
            method,
            status,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for FakeProbe {
    fn method(&self) -> Method {
        self.method
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Tunnel
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Verdict::new(request.address, self.status, self.method, format!("fake {}", self.method))
    }
}

struct PanickingProbe;

impl Probe for PanickingProbe {
    fn method(&self) -> Method {
        Method::Imap
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Tunnel
    }

    fn probe(&self, _request: &ProbeRequest<'_>) -> Verdict {
        panic!("boom")
    }
}

fn registry(probes: &[Arc<FakeProbe>]) -> ProbeRegistry {
    probes
        .iter()
        .fold(ProbeRegistry::empty(), |registry, probe| registry.with_probe(probe.clone()))
}

#[test]
fn order_parsing() {
    assert_eq!(MethodOrder::parse("auto"), MethodOrder::auto());
    assert_eq!(MethodOrder::parse(" AUTO "), MethodOrder::auto());
    assert_eq!(MethodOrder::parse("smtp").names(), ["smtp"]);
    assert_eq!(MethodOrder::parse("MX, http,").names(), ["mx", "http"]);
    assert_eq!(MethodOrder::auto().names(), ["smtp", "mx", "imap", "pop3", "http"]);
}

#[test]
fn order_deserializes_from_string_or_list() {
    let from_str: MethodOrder = serde_json::from_str(r#""auto""#).unwrap();
    assert_eq!(from_str, MethodOrder::auto());
    let from_list: MethodOrder = serde_json::from_str(r#"["imap", "carrier-pigeon"]"#).unwrap();
    assert_eq!(from_list.names(), ["imap", "carrier-pigeon"]);
}

#[test]
fn stops_at_first_valid() {
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Invalid);
    let http = FakeProbe::new(Method::Http, VerdictStatus::Valid);
    let smtp = FakeProbe::new(Method::Smtp, VerdictStatus::Valid);
    let registry = registry(&[mx.clone(), http.clone(), smtp.clone()]);

    let order = MethodOrder::parse("mx,http,smtp");
    let verdict = escalate(&registry, &ProbeRequest::new("user@example.com"), &order, Duration::ZERO);
    assert_eq!(verdict.status, VerdictStatus::Valid);
    assert_eq!(verdict.method, Method::Http);
    assert_eq!((mx.calls(), http.calls(), smtp.calls()), (1, 1, 0));
}

#[test]
fn returns_last_verdict_when_nothing_is_valid() {
    let smtp = FakeProbe::new(Method::Smtp, VerdictStatus::Error);
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Invalid);
    let registry = registry(&[smtp.clone(), mx.clone()]);

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("smtp,mx"),
        Duration::ZERO,
    );
    assert_eq!(verdict.status, VerdictStatus::Invalid);
    assert_eq!(verdict.method, Method::Mx);
    assert_eq!((smtp.calls(), mx.calls()), (1, 1));
}

#[test]
fn only_valid_ends_the_chain_early() {
    let smtp = FakeProbe::new(Method::Smtp, VerdictStatus::Disposable);
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Invalid);
    let registry = registry(&[smtp.clone(), mx.clone()]);

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("smtp,mx"),
        Duration::ZERO,
    );
    assert_eq!(verdict.status, VerdictStatus::Invalid);
    assert_eq!(verdict.method, Method::Mx);
    assert_eq!((smtp.calls(), mx.calls()), (1, 1));
}

#[test]
fn unknown_methods_are_skipped() {
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Valid);
    let registry = registry(&[mx.clone()]);

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("carrier-pigeon,pop3,mx"),
        Duration::ZERO,
    );
    assert_eq!(verdict.method, Method::Mx);
    assert_eq!(mx.calls(), 1);
}

#[test]
fn no_supported_method_yields_none() {
    let registry = registry(&[FakeProbe::new(Method::Mx, VerdictStatus::Valid)]);
    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("carrier-pigeon"),
        Duration::ZERO,
    );
    assert_eq!(verdict.status, VerdictStatus::Error);
    assert_eq!(verdict.method, Method::None);
    assert_eq!(verdict.details, NO_SUPPORTED_METHOD);
    assert_eq!(verdict.email, "user@example.com");
}

#[test]
fn disposable_is_attributed_to_the_first_method() {
    let probes: Vec<_> = Method::PROBES
        .iter()
        .map(|method| FakeProbe::new(*method, VerdictStatus::Valid))
        .collect();
    let registry = registry(&probes);

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@mailinator.com"),
        &MethodOrder::auto(),
        Duration::ZERO,
    );
    assert_eq!(verdict.status, VerdictStatus::Disposable);
    assert_eq!(verdict.method, Method::Smtp);
    assert!(verdict.details.contains("disposable"));
    assert!(probes.iter().all(|probe| probe.calls() == 0));
}

#[test]
fn delay_only_between_attempts() {
    let smtp = FakeProbe::new(Method::Smtp, VerdictStatus::Error);
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Error);
    let registry = registry(&[smtp, mx]);

    let started = Instant::now();
    escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("smtp,mx"),
        Duration::from_millis(100),
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
}

#[test]
fn panicking_probe_becomes_error_and_escalation_continues() {
    let mx = FakeProbe::new(Method::Mx, VerdictStatus::Valid);
    let registry = registry(&[mx.clone()]).with_probe(Arc::new(PanickingProbe));

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("imap"),
        Duration::ZERO,
    );
    assert_eq!(verdict.status, VerdictStatus::Error);
    assert_eq!(verdict.method, Method::Imap);
    assert!(verdict.details.contains("boom"), "{}", verdict.details);

    let verdict = escalate(
        &registry,
        &ProbeRequest::new("user@example.com"),
        &MethodOrder::parse("imap,mx"),
        Duration::ZERO,
    );
    assert_eq!(verdict.method, Method::Mx);
}

proptest! {
    #[test]
    fn malformed_addresses_never_reach_a_probe(local in "[a-z]{0,8}", domain in "[a-z]{0,8}") {
        // no '@' at all, or no dot in the domain
        let candidates = [format!("{local}{domain}"), format!("{local}@{domain}")];
        let probes: Vec<_> = Method::PROBES
            .iter()
            .map(|method| FakeProbe::new(*method, VerdictStatus::Valid))
            .collect();
        let registry = registry(&probes);
        for address in &candidates {
            let verdict = escalate(&registry, &ProbeRequest::new(address), &MethodOrder::auto(), Duration::ZERO);
            prop_assert_eq!(verdict.method, Method::Syntax);
            prop_assert_eq!(verdict.status, VerdictStatus::Invalid);
        }
        prop_assert!(probes.iter().all(|probe| probe.calls() == 0));
    }
}
