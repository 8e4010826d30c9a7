//! Method escalation: run probes in a caller-chosen order until one says
//! `valid`.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address;
use crate::probe::{Method, Probe, ProbeRegistry, ProbeRequest, Verdict, VerdictStatus};

/// Order used for `"auto"`: most to least conclusive.
pub const DEFAULT_ORDER: [Method; 5] = [Method::Smtp, Method::Mx, Method::Imap, Method::Pop3, Method::Http];

pub const NO_SUPPORTED_METHOD: &str = "no supported method in the requested order";

/// Requested probe order. Accepts `"auto"`, a single name, a comma-separated
/// list or a JSON array. Unknown names are kept here and skipped at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OrderInput", into = "Vec<String>")]
pub struct MethodOrder(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderInput {
    One(String),
    Many(Vec<String>),
}

impl From<OrderInput> for MethodOrder {
    fn from(input: OrderInput) -> Self {
        match input {
            OrderInput::One(raw) => Self::parse(&raw),
            OrderInput::Many(names) => Self::from_names(names),
        }
    }
}

impl From<MethodOrder> for Vec<String> {
    fn from(order: MethodOrder) -> Self {
        order.0
    }
}

impl Default for MethodOrder {
    fn default() -> Self {
        Self::auto()
    }
}

impl MethodOrder {
    pub fn auto() -> Self {
        Self::from_names(DEFAULT_ORDER.iter().map(Method::as_str))
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("auto") {
            return Self::auto();
        }
        Self::from_names(raw.split(','))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Probes from `registry` in this order; unknown or unregistered names
    /// are dropped.
    pub fn resolve<'r>(&self, registry: &'r ProbeRegistry) -> Vec<&'r dyn Probe> {
        self.0
            .iter()
            .filter_map(|name| match name.parse::<Method>() {
                Ok(method) => {
                    let probe = registry.get(method);
                    if probe.is_none() {
                        debug!(%method, "method not available, skipped");
                    }
                    probe
                }
                Err(err) => {
                    debug!(error = %err, "skipped");
                    None
                }
            })
            .collect()
    }
}

/// Run the probes named by `order` until one returns `valid`.
///
/// - a malformed address yields `invalid` with method `syntax`, and a
///   disposable domain yields `disposable` attributed to the first probe in
///   the order; no probe runs in either case
/// - `delay` is slept between two probe attempts, never after the last
/// - without a `valid` verdict the last probe's verdict is returned
/// - when no name in `order` maps to a registered probe the result is an
///   `error` verdict with method `none`
pub fn escalate(
    registry: &ProbeRegistry,
    request: &ProbeRequest<'_>,
    order: &MethodOrder,
    delay: Duration,
) -> Verdict {
    let started = Instant::now();
    let probes = order.resolve(registry);
    let Some(first) = probes.first() else {
        return request.conclude(Method::None, VerdictStatus::Error, NO_SUPPORTED_METHOD, started);
    };

    match address::split_address(request.address) {
        Err(err) => {
            return request.conclude(
                Method::Syntax,
                VerdictStatus::Invalid,
                format!("{}: {err}", err.code()),
                started,
            );
        }
        Ok(parts) if address::is_disposable(parts.domain) => {
            return request.conclude(
                first.method(),
                VerdictStatus::Disposable,
                format!("disposable domain {}", parts.domain),
                started,
            );
        }
        Ok(_) => {}
    }

    let mut last = None;
    for (position, probe) in probes.iter().enumerate() {
        if position > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        let verdict = invoke(*probe, request);
        debug!(
            email = %request.address,
            method = %verdict.method,
            status = %verdict.status,
            details = %verdict.details,
            "probe finished"
        );
        if verdict.is_valid() {
            return verdict;
        }
        last = Some(verdict);
    }
    last.unwrap_or_else(|| request.conclude(Method::None, VerdictStatus::Error, NO_SUPPORTED_METHOD, started))
}

/// A panicking probe becomes an `error` verdict for that method.
fn invoke(probe: &dyn Probe, request: &ProbeRequest<'_>) -> Verdict {
    let started = Instant::now();
    panic::catch_unwind(AssertUnwindSafe(|| probe.probe(request))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(method = %probe.method(), %reason, "probe panicked");
        request.conclude(
            probe.method(),
            VerdictStatus::Error,
            format!("probe failed: {reason}"),
            started,
        )
    })
}

#[cfg(test)]
mod tests;
