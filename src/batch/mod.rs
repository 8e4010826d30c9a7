//! Bounded-concurrency batch runner.
//!
//! Every item runs its escalation chain on tokio's blocking pool, at most
//! `concurrency` at a time. Results are written back by input index, so the
//! returned verdicts follow input order whatever the completion order.

mod error;

pub use error::BatchError;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::escalate::{MethodOrder, escalate};
use crate::probe::{Method, ProbeRegistry, ProbeRequest, Verdict};
use crate::proxy::ProxyDescriptor;
use crate::sink::{BatchProgress, ResultLog, ResultSink};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);
pub const MISSING_EMAIL: &str = "email missing in item";

/// One address to check. Deserializes from a bare string or from an object
/// `{email, password?, proxy?}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ItemInput")]
pub struct BatchItem {
    pub email: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<ProxyDescriptor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemInput {
    Address(String),
    Full {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        proxy: Option<ProxyDescriptor>,
    },
}

impl From<ItemInput> for BatchItem {
    fn from(input: ItemInput) -> Self {
        match input {
            ItemInput::Address(email) => Self::new(email),
            ItemInput::Full {
                email,
                password,
                proxy,
            } => Self {
                email: email.filter(|email| !email.trim().is_empty()),
                password: password.filter(|password| !password.is_empty()),
                proxy,
            },
        }
    }
}

impl BatchItem {
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            email: (!email.trim().is_empty()).then_some(email),
            ..Self::default()
        }
    }

    /// `email` or `email:password`. The password keeps any further colons.
    pub fn parse_line(line: &str) -> Self {
        match line.trim().split_once(':') {
            Some((email, password)) => Self::new(email).with_password(Some(password.to_string())),
            None => Self::new(line.trim()),
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|password| !password.is_empty());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyDescriptor>) -> Self {
        self.proxy = proxy;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub items: Vec<BatchItem>,
    pub order: MethodOrder,
    pub concurrency: usize,
    pub delay: Duration,
}

impl BatchRequest {
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            items,
            order: MethodOrder::auto(),
            concurrency: DEFAULT_CONCURRENCY,
            delay: DEFAULT_DELAY,
        }
    }
}

/// State owned by one batch invocation: the result sink and its counters.
#[derive(Debug)]
pub struct BatchContext {
    sink: ResultSink,
}

impl BatchContext {
    pub fn new(log: Box<dyn ResultLog>) -> Self {
        Self {
            sink: ResultSink::new(log),
        }
    }

    /// Counters only, nothing persisted.
    pub fn in_memory() -> Self {
        Self {
            sink: ResultSink::discard(),
        }
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    pub fn progress(&self) -> BatchProgress {
        self.sink.progress()
    }
}

pub struct BatchRunner {
    registry: Arc<ProbeRegistry>,
    stopped: AtomicBool,
}

impl BatchRunner {
    pub fn new(registry: Arc<ProbeRegistry>) -> Self {
        Self {
            registry,
            stopped: AtomicBool::new(false),
        }
    }

    /// Refuse new batches. A batch already running finishes normally.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub async fn run(&self, request: BatchRequest, context: Arc<BatchContext>) -> Result<Vec<Verdict>, BatchError> {
        if self.is_stopped() {
            return Err(BatchError::Stopped);
        }
        let BatchRequest {
            items,
            order,
            concurrency,
            delay,
        } = request;
        let total = items.len();
        let concurrency = concurrency.max(1);
        context.sink().begin(total);
        info!(total, concurrency, order = ?order.names(), "batch started");

        let emails: Vec<String> = items
            .iter()
            .map(|item| item.email.clone().unwrap_or_default())
            .collect();
        let limiter = Arc::new(Semaphore::new(concurrency));
        let order = Arc::new(order);
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let permit = Arc::clone(&limiter)
                .acquire_owned()
                .await
                .map_err(|_| BatchError::Scheduling { index })?;
            let registry = Arc::clone(&self.registry);
            let order = Arc::clone(&order);
            let context = Arc::clone(&context);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let verdict = check_item(&registry, &item, &order, delay);
                context.sink().record(&verdict);
                (index, verdict)
            });
        }

        let mut slots: Vec<Option<Verdict>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, verdict)) => slots[index] = Some(verdict),
                Err(err) => warn!(error = %err, "batch task did not complete"),
            }
        }

        let verdicts: Vec<Verdict> = slots
            .into_iter()
            .zip(emails)
            .map(|(slot, email)| {
                slot.unwrap_or_else(|| {
                    let verdict = Verdict::error(email, Method::None, "batch task aborted");
                    context.sink().record(&verdict);
                    verdict
                })
            })
            .collect();
        let progress = context.progress();
        info!(
            checked = progress.checked,
            good = progress.good,
            bad = progress.bad,
            "batch finished"
        );
        Ok(verdicts)
    }
}

/// Escalation for one item. Never panics: a missing address or a failure
/// outside the probes becomes an `error` verdict.
fn check_item(registry: &ProbeRegistry, item: &BatchItem, order: &MethodOrder, delay: Duration) -> Verdict {
    let Some(email) = item.email.as_deref() else {
        return Verdict::error("", Method::None, MISSING_EMAIL).with_proxy(item.proxy.as_ref());
    };
    let request = ProbeRequest::new(email)
        .with_password(item.password.as_deref())
        .with_proxy(item.proxy.as_ref());
    panic::catch_unwind(AssertUnwindSafe(|| escalate(registry, &request, order, delay))).unwrap_or_else(|_| {
        warn!(%email, "escalation panicked");
        Verdict::error(email.trim(), Method::None, "escalation failed").with_proxy(item.proxy.as_ref())
    })
}
