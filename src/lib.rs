#![forbid(unsafe_code)]
//! mailprobe : sondage multi-protocole de délivrabilité e-mail
//!
//! An address goes through a chain of probes (SMTP, MX, IMAP, POP3, HTTP)
//! until one of them answers `valid`. A `valid` verdict means "not
//! definitively rejected", never "the inbox exists".
//!
//! ```no_run
//! use std::time::Duration;
//! use mailprobe::{MethodOrder, ProbeOptions, ProbeRegistry, ProbeRequest, escalate};
//!
//! let registry = ProbeRegistry::standard(ProbeOptions::default());
//! let verdict = escalate(
//!     &registry,
//!     &ProbeRequest::new("someone@example.com"),
//!     &MethodOrder::auto(),
//!     Duration::from_millis(100),
//! );
//! println!("{} via {}: {}", verdict.status, verdict.method, verdict.details);
//! ```

pub mod address;
pub mod batch;
pub mod config;
pub mod escalate;
pub mod probe;
pub mod proxy;
pub mod sink;

pub use address::{AddressError, extract_domain, is_disposable, split_address};
pub use batch::{BatchContext, BatchError, BatchItem, BatchRequest, BatchRunner};
pub use config::{ConfigError, Settings};
pub use escalate::{MethodOrder, escalate};
pub use probe::{Method, Probe, ProbeOptions, ProbeRegistry, ProbeRequest, Verdict, VerdictStatus};
pub use proxy::{ProxyDescriptor, ProxyError, ProxyScheme};
pub use sink::{BatchProgress, CsvResultLog, ResultSink};
