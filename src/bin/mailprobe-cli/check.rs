use std::time::Duration;

use anyhow::{Context, Result};
use mailprobe::{MethodOrder, ProbeRegistry, ProbeRequest, ProxyDescriptor, Settings, escalate};

use crate::args::CheckArgs;
use crate::output;

/// Retourne `true` si l'adresse est jugée valide.
pub fn run(settings: Settings, args: &CheckArgs) -> Result<bool> {
    output::ensure_format(&args.format, &["human", "json"])?;

    let proxy = args
        .proxy
        .as_deref()
        .map(str::parse::<ProxyDescriptor>)
        .transpose()
        .context("invalid --proxy")?;
    let order = args
        .method
        .as_deref()
        .map(MethodOrder::parse)
        .unwrap_or_else(|| settings.batch.order.clone());
    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(settings.batch.delay);

    let registry = ProbeRegistry::standard(settings.probe);
    let request = ProbeRequest::new(&args.email)
        .with_password(args.password.as_deref())
        .with_proxy(proxy.as_ref());
    let verdict = escalate(&registry, &request, &order, delay);

    output::write_verdicts(std::slice::from_ref(&verdict), &args.format, None)?;
    Ok(verdict.is_valid())
}
