use std::time::Duration;

use anyhow::Result;
use mailprobe::proxy::{ProxyCheckOptions, check_proxies};

use crate::args::ProxyArgs;
use crate::input;
use crate::output;

/// Retourne `true` si au moins un proxy est mort.
pub fn run(args: &ProxyArgs) -> Result<bool> {
    output::ensure_format(&args.format, &["human", "json"])?;

    let proxies = input::read_proxies(&args.input)?;
    let mut options = ProxyCheckOptions {
        timeout: Duration::from_millis(args.timeout_ms),
        ..ProxyCheckOptions::default()
    };
    if let Some(url) = &args.test_url {
        options.test_url = url.clone();
    }

    let report = check_proxies(&proxies, &options);
    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for proxy in &report.live {
            println!("[LIVE] {}", proxy.redacted());
        }
        for dead in &report.dead {
            println!("[DEAD] {} :: {}", dead.proxy.redacted(), dead.reason);
        }
        eprintln!(
            "total={} live={} dead={}",
            report.total,
            report.live.len(),
            report.dead.len()
        );
    }
    Ok(!report.dead.is_empty())
}
