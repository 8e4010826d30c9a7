use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use mailprobe::{
    BatchContext, BatchError, BatchRequest, BatchRunner, CsvResultLog, MethodOrder, ProbeRegistry,
    Settings, Verdict,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::args::BatchArgs;
use crate::input;
use crate::output;

const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// Retourne `true` si au moins une adresse n'est pas valide.
pub fn run(settings: Settings, args: &BatchArgs) -> Result<bool> {
    output::ensure_format(&args.format, &["human", "json", "ndjson"])?;

    let proxies = match &args.proxy_file {
        Some(path) => input::read_proxies(path)?,
        None => Vec::new(),
    };
    let order = args
        .method
        .as_deref()
        .map(MethodOrder::parse)
        .unwrap_or_else(|| settings.batch.order.clone());
    let concurrency = args.concurrency.unwrap_or(settings.batch.concurrency);
    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(settings.batch.delay);
    let results_dir = args
        .results_dir
        .clone()
        .unwrap_or_else(|| settings.batch.results_dir.clone());

    let runner = Arc::new(BatchRunner::new(Arc::new(ProbeRegistry::standard(settings.probe))));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;

    runtime.block_on(async {
        let stopper = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("stop requested: running items finish, no new batch starts");
                stopper.request_stop();
            }
        });

        let mut report = Report::new(&args.format, args.out.as_deref());
        for path in &args.input {
            let mut items = input::read_items(path)?;
            input::assign_proxies(&mut items, &proxies);
            info!(input = %path.display(), items = items.len(), "batch starting");

            let log = CsvResultLog::open(&results_dir)
                .with_context(|| format!("open results in {}", results_dir.display()))?;
            let context = Arc::new(BatchContext::new(Box::new(log)));
            let progress = (!args.no_progress).then(|| spawn_progress(Arc::clone(&context), items.len()));

            let request = BatchRequest {
                items,
                order: order.clone(),
                concurrency,
                delay,
            };
            let outcome = runner.run(request, Arc::clone(&context)).await;
            if let Some((bar, ticker)) = progress {
                ticker.abort();
                bar.finish_and_clear();
            }

            match outcome {
                Ok(verdicts) => {
                    report.add(verdicts)?;
                    output::write_progress(&context.progress());
                }
                Err(BatchError::Stopped) => {
                    warn!(input = %path.display(), "skipped after stop request");
                    break;
                }
                Err(err) => return Err(anyhow::Error::from(err)),
            }
        }
        report.finish()
    })
}

/// Verdicts of every `--input` file. Without `--out` each batch is printed
/// as it completes; with it, one file covering all inputs is written at the
/// end.
struct Report<'a> {
    format: &'a str,
    out: Option<&'a Path>,
    verdicts: Vec<Verdict>,
    any_bad: bool,
}

impl<'a> Report<'a> {
    fn new(format: &'a str, out: Option<&'a Path>) -> Self {
        Self {
            format,
            out,
            verdicts: Vec::new(),
            any_bad: false,
        }
    }

    fn add(&mut self, verdicts: Vec<Verdict>) -> Result<()> {
        self.any_bad |= verdicts.iter().any(|verdict| !verdict.is_valid());
        match self.out {
            Some(_) => self.verdicts.extend(verdicts),
            None => output::write_verdicts(&verdicts, self.format, None)?,
        }
        Ok(())
    }

    /// Retourne `true` si au moins une adresse n'est pas valide.
    fn finish(self) -> Result<bool> {
        if let Some(path) = self.out {
            output::write_verdicts(&self.verdicts, self.format, Some(path))?;
        }
        Ok(self.any_bad)
    }
}

fn spawn_progress(context: Arc<BatchContext>, total: usize) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);

    let ticking = bar.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_TICK);
        loop {
            interval.tick().await;
            let progress = context.progress();
            ticking.set_position(progress.checked as u64);
            ticking.set_message(format!("good {} bad {}", progress.good, progress.bad));
        }
    });
    (bar, ticker)
}

#[cfg(test)]
mod tests {
    use mailprobe::{Method, VerdictStatus};

    use super::*;

    fn verdict(email: &str, status: VerdictStatus) -> Verdict {
        Verdict::new(email, status, Method::Smtp, "scripted")
    }

    #[test]
    fn out_file_covers_every_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.ndjson");
        let mut report = Report::new("ndjson", Some(path.as_path()));
        report.add(vec![verdict("a@example.com", VerdictStatus::Valid)]).unwrap();
        report
            .add(vec![
                verdict("b@example.com", VerdictStatus::Valid),
                verdict("c@example.com", VerdictStatus::Invalid),
            ])
            .unwrap();
        assert!(report.finish().unwrap());

        let written = std::fs::read_to_string(&path).unwrap();
        let emails: Vec<String> = written
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["email"].to_string())
            .collect();
        assert_eq!(emails, [r#""a@example.com""#, r#""b@example.com""#, r#""c@example.com""#]);
    }

    #[test]
    fn all_valid_inputs_do_not_flag_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = Report::new("json", Some(path.as_path()));
        report.add(vec![verdict("a@example.com", VerdictStatus::Valid)]).unwrap();
        assert!(!report.finish().unwrap());
        let written: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 1);
    }
}
