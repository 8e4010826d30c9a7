use std::path::Path;

use anyhow::{Context, Result, bail};
use mailprobe::{BatchProgress, ProxyDescriptor, Verdict, VerdictStatus};

pub fn ensure_format(format: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&format) {
        Ok(())
    } else {
        bail!("unknown --format '{format}', use: {}", allowed.join("|"))
    }
}

pub fn write_verdicts(verdicts: &[Verdict], format: &str, out: Option<&Path>) -> Result<()> {
    match format {
        "human" => {
            write_human(verdicts);
            Ok(())
        }
        "json" => {
            let s = serde_json::to_string_pretty(verdicts)?;
            match out {
                Some(path) => write_all_atomically(path, s.as_bytes()),
                None => {
                    println!("{s}");
                    Ok(())
                }
            }
        }
        "ndjson" => {
            let mut buf = Vec::new();
            for verdict in verdicts {
                serde_json::to_writer(&mut buf, verdict)?;
                buf.push(b'\n');
            }
            match out {
                Some(path) => write_all_atomically(path, &buf),
                None => {
                    print!("{}", String::from_utf8_lossy(&buf));
                    Ok(())
                }
            }
        }
        other => bail!("unknown --format '{other}', use: human|json|ndjson"),
    }
}

fn write_human(verdicts: &[Verdict]) {
    for verdict in verdicts {
        let tag = match verdict.status {
            VerdictStatus::Valid => "[VALID]     ",
            VerdictStatus::Invalid => "[INVALID]   ",
            VerdictStatus::Disposable => "[DISPOSABLE]",
            VerdictStatus::Error => "[ERROR]     ",
        };
        println!("{tag} {} ({}) :: {}", verdict.email, verdict.method, verdict.details);
        if !verdict.proxy.is_empty() {
            // jamais le mot de passe du proxy à l'écran
            let shown = verdict
                .proxy
                .parse::<ProxyDescriptor>()
                .map(|proxy| proxy.redacted())
                .unwrap_or_else(|_| verdict.proxy.clone());
            println!("             via {shown}");
        }
    }
}

pub fn write_progress(progress: &BatchProgress) {
    eprintln!(
        "total={} checked={} good={} bad={} remaining={}",
        progress.total, progress.checked, progress.good, progress.bad, progress.remaining
    );
}

fn write_all_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
