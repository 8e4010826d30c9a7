use std::sync::Arc;
use std::time::Instant;

use native_tls::TlsConnector;
use tracing::{debug, info};

use super::options::{Endpoint, ProbeOptions, Security, mailbox_hosts};
use super::stream::LineStream;
use super::{Method, Probe, ProbeRequest, ProxyRoute, SessionError, Verdict, VerdictStatus, screen};

/// Result of a mailbox login attempt (IMAP or POP3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoginOutcome {
    Accepted,
    Rejected(String),
}

/// Quoted IMAP string: backslash and double quote are escaped.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Read until the tagged completion line for `tag`; returns its status word
/// and trailing text.
fn read_tagged(stream: &mut LineStream, tag: &str) -> Result<(String, String), SessionError> {
    loop {
        let line = stream.read_line()?;
        if let Some(rest) = line.strip_prefix(tag).and_then(|rest| rest.strip_prefix(' ')) {
            let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
            return Ok((status.to_ascii_uppercase(), text.to_string()));
        }
    }
}

/// Greeting, optional STARTTLS, LOGIN, LOGOUT.
pub(crate) fn imap_login(
    stream: &mut LineStream,
    host: &str,
    security: Security,
    username: &str,
    password: &str,
    connector: &TlsConnector,
) -> Result<LoginOutcome, SessionError> {
    let greeting = stream.read_line()?;
    let greeting_upper = greeting.to_ascii_uppercase();
    if greeting_upper.starts_with("* PREAUTH") {
        return Ok(LoginOutcome::Accepted);
    }
    if !greeting_upper.starts_with("* OK") {
        return Err(SessionError::protocol(format!("unexpected greeting: {greeting}")));
    }

    if security == Security::StartTls && !stream.is_tls() {
        stream.write_line("a1 STARTTLS")?;
        let (status, text) = read_tagged(stream, "a1")?;
        if status != "OK" {
            return Err(SessionError::protocol(format!("STARTTLS refused: {status} {text}")));
        }
        stream.upgrade_tls(host, connector)?;
    }

    stream.write_line(&format!("a2 LOGIN {} {}", quote(username), quote(password)))?;
    let (status, text) = read_tagged(stream, "a2")?;
    let outcome = match status.as_str() {
        "OK" => LoginOutcome::Accepted,
        "NO" => LoginOutcome::Rejected(text),
        // BAD is a command-level complaint (e.g. LOGINDISABLED), not an answer about the credentials
        _ => return Err(SessionError::protocol(format!("LOGIN answered {status} {text}"))),
    };
    if stream.write_line("a3 LOGOUT").is_ok() {
        let _ = read_tagged(stream, "a3");
    }
    Ok(outcome)
}

/// Logs into the domain's IMAP server with the supplied credentials.
/// Requires a password.
pub struct ImapProbe {
    options: Arc<ProbeOptions>,
}

impl ImapProbe {
    pub fn new(options: Arc<ProbeOptions>) -> Self {
        Self { options }
    }

    fn attempt(
        &self,
        host: &str,
        endpoint: Endpoint,
        request: &ProbeRequest<'_>,
        password: &str,
        connector: &TlsConnector,
    ) -> Result<LoginOutcome, SessionError> {
        let mut stream = LineStream::open(host, endpoint, request.proxy, self.options.io_timeout(), connector)?;
        imap_login(
            &mut stream,
            host,
            endpoint.security,
            request.address.trim(),
            password,
            connector,
        )
    }
}

impl Probe for ImapProbe {
    fn method(&self) -> Method {
        Method::Imap
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Tunnel
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        let started = Instant::now();
        let parts = match screen(Method::Imap, self.proxy_route(), request, started) {
            Ok(parts) => parts,
            Err(verdict) => return verdict,
        };
        mailbox_probe(
            Method::Imap,
            request,
            started,
            &mailbox_hosts(&self.options.imap_hosts, parts.domain),
            &self.options.imap_endpoints,
            |host, endpoint, password, connector| self.attempt(host, endpoint, request, password, connector),
        )
    }
}

/// Host/port loop shared by the IMAP and POP3 probes.
///
/// Running out of hosts without any login answer is reported as `invalid`
/// ("could not connect"), not `error`: an address whose domain exposes no
/// mailbox server is treated as unusable.
pub(crate) fn mailbox_probe<F>(
    method: Method,
    request: &ProbeRequest<'_>,
    started: Instant,
    hosts: &[String],
    endpoints: &[Endpoint],
    mut attempt: F,
) -> Verdict
where
    F: FnMut(&str, Endpoint, &str, &TlsConnector) -> Result<LoginOutcome, SessionError>,
{
    let conclude = |status, details: String| request.conclude(method, status, details, started);
    let Some(password) = request.password.filter(|password| !password.is_empty()) else {
        return conclude(VerdictStatus::Error, format!("{method} probe requires a password"));
    };
    let connector = match super::tls_connector() {
        Ok(connector) => connector,
        Err(err) => return conclude(VerdictStatus::Error, err.to_string()),
    };

    for host in hosts {
        for endpoint in endpoints {
            let target = format!("{host}:{}", endpoint.port);
            match attempt(host, *endpoint, password, &connector) {
                Ok(LoginOutcome::Accepted) => {
                    info!(email = %request.address, %target, %method, "login accepted");
                    return conclude(VerdictStatus::Valid, format!("login accepted by {target}"));
                }
                Ok(LoginOutcome::Rejected(text)) => {
                    info!(email = %request.address, %target, %method, "login rejected");
                    return conclude(VerdictStatus::Invalid, format!("login rejected by {target}: {text}"));
                }
                Err(err) if err.is_transport() => {
                    return conclude(VerdictStatus::Error, format!("transport: {err}"));
                }
                Err(err) => debug!(%target, %method, error = %err, "login attempt failed"),
            }
        }
    }
    conclude(VerdictStatus::Invalid, "could not connect".to_string())
}
