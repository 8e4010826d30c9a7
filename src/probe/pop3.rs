use std::sync::Arc;
use std::time::Instant;

use native_tls::TlsConnector;

use super::imap::{LoginOutcome, mailbox_probe};
use super::options::{Endpoint, ProbeOptions, Security, mailbox_hosts};
use super::stream::LineStream;
use super::{Method, Probe, ProbeRequest, ProxyRoute, SessionError, Verdict, screen};

enum Status {
    Ok,
    Err(String),
}

fn status_of(line: &str) -> Result<Status, SessionError> {
    if line.starts_with("+OK") {
        Ok(Status::Ok)
    } else if let Some(text) = line.strip_prefix("-ERR") {
        Ok(Status::Err(text.trim().to_string()))
    } else {
        Err(SessionError::protocol(format!("unexpected reply: {line}")))
    }
}

/// Greeting, optional STLS, USER/PASS, QUIT.
pub(crate) fn pop3_login(
    stream: &mut LineStream,
    host: &str,
    security: Security,
    username: &str,
    password: &str,
    connector: &TlsConnector,
) -> Result<LoginOutcome, SessionError> {
    let greeting = stream.read_line()?;
    if let Status::Err(text) = status_of(&greeting)? {
        return Err(SessionError::protocol(format!("server refused session: {text}")));
    }

    if security == Security::StartTls && !stream.is_tls() {
        stream.write_line("STLS")?;
        if let Status::Err(text) = status_of(&stream.read_line()?)? {
            return Err(SessionError::protocol(format!("STLS refused: {text}")));
        }
        stream.upgrade_tls(host, connector)?;
    }

    stream.write_line(&format!("USER {username}"))?;
    if let Status::Err(text) = status_of(&stream.read_line()?)? {
        return Ok(LoginOutcome::Rejected(text));
    }
    stream.write_line(&format!("PASS {password}"))?;
    let outcome = match status_of(&stream.read_line()?)? {
        Status::Ok => LoginOutcome::Accepted,
        Status::Err(text) => LoginOutcome::Rejected(text),
    };
    if stream.write_line("QUIT").is_ok() {
        let _ = stream.read_line();
    }
    Ok(outcome)
}

/// Logs into the domain's POP3 server with the supplied credentials.
/// Requires a password.
pub struct Pop3Probe {
    options: Arc<ProbeOptions>,
}

impl Pop3Probe {
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
        pop3_login(
            &mut stream,
            host,
            endpoint.security,
            request.address.trim(),
            password,
            connector,
        )
    }
}

impl Probe for Pop3Probe {
    fn method(&self) -> Method {
        Method::Pop3
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Tunnel
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        let started = Instant::now();
        let parts = match screen(Method::Pop3, self.proxy_route(), request, started) {
            Ok(parts) => parts,
            Err(verdict) => return verdict,
        };
        mailbox_probe(
            Method::Pop3,
            request,
            started,
            &mailbox_hosts(&self.options.pop3_hosts, parts.domain),
            &self.options.pop3_endpoints,
            |host, endpoint, password, connector| self.attempt(host, endpoint, request, password, connector),
        )
    }
}
