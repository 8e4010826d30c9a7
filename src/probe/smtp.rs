use std::sync::Arc;
use std::time::Instant;

use native_tls::TlsConnector;
use tracing::{debug, info};

use super::dns::{self, DnsLookup};
use super::options::{Endpoint, ProbeOptions, Security};
use super::stream::LineStream;
use super::{Method, Probe, ProbeRequest, ProxyRoute, SessionError, Verdict, VerdictStatus, screen};

#[derive(Debug, Clone)]
pub(crate) struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(cap))
        })
    }

    fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// What the RCPT TO reply says about the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RcptOutcome {
    Accepted(u16),
    Rejected { code: u16, text: String },
    /// Anything else; the next endpoint gets a chance.
    Inconclusive(String),
}

/// 250/251 accept the mailbox; 550, 551 and 553 say it does not exist.
/// Other 5xx codes (552 quota, 554 policy) tell nothing about the mailbox.
pub(crate) fn classify_rcpt(reply: &SmtpReply) -> RcptOutcome {
    match reply.code {
        250 | 251 => RcptOutcome::Accepted(reply.code),
        550 | 551 | 553 => RcptOutcome::Rejected {
            code: reply.code,
            text: reply.text(),
        },
        code => RcptOutcome::Inconclusive(format!("RCPT TO answered {code} {}", reply.text())),
    }
}

pub(crate) struct SmtpSession {
    stream: LineStream,
}

impl SmtpSession {
    pub(crate) fn new(stream: LineStream) -> Self {
        Self { stream }
    }

    pub(crate) fn read_reply(&mut self) -> Result<SmtpReply, SessionError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.stream.read_line()?;
            let parsed = line
                .get(..3)
                .and_then(|digits| digits.parse::<u16>().ok())
                .ok_or_else(|| SessionError::protocol(format!("invalid reply: {line}")))?;
            match code {
                Some(existing) if existing != parsed => {
                    return Err(SessionError::protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed}"
                    )));
                }
                _ => code = Some(parsed),
            }
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if line.as_bytes().get(3) != Some(&b'-') {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or_default(),
            lines,
        })
    }

    pub(crate) fn command(&mut self, command: &str) -> Result<SmtpReply, SessionError> {
        self.stream.write_line(command)?;
        self.read_reply()
    }

    pub(crate) fn quit(&mut self) {
        // best effort, the verdict is already known
        if self.stream.write_line("QUIT").is_ok() {
            let _ = self.read_reply();
        }
    }

    /// Full dialogue up to RCPT TO. STARTTLS is used when `security`
    /// demands it, and opportunistically on plain endpoints.
    pub(crate) fn check_recipient(
        &mut self,
        host: &str,
        security: Security,
        options: &ProbeOptions,
        recipient: &str,
        connector: &TlsConnector,
    ) -> Result<RcptOutcome, SessionError> {
        let banner = self.read_reply()?;
        if !banner.is_positive_completion() {
            return Ok(RcptOutcome::Inconclusive(format!("banner {}", banner.code)));
        }

        let ehlo_command = format!("EHLO {}", options.helo);
        let mut ehlo = self.command(&ehlo_command)?;
        if !ehlo.is_positive_completion() {
            ehlo = self.command(&format!("HELO {}", options.helo))?;
            if !ehlo.is_positive_completion() {
                return Ok(RcptOutcome::Inconclusive(format!("EHLO answered {}", ehlo.code)));
            }
        }

        if !self.stream.is_tls() {
            let advertised = ehlo.has_capability("STARTTLS");
            if security == Security::StartTls && !advertised {
                return Ok(RcptOutcome::Inconclusive("STARTTLS not offered".to_string()));
            }
            if advertised {
                let reply = self.command("STARTTLS")?;
                if reply.is_positive_completion() {
                    self.stream.upgrade_tls(host, connector)?;
                    let again = self.command(&ehlo_command)?;
                    if !again.is_positive_completion() {
                        return Ok(RcptOutcome::Inconclusive(format!(
                            "EHLO after STARTTLS answered {}",
                            again.code
                        )));
                    }
                } else if security == Security::StartTls {
                    return Ok(RcptOutcome::Inconclusive(format!(
                        "STARTTLS rejected with {}",
                        reply.code
                    )));
                }
            }
        }

        let mail = self.command(&format!("MAIL FROM:<{}>", options.mail_from))?;
        if !mail.is_positive_completion() {
            return Ok(RcptOutcome::Inconclusive(format!("MAIL FROM answered {}", mail.code)));
        }
        let rcpt = self.command(&format!("RCPT TO:<{recipient}>"))?;
        Ok(classify_rcpt(&rcpt))
    }
}

/// Asks the domain's mail exchangers whether they accept the recipient.
/// Tries each MX host on each configured port; the first 250 or 55x answer
/// decides.
pub struct SmtpProbe {
    options: Arc<ProbeOptions>,
    dns: Arc<dyn DnsLookup>,
}

impl SmtpProbe {
    pub fn new(options: Arc<ProbeOptions>, dns: Arc<dyn DnsLookup>) -> Self {
        Self { options, dns }
    }

    fn attempt(
        &self,
        host: &str,
        endpoint: Endpoint,
        request: &ProbeRequest<'_>,
        connector: &TlsConnector,
    ) -> Result<RcptOutcome, SessionError> {
        let stream = LineStream::open(host, endpoint, request.proxy, self.options.io_timeout(), connector)?;
        let mut session = SmtpSession::new(stream);
        let outcome = session.check_recipient(
            host,
            endpoint.security,
            &self.options,
            request.address.trim(),
            connector,
        );
        session.quit();
        outcome
    }
}

impl Probe for SmtpProbe {
    fn method(&self) -> Method {
        Method::Smtp
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::Tunnel
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        let started = Instant::now();
        let parts = match screen(Method::Smtp, self.proxy_route(), request, started) {
            Ok(parts) => parts,
            Err(verdict) => return verdict,
        };
        let conclude = |status, details: String| request.conclude(Method::Smtp, status, details, started);

        let hosts = match dns::smtp_hosts(self.dns.as_ref(), parts.domain, self.options.max_mx) {
            Ok(hosts) => hosts,
            Err(err) => return conclude(VerdictStatus::Error, format!("dns: {err}")),
        };
        let connector = match super::tls_connector() {
            Ok(connector) => connector,
            Err(err) => return conclude(VerdictStatus::Error, err.to_string()),
        };

        let mut last = String::from("no endpoint answered");
        for host in &hosts {
            for endpoint in &self.options.smtp_endpoints {
                let target = format!("{host}:{}", endpoint.port);
                match self.attempt(host, *endpoint, request, &connector) {
                    Ok(RcptOutcome::Accepted(code)) => {
                        info!(email = %request.address, %target, code, "recipient accepted");
                        return conclude(VerdictStatus::Valid, format!("RCPT TO accepted with {code} by {target}"));
                    }
                    Ok(RcptOutcome::Rejected { code, text }) => {
                        info!(email = %request.address, %target, code, "recipient rejected");
                        return conclude(
                            VerdictStatus::Invalid,
                            format!("RCPT TO rejected with {code} by {target}: {text}"),
                        );
                    }
                    Ok(RcptOutcome::Inconclusive(reason)) => {
                        debug!(%target, %reason, "smtp attempt inconclusive");
                        last = format!("{target}: {reason}");
                    }
                    Err(err) if err.is_transport() => {
                        return conclude(VerdictStatus::Error, format!("transport: {err}"));
                    }
                    Err(err) => {
                        debug!(%target, error = %err, "smtp attempt failed");
                        last = format!("{target}: {err}");
                    }
                }
            }
        }
        conclude(VerdictStatus::Error, format!("no_response ({last})"))
    }
}
