use std::sync::Arc;
use std::time::Instant;

use reqwest::blocking::{Client, Response};
use reqwest::header::SERVER;
use reqwest::redirect::Policy;
use tracing::debug;

use super::dns::DnsLookup;
use super::options::ProbeOptions;
use super::{Method, Probe, ProbeRequest, ProxyRoute, Verdict, VerdictStatus, screen};

/// Server header fragments of common webmail products. Only used to make the
/// verdict details more informative.
const WEBMAIL_FINGERPRINTS: &[(&str, &str)] = &[
    ("microsoft-iis", "Outlook Web Access"),
    ("zimbra", "Zimbra"),
    ("roundcube", "Roundcube"),
    ("horde", "Horde"),
    ("sogo", "SOGo"),
    ("gws", "Google Workspace"),
    ("yandex", "Yandex Mail"),
];

/// Codes that show something is answering on a mail-related URL.
pub(crate) fn is_reachable_status(code: u16) -> bool {
    matches!(code, 200 | 301 | 302 | 403 | 405)
}

pub(crate) fn fingerprint(server: &str) -> Option<&'static str> {
    let server = server.to_ascii_lowercase();
    WEBMAIL_FINGERPRINTS
        .iter()
        .find(|(needle, _)| server.contains(needle))
        .map(|(_, product)| *product)
}

/// Looks for a webmail or mail web front-end on the domain. The weakest
/// signal of all probes: it shows the domain hosts mail, not that the
/// mailbox exists.
pub struct HttpProbe {
    options: Arc<ProbeOptions>,
    dns: Arc<dyn DnsLookup>,
}

impl HttpProbe {
    pub fn new(options: Arc<ProbeOptions>, dns: Arc<dyn DnsLookup>) -> Self {
        Self { options, dns }
    }

    fn client(&self, request: &ProbeRequest<'_>) -> Result<Client, String> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .user_agent(self.options.user_agent.as_str());
        if let Some(timeout) = self.options.io_timeout() {
            builder = builder.timeout(timeout);
        }
        builder = match request.proxy {
            Some(proxy) => builder.proxy(proxy.to_http_proxy().map_err(|err| err.to_string())?),
            // direct means direct, whatever HTTP_PROXY says
            None => builder.no_proxy(),
        };
        builder.build().map_err(|err| err.to_string())
    }

    fn urls(&self, domain: &str) -> Vec<String> {
        let mut urls = Vec::new();
        for prefix in &self.options.http_prefixes {
            for scheme in ["https", "http"] {
                urls.push(format!("{scheme}://{prefix}{domain}/"));
            }
        }
        urls
    }
}

fn describe(url: &str, response: &Response) -> String {
    let code = response.status().as_u16();
    let product = response
        .headers()
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .and_then(fingerprint);
    match product {
        Some(product) => format!("{url} answered {code} ({product})"),
        None => format!("{url} answered {code}"),
    }
}

impl Probe for HttpProbe {
    fn method(&self) -> Method {
        Method::Http
    }

    fn proxy_route(&self) -> ProxyRoute {
        ProxyRoute::HttpClient
    }

    fn probe(&self, request: &ProbeRequest<'_>) -> Verdict {
        let started = Instant::now();
        let parts = match screen(Method::Http, self.proxy_route(), request, started) {
            Ok(parts) => parts,
            Err(verdict) => return verdict,
        };
        let conclude = |status, details: String| request.conclude(Method::Http, status, details, started);

        let client = match self.client(request) {
            Ok(client) => client,
            Err(err) => return conclude(VerdictStatus::Error, format!("transport: {err}")),
        };

        let mut answered = false;
        let mut last = String::from("no URL answered");
        for url in self.urls(parts.domain) {
            match client.head(&url).send() {
                Ok(response) if is_reachable_status(response.status().as_u16()) => {
                    return conclude(VerdictStatus::Valid, describe(&url, &response));
                }
                Ok(response) => {
                    answered = true;
                    last = describe(&url, &response);
                }
                Err(err) => {
                    debug!(%url, error = %err, "http attempt failed");
                    last = format!("{url}: {err}");
                }
            }
        }

        // a direct DNS query would go around the proxy
        if request.proxy.is_some() {
            let details = if answered {
                format!("no acceptable answer through proxy ({last})")
            } else {
                format!("transport: nothing answered through proxy ({last})")
            };
            return conclude(VerdictStatus::Error, details);
        }
        match self.dns.host_exists(parts.domain) {
            Ok(true) => conclude(
                VerdictStatus::Invalid,
                format!("domain resolves but no mail web endpoint answered ({last})"),
            ),
            Ok(false) => conclude(VerdictStatus::Error, format!("domain does not resolve ({last})")),
            Err(err) => conclude(VerdictStatus::Error, format!("dns: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::probe::DnsError;
    use crate::probe::dns::stub::StubDns;
    use crate::proxy::ProxyDescriptor;

    /// Loopback HTTP proxy: refuses every CONNECT and answers plain requests
    /// with `status` and a Zimbra `Server` header.
    fn fake_proxy(status: u16) -> ProxyDescriptor {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(mut conn) = conn else { return };
                let mut reader = BufReader::new(conn.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header.trim().is_empty() => break,
                        Ok(_) => {}
                    }
                }
                let reply = if request_line.starts_with("CONNECT") {
                    "HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else {
                    format!(
                        "HTTP/1.1 {status} Scripted\r\nServer: zimbra\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    )
                };
                let _ = conn.write_all(reply.as_bytes());
            }
        });
        format!("http://{addr}").parse().unwrap()
    }

    fn http_probe(dns: StubDns) -> HttpProbe {
        let options = ProbeOptions {
            timeout: Duration::from_secs(3),
            http_prefixes: vec!["mail.".to_string()],
            ..ProbeOptions::default()
        };
        HttpProbe::new(Arc::new(options), Arc::new(dns))
    }

    fn no_dns() -> StubDns {
        StubDns::new(
            |name| panic!("unexpected MX lookup for {name}"),
            |name| panic!("unexpected host lookup for {name}"),
        )
    }

    #[test]
    fn reachable_answers_are_valid() {
        for code in [200, 301, 302, 403, 405] {
            let proxy = fake_proxy(code);
            let request = ProbeRequest::new("alice@example.test").with_proxy(Some(&proxy));
            let verdict = http_probe(no_dns()).probe(&request);
            assert_eq!(verdict.status, VerdictStatus::Valid, "{code}: {}", verdict.details);
            assert_eq!(verdict.method, Method::Http);
            assert_eq!(
                verdict.details,
                format!("http://mail.example.test/ answered {code} (Zimbra)")
            );
            assert_eq!(verdict.proxy, proxy.to_string());
        }
    }

    #[test]
    fn unacceptable_answer_through_proxy_skips_direct_dns() {
        let proxy = fake_proxy(404);
        let request = ProbeRequest::new("alice@example.test").with_proxy(Some(&proxy));
        let verdict = http_probe(no_dns()).probe(&request);
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(
            verdict.details.starts_with("no acceptable answer through proxy"),
            "{}",
            verdict.details
        );
    }

    #[test]
    fn silent_proxy_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let proxy: ProxyDescriptor = format!("http://{addr}").parse().unwrap();

        let request = ProbeRequest::new("alice@example.test").with_proxy(Some(&proxy));
        let verdict = http_probe(no_dns()).probe(&request);
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(
            verdict.details.starts_with("transport: nothing answered through proxy"),
            "{}",
            verdict.details
        );
    }

    // `.invalid` never resolves, so every direct request fails and the
    // stubbed host lookup decides.
    #[test]
    fn direct_fallback_follows_host_lookup() {
        let resolves = http_probe(StubDns::new(|_| unreachable!(), |_| Ok(true)))
            .probe(&ProbeRequest::new("alice@nowhere.invalid"));
        assert_eq!(resolves.status, VerdictStatus::Invalid, "{}", resolves.details);
        assert!(resolves.details.starts_with("domain resolves"), "{}", resolves.details);

        let unknown = http_probe(StubDns::new(|_| unreachable!(), |_| Ok(false)))
            .probe(&ProbeRequest::new("alice@nowhere.invalid"));
        assert_eq!(unknown.status, VerdictStatus::Error);
        assert!(unknown.details.starts_with("domain does not resolve"), "{}", unknown.details);

        let failing = http_probe(StubDns::new(
            |_| unreachable!(),
            |name| {
                Err(DnsError::Timeout {
                    name: name.to_string(),
                })
            },
        ))
        .probe(&ProbeRequest::new("alice@nowhere.invalid"));
        assert_eq!(failing.status, VerdictStatus::Error);
        assert!(failing.details.starts_with("dns:"), "{}", failing.details);
    }

    #[test]
    fn reachable_statuses() {
        for code in [200, 301, 302, 403, 405] {
            assert!(is_reachable_status(code), "{code}");
        }
        for code in [204, 404, 500, 503] {
            assert!(!is_reachable_status(code), "{code}");
        }
    }

    #[test]
    fn fingerprints_known_products() {
        assert_eq!(fingerprint("Microsoft-IIS/10.0"), Some("Outlook Web Access"));
        assert_eq!(fingerprint("nginx"), None);
    }

    #[test]
    fn url_candidates_follow_prefix_order() {
        let probe = HttpProbe::new(
            Arc::new(ProbeOptions::default()),
            Arc::new(StubDns::new(|_| unreachable!(), |_| Ok(true))),
        );
        let urls = probe.urls("example.com");
        assert_eq!(urls.first().map(String::as_str), Some("https://mail.example.com/"));
        assert_eq!(urls.get(1).map(String::as_str), Some("http://mail.example.com/"));
        assert_eq!(urls.last().map(String::as_str), Some("http://example.com/"));
        assert_eq!(urls.len(), 8);
    }
}
