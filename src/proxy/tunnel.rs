use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::debug;

use super::{DialError, ProxyDescriptor, ProxyError, ProxyScheme};

/// Any blocking byte stream a protocol dialogue can run over.
pub trait Duplex: Read + Write + Send {}

impl<T: Read + Write + Send> Duplex for T {}

pub type BoxedStream = Box<dyn Duplex>;

const MAX_CONNECT_HEAD: usize = 8 * 1024;
const HANDSHAKE_RETRIES: usize = 3;

/// Open a TCP stream to `host:port`, tunnelled through `proxy` when given.
/// A failure of the proxy itself surfaces as [`DialError::Proxy`]; the caller
/// must never retry unproxied.
pub fn dial(
    host: &str,
    port: u16,
    proxy: Option<&ProxyDescriptor>,
    timeout: Option<Duration>,
) -> Result<BoxedStream, DialError> {
    match proxy {
        None => {
            let stream = dial_direct(host, port, timeout)?;
            Ok(Box::new(stream))
        }
        Some(proxy) => dial_via(proxy, host, port, timeout),
    }
}

fn dial_direct(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, DialError> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| DialError::Target {
            target: target.clone(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(DialError::Unresolved { target });
    }
    debug!(%target, "dialing direct");
    open_tcp(&addrs, timeout).map_err(|source| DialError::Target { target, source })
}

fn dial_via(
    proxy: &ProxyDescriptor,
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<BoxedStream, DialError> {
    let label = proxy.redacted();
    let addrs: Vec<SocketAddr> = (proxy.host(), proxy.port())
        .to_socket_addrs()
        .map_err(|source| ProxyError::connect(label.clone(), source))?
        .collect();
    let tcp = open_tcp(&addrs, timeout).map_err(|source| ProxyError::connect(label.clone(), source))?;
    debug!(proxy = %label, target = %format!("{host}:{port}"), "dialing through proxy");

    match proxy.scheme() {
        ProxyScheme::Socks5 => {
            let mut stream = tcp;
            socks5_connect(&mut stream, proxy, host, port)?;
            Ok(Box::new(stream))
        }
        ProxyScheme::Http => {
            let mut stream = tcp;
            http_connect(&mut stream, proxy, host, port)?;
            Ok(Box::new(stream))
        }
        ProxyScheme::Https => {
            let connector = TlsConnector::new()
                .map_err(|err| ProxyError::Tls { source: io::Error::other(err) })?;
            let mut stream = tls_handshake(&connector, proxy.host(), tcp)
                .map_err(|source| ProxyError::Tls { source })?;
            http_connect(&mut stream, proxy, host, port)?;
            Ok(Box::new(stream))
        }
    }
}

fn open_tcp(addrs: &[SocketAddr], timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no socket address available",
        )
    }))
}

/// Blocking TLS handshake. `WouldBlock` only shows up here when a socket
/// timeout fired mid-handshake, so the retries are bounded.
pub(crate) fn tls_handshake<S>(
    connector: &TlsConnector,
    domain: &str,
    stream: S,
) -> io::Result<TlsStream<S>>
where
    S: Read + Write,
{
    let mut pending = match connector.connect(domain, stream) {
        Ok(tls) => return Ok(tls),
        Err(HandshakeError::Failure(err)) => return Err(io::Error::other(err)),
        Err(HandshakeError::WouldBlock(mid)) => mid,
    };
    for _ in 0..HANDSHAKE_RETRIES {
        match pending.handshake() {
            Ok(tls) => return Ok(tls),
            Err(HandshakeError::Failure(err)) => return Err(io::Error::other(err)),
            Err(HandshakeError::WouldBlock(next)) => pending = next,
        }
    }
    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        "TLS handshake timed out",
    ))
}

fn socks5_connect<S: Read + Write>(
    stream: &mut S,
    proxy: &ProxyDescriptor,
    host: &str,
    port: u16,
) -> Result<(), DialError> {
    let greeting: &[u8] = if proxy.username().is_some() {
        &[0x05, 0x02, 0x00, 0x02]
    } else {
        &[0x05, 0x01, 0x00]
    };
    stream.write_all(greeting).map_err(ProxyError::io)?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).map_err(ProxyError::io)?;
    if choice[0] != 0x05 {
        return Err(ProxyError::Handshake("peer is not a SOCKS5 proxy".into()).into());
    }
    match choice[1] {
        0x00 => {}
        0x02 => socks5_authenticate(stream, proxy)?,
        0xFF => return Err(ProxyError::AuthRejected.into()),
        other => {
            return Err(
                ProxyError::Handshake(format!("unsupported auth method 0x{other:02x}")).into(),
            );
        }
    }

    let mut request = vec![0x05, 0x01, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let name = host.as_bytes();
            let len = u8::try_from(name.len())
                .map_err(|_| ProxyError::Handshake("target host name too long".into()))?;
            request.push(0x03);
            request.push(len);
            request.extend_from_slice(name);
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).map_err(ProxyError::io)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).map_err(ProxyError::io)?;
    if head[0] != 0x05 {
        return Err(ProxyError::Handshake("malformed SOCKS5 reply".into()).into());
    }
    if head[1] != 0x00 {
        return Err(DialError::Refused {
            target: format!("{host}:{port}"),
            reason: socks5_reply_reason(head[1]).to_string(),
        });
    }
    // adresse liée renvoyée par le proxy, ignorée
    let bound_len = match head[3] {
        0x01 => 4 + 2,
        0x04 => 16 + 2,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).map_err(ProxyError::io)?;
            usize::from(len[0]) + 2
        }
        other => {
            return Err(
                ProxyError::Handshake(format!("unknown address type 0x{other:02x}")).into(),
            );
        }
    };
    let mut bound = vec![0u8; bound_len];
    stream.read_exact(&mut bound).map_err(ProxyError::io)?;
    Ok(())
}

fn socks5_authenticate<S: Read + Write>(
    stream: &mut S,
    proxy: &ProxyDescriptor,
) -> Result<(), ProxyError> {
    let user = proxy.username().unwrap_or("").as_bytes();
    let pass = proxy.password().unwrap_or("").as_bytes();
    let (Ok(user_len), Ok(pass_len)) = (u8::try_from(user.len()), u8::try_from(pass.len())) else {
        return Err(ProxyError::Handshake("credentials longer than 255 bytes".into()));
    };
    let mut packet = Vec::with_capacity(3 + user.len() + pass.len());
    packet.push(0x01);
    packet.push(user_len);
    packet.extend_from_slice(user);
    packet.push(pass_len);
    packet.extend_from_slice(pass);
    stream.write_all(&packet).map_err(ProxyError::io)?;
    let mut status = [0u8; 2];
    stream.read_exact(&mut status).map_err(ProxyError::io)?;
    if status[1] != 0x00 {
        return Err(ProxyError::AuthRejected);
    }
    Ok(())
}

fn socks5_reply_reason(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS5 failure",
    }
}

fn http_connect<S: Read + Write>(
    stream: &mut S,
    proxy: &ProxyDescriptor,
    host: &str,
    port: u16,
) -> Result<(), DialError> {
    let authority = format!("{host}:{port}");
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(user) = proxy.username() {
        let token = general_purpose::STANDARD.encode(format!(
            "{user}:{}",
            proxy.password().unwrap_or("")
        ));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(ProxyError::io)?;

    let head = read_connect_head(stream)?;
    let status_line = head.lines().next().unwrap_or_default();
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ProxyError::Handshake(format!("malformed CONNECT reply: {status_line}")))?;
    match code {
        200..=299 => Ok(()),
        407 => Err(ProxyError::AuthRejected.into()),
        other => Err(DialError::Refused {
            target: authority,
            reason: format!("CONNECT answered {other}"),
        }),
    }
}

// byte par byte: rien de la session tunnelée ne doit être consommé
fn read_connect_head<S: Read>(stream: &mut S) -> Result<String, ProxyError> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let read = stream.read(&mut byte).map_err(ProxyError::io)?;
        if read == 0 {
            return Err(ProxyError::Handshake(
                "proxy closed the connection during CONNECT".into(),
            ));
        }
        head.push(byte[0]);
        if head.len() > MAX_CONNECT_HEAD {
            return Err(ProxyError::Handshake("CONNECT reply too large".into()));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
