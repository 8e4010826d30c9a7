use std::io::{self, Read, Write};
use std::time::Duration;

use native_tls::TlsConnector;

use super::SessionError;
use super::options::{Endpoint, Security};
use crate::proxy::{self, BoxedStream, ProxyDescriptor};

const MAX_LINE: usize = 16 * 1024;

/// Line-oriented client stream shared by the SMTP, IMAP and POP3 dialogues.
/// Starts plain (or TLS for implicit-TLS endpoints) and can be upgraded in
/// place after STARTTLS/STLS.
pub(crate) struct LineStream {
    inner: Option<BoxedStream>,
    buffer: Vec<u8>,
    tls: bool,
}

impl LineStream {
    pub(crate) fn new(stream: BoxedStream) -> Self {
        Self {
            inner: Some(stream),
            buffer: Vec::new(),
            tls: false,
        }
    }

    /// Dial `host:endpoint.port` (through `proxy` if any) and perform the
    /// TLS handshake right away for implicit-TLS endpoints.
    pub(crate) fn open(
        host: &str,
        endpoint: Endpoint,
        proxy: Option<&ProxyDescriptor>,
        timeout: Option<Duration>,
        connector: &TlsConnector,
    ) -> Result<Self, SessionError> {
        let stream = proxy::dial(host, endpoint.port, proxy, timeout)?;
        let mut line_stream = Self::new(stream);
        if endpoint.security == Security::Tls {
            line_stream.upgrade_tls(host, connector)?;
        }
        Ok(line_stream)
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.tls
    }

    pub(crate) fn upgrade_tls(&mut self, domain: &str, connector: &TlsConnector) -> Result<(), SessionError> {
        if self.tls {
            return Ok(());
        }
        if !self.buffer.is_empty() {
            // anything pipelined before the handshake would bypass TLS
            return Err(SessionError::protocol("unexpected data before TLS handshake"));
        }
        let plain = self
            .inner
            .take()
            .ok_or_else(|| SessionError::protocol("stream closed"))?;
        let tls = proxy::tls_handshake(connector, domain, plain).map_err(|source| SessionError::Tls { source })?;
        self.inner = Some(Box::new(tls));
        self.tls = true;
        Ok(())
    }

    /// Sends `line` followed by CRLF. A line carrying its own CR or LF is
    /// refused before anything reaches the socket.
    pub(crate) fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        if line.contains(['\r', '\n']) {
            return Err(SessionError::protocol("refusing to send a line containing CR or LF"));
        }
        let stream = self
            .inner
            .as_mut()
            .ok_or_else(|| SessionError::protocol("stream closed"))?;
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        stream.write_all(&data).map_err(SessionError::io)?;
        stream.flush().map_err(SessionError::io)
    }

    /// Next line without its CRLF. Invalid UTF-8 is replaced, not rejected:
    /// servers put arbitrary bytes in human-readable text.
    pub(crate) fn read_line(&mut self) -> Result<String, SessionError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_LINE {
                return Err(SessionError::protocol("reply line too long"));
            }

            let stream = self
                .inner
                .as_mut()
                .ok_or_else(|| SessionError::protocol("stream closed"))?;
            let mut buf = [0u8; 512];
            let read = stream.read(&mut buf).map_err(SessionError::io)?;
            if read == 0 {
                return Err(SessionError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::script::{Step, serve};
    use crate::probe::SessionError;

    #[test]
    fn reads_crlf_and_bare_lf_lines() {
        let (mut stream, server) = serve(vec![
            Step::Send("first\r\nsecond\nthird"),
            Step::Send("-continued\r\n"),
            Step::Expect("PING"),
        ]);
        assert_eq!(stream.read_line().unwrap(), "first");
        assert_eq!(stream.read_line().unwrap(), "second");
        assert_eq!(stream.read_line().unwrap(), "third-continued");
        stream.write_line("PING").unwrap();
        assert_eq!(server.join().unwrap(), vec!["PING"]);
    }

    #[test]
    fn embedded_line_breaks_are_never_written() {
        let (mut stream, server) = serve(vec![Step::Expect("PASS")]);
        let err = stream.write_line("PASS secret\r\nDELE 1").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)), "{err}");
        assert!(stream.write_line("USER a\nb").is_err());
        stream.write_line("PASS secret").unwrap();
        assert_eq!(server.join().unwrap(), vec!["PASS secret"]);
    }

    #[test]
    fn eof_is_an_io_error() {
        let (mut stream, server) = serve(vec![Step::Send("partial")]);
        server.join().unwrap();
        let err = stream.read_line().unwrap_err();
        assert!(err.to_string().contains("connection closed"), "{err}");
        assert!(!err.is_transport());
    }
}
