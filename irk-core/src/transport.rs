//! Raw socket/TLS transport.
//!
//! Owns connecting and line-level I/O, nothing else: no IRC framing
//! beyond splitting on CRLF. TLS uses rustls with the webpki root store;
//! port 6697 implies TLS even when the flag is unset.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::config::BotConfig;

/// Buffered read half. One [`read_line`](TransportReader::read_line)
/// call per IRC line, CRLF stripped.
pub struct TransportReader {
    inner: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
}

/// Write half. One [`write_line`](TransportWriter::write_line) call per
/// IRC line, CRLF appended.
pub struct TransportWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

impl TransportReader {
    /// Read the next line. `Ok(None)` means the peer closed the stream.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        let n = self.inner.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

impl TransportWriter {
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\r\n").await?;
        self.inner.flush().await
    }

    /// Close the write side. Errors are irrelevant at teardown.
    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

/// Open a TCP (and optionally TLS) connection and split it into halves.
pub async fn connect(config: &BotConfig) -> io::Result<(TransportReader, TransportWriter)> {
    let use_tls = config.use_tls || config.port == 6697;
    let mode = if use_tls { "TLS" } else { "plain" };
    tracing::debug!(server = %config.server, port = config.port, mode, "connecting");

    let tcp = TcpStream::connect((config.server.as_str(), config.port)).await?;

    if use_tls {
        let connector = TlsConnector::from(Arc::new(tls_client_config()));
        let server_name = rustls::pki_types::ServerName::try_from(config.server.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let stream = connector.connect(server_name, tcp).await?;
        tracing::debug!("TLS handshake complete");
        let (reader, writer) = tokio::io::split(stream);
        Ok(make_halves(reader, writer))
    } else {
        let (reader, writer) = tokio::io::split(tcp);
        Ok(make_halves(reader, writer))
    }
}

pub(crate) fn make_halves<R, W>(reader: R, writer: W) -> (TransportReader, TransportWriter)
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    (
        TransportReader {
            inner: BufReader::new(Box::new(reader)),
        },
        TransportWriter {
            inner: Box::new(writer),
        },
    )
}

fn tls_client_config() -> rustls::ClientConfig {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
