//! TLS transport (rustls client with the webpki root store)

use super::{io_to_transport, Connector, TcpConnector, Transport};
use crate::error::{Error, Result};
use nanoradio_common::url::Scheme;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use tracing::debug;

/// Opens TLS connections on top of [`TcpConnector`]
pub struct TlsConnector {
    tcp: TcpConnector,
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// Build a connector trusting the bundled webpki roots
    pub fn new(tcp: TcpConnector) -> Result<Self> {
        let roots: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("TLS configuration: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self::with_config(tcp, Arc::new(config)))
    }

    pub fn with_config(tcp: TcpConnector, config: Arc<ClientConfig>) -> Self {
        Self { tcp, config }
    }
}

impl Connector for TlsConnector {
    fn connect(&self, _scheme: Scheme, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::TransportFatal(format!("invalid server name {}: {}", host, e)))?;

        let mut socket = self.tcp.open_stream(host, port)?;

        let mut conn = ClientConnection::new(Arc::clone(&self.config), server_name)
            .map_err(|e| Error::Transport(format!("TLS setup failed: {}", e)))?;

        // Finish the handshake now so certificate problems surface at connect
        while conn.is_handshaking() {
            conn.complete_io(&mut socket)
                .map_err(|e| Error::Transport(format!("TLS handshake with {} failed: {}", host, e)))?;
        }
        debug!("TLS session established with {}", host);

        Ok(Box::new(TlsTransport {
            stream: StreamOwned::new(conn, socket),
        }))
    }
}

/// Established TLS connection
pub struct TlsTransport {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl Transport for TlsTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let n = loop {
            match self.stream.write(data) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_to_transport("send", e)),
            }
        };
        self.stream
            .flush()
            .map_err(|e| io_to_transport("send", e))?;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Servers that drop the socket without close_notify: treat as EOF
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(io_to_transport("recv", e)),
            }
        }
    }

    fn close(&mut self) {
        self.stream.conn.send_close_notify();
        let _ = self.stream.flush();
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }
}
