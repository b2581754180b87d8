//! Plain TCP transport

use super::{io_to_transport, Connector, Transport};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use nanoradio_common::url::Scheme;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Opens TCP connections with a connect timeout and a per-read timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, read_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.connect_timeout(), config.read_timeout())
    }

    /// Resolve `host` and connect to the first address that accepts.
    ///
    /// Every failure here is [`Error::TransportFatal`].
    pub fn open_stream(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::TransportFatal(format!("cannot resolve {}: {}", host, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(Error::TransportFatal(format!("no addresses for {}", host)));
        }

        let mut last_error = None;
        for addr in &addrs {
            debug!("Connecting to {} ({})", host, addr);
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(self.read_timeout)
                        .map_err(|e| Error::TransportFatal(format!("set_read_timeout: {}", e)))?;
                    // Request is written in one piece; no need to batch
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::TransportFatal(format!(
            "cannot connect to {}:{}: {}",
            host,
            port,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl Connector for TcpConnector {
    fn connect(&self, _scheme: Scheme, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        let stream = self.open_stream(host, port)?;
        Ok(Box::new(TcpTransport::new(stream)))
    }
}

/// Established TCP connection
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(data) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_to_transport("send", e)),
            }
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => {
                    trace!("recv {} bytes", n);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_to_transport("recv", e)),
            }
        }
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
