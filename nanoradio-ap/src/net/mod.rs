//! Transport adapters
//!
//! The HTTP reader and the stream session only see a blocking byte stream
//! ([`Transport`]) produced by a [`Connector`]. Concrete connectors:
//!
//! - [`TcpConnector`]: plain TCP with connect and read timeouts
//! - [`TlsConnector`]: rustls client over the same TCP connect
//! - [`SchemeConnector`]: picks one of the two per URL scheme
//!
//! Errors while establishing a connection (name resolution, refused or
//! timed-out connect) are [`Error::TransportFatal`] and are retried by the
//! session; errors on an established connection are [`Error::Transport`].

mod tcp;
mod tls;

pub use tcp::{TcpConnector, TcpTransport};
pub use tls::{TlsConnector, TlsTransport};

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use nanoradio_common::url::Scheme;

/// Blocking byte stream to a server
pub trait Transport: Send {
    /// Send some of `data`, returning how many bytes were accepted
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive into `buf`. `Ok(0)` means the peer closed the connection.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the connection. Further calls fail or return EOF.
    fn close(&mut self);

    /// Send all of `data`, looping on short sends
    fn send_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let sent = self.send(data)?;
            if sent == 0 {
                return Err(Error::Transport("connection closed while sending".to_string()));
            }
            data = &data[sent..];
        }
        Ok(())
    }
}

/// Opens transports to `host:port`
pub trait Connector: Send + Sync {
    fn connect(&self, scheme: Scheme, host: &str, port: u16) -> Result<Box<dyn Transport>>;
}

/// Plain TCP for `http`, TLS for `https`
pub struct SchemeConnector {
    tcp: TcpConnector,
    tls: TlsConnector,
}

impl SchemeConnector {
    pub fn new(tcp: TcpConnector, tls: TlsConnector) -> Self {
        Self { tcp, tls }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let tcp = TcpConnector::from_config(config);
        let tls = TlsConnector::new(tcp.clone())?;
        Ok(Self::new(tcp, tls))
    }
}

impl Connector for SchemeConnector {
    fn connect(&self, scheme: Scheme, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        match scheme {
            Scheme::Http => self.tcp.connect(scheme, host, port),
            Scheme::Https => self.tls.connect(scheme, host, port),
        }
    }
}

/// Map an I/O error on an established connection
fn io_to_transport(context: &str, e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            Error::Transport(format!("{} timed out", context))
        }
        _ => Error::Transport(format!("{} failed: {}", context, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trickle {
        accepted: Vec<u8>,
        max_per_send: usize,
    }

    impl Transport for Trickle {
        fn send(&mut self, data: &[u8]) -> Result<usize> {
            let n = data.len().min(self.max_per_send);
            self.accepted.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn recv(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_send_all_loops_on_short_sends() {
        let mut t = Trickle {
            accepted: Vec::new(),
            max_per_send: 3,
        };
        t.send_all(b"GET / HTTP/1.1\r\n").unwrap();
        assert_eq!(t.accepted, b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_send_all_fails_on_zero_send() {
        let mut t = Trickle {
            accepted: Vec::new(),
            max_per_send: 0,
        };
        assert!(matches!(t.send_all(b"x"), Err(Error::Transport(_))));
    }

    #[test]
    fn test_timeouts_map_to_transport_errors() {
        let err = io_to_transport(
            "recv",
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "again"),
        );
        assert!(matches!(err, Error::Transport(ref m) if m.contains("timed out")));
    }
}
