//! Scripted transports for integration tests
//!
//! A [`ScriptedTransport`] replays a fixed list of receive steps instead of
//! talking to a server; a [`ScriptedConnector`] hands them out in order.

use nanoradio_ap::net::{Connector, Transport};
use nanoradio_ap::{Error, Result};
use nanoradio_common::url::Scheme;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use super::TEST_TIMEOUT;

enum Step {
    Data(Vec<u8>),
    Fail(String),
    /// Block until the sender side fires (or is dropped)
    Gate(Receiver<()>),
}

/// Transport replaying scripted receive steps; EOF once the script is done
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    /// Largest amount returned by one `recv` (0 = unlimited)
    max_recv: usize,
    sent: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            max_recv: 0,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Transport that delivers `bytes` and then reports EOF
    pub fn serving(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new().data(bytes)
    }

    pub fn data(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push_back(Step::Data(bytes.into()));
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.steps.push_back(Step::Fail(message.to_string()));
        self
    }

    pub fn gate(mut self, gate: Receiver<()>) -> Self {
        self.steps.push_back(Step::Gate(gate));
        self
    }

    /// Deliver at most `n` bytes per `recv`
    pub fn trickle(mut self, n: usize) -> Self {
        self.max_recv = n;
        self
    }

    /// Everything the client sent so far
    pub fn sent(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.sent)
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("send on closed transport".to_string()));
        }
        self.sent.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.steps.pop_front() {
                None => return Ok(0),
                Some(Step::Gate(gate)) => {
                    let _ = gate.recv_timeout(TEST_TIMEOUT);
                }
                Some(Step::Fail(message)) => return Err(Error::Transport(message)),
                Some(Step::Data(mut bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    let mut n = bytes.len().min(buf.len());
                    if self.max_recv > 0 {
                        n = n.min(self.max_recv);
                    }
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.steps.push_front(Step::Data(bytes.split_off(n)));
                    }
                    return Ok(n);
                }
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

enum Connection {
    Accept(ScriptedTransport),
    Refuse,
}

/// Connector handing out scripted transports in order.
///
/// Once the script is exhausted every connect is refused with
/// [`Error::TransportFatal`].
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Connection>>,
    attempts: AtomicUsize,
    targets: Mutex<Vec<(Scheme, String, u16)>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn accept(self, transport: ScriptedTransport) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Connection::Accept(transport));
        self
    }

    pub fn refuse(self) -> Self {
        self.script.lock().unwrap().push_back(Connection::Refuse);
        self
    }

    /// Connect attempts so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// `(scheme, host, port)` of every attempt
    pub fn targets(&self) -> Vec<(Scheme, String, u16)> {
        self.targets.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, scheme: Scheme, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.targets
            .lock()
            .unwrap()
            .push((scheme, host.to_string(), port));

        match self.script.lock().unwrap().pop_front() {
            Some(Connection::Accept(transport)) => Ok(Box::new(transport)),
            Some(Connection::Refuse) | None => Err(Error::TransportFatal(format!(
                "connection to {}:{} refused",
                host, port
            ))),
        }
    }
}
