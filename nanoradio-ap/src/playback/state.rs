//! Stream session state shared between the controller and its tasks

use crate::audio::StreamType;
use crate::error::{Error, ErrorCode};
use crate::playback::ring_buffer::{FlowEvent, RingBufferStats};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Session status
///
/// `Idle → Caching → Decoding ⇄ Stalled → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SessionStatus {
    /// No stream; `open` is accepted
    Idle = 0,
    /// Stream opened, body arriving, decode task not started yet
    Caching = 1,
    /// Decode task running
    Decoding = 2,
    /// Decode task waiting for the ring buffer to refill
    Stalled = 3,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Caching,
            2 => SessionStatus::Decoding,
            3 => SessionStatus::Stalled,
            _ => SessionStatus::Idle,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Caching => write!(f, "caching"),
            SessionStatus::Decoding => write!(f, "decoding"),
            SessionStatus::Stalled => write!(f, "stalled"),
        }
    }
}

/// Snapshot returned by [`StreamSession::stats`](crate::playback::StreamSession::stats)
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub status: SessionStatus,
    pub stream_type: StreamType,
    pub running: bool,
    pub bytes_received: u64,
    pub last_error: Option<ErrorCode>,
    pub ring: RingBufferStats,
}

/// State touched by the controller, the network task and the decode task
pub(crate) struct SessionShared {
    status: AtomicU8,
    running: AtomicBool,
    bytes_received: AtomicU64,
    stream_type: Mutex<StreamType>,
    last_error: Mutex<Option<ErrorCode>>,
    /// Live network + decode tasks of the current stream
    tasks: Mutex<usize>,
    tasks_done: Condvar,
    decode_handle: Mutex<Option<JoinHandle<()>>>,
}

fn recover<T>(guard: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    guard.unwrap_or_else(PoisonError::into_inner)
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(SessionStatus::Idle as u8),
            running: AtomicBool::new(false),
            bytes_received: AtomicU64::new(0),
            stream_type: Mutex::new(StreamType::Unknown),
            last_error: Mutex::new(None),
            tasks: Mutex::new(0),
            tasks_done: Condvar::new(),
            decode_handle: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        let previous = SessionStatus::from_u8(self.status.swap(status as u8, Ordering::AcqRel));
        if previous != status {
            debug!("Session status: {} -> {}", previous, status);
        }
    }

    /// Atomically move `from → to`; false if the status was something else
    pub(crate) fn transition(&self, from: SessionStatus, to: SessionStatus) -> bool {
        let moved = self
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!("Session status: {} -> {}", from, to);
        }
        moved
    }

    /// Decode task starvation reported by the ring buffer
    pub(crate) fn on_flow(&self, event: FlowEvent) {
        match event {
            FlowEvent::Starved => {
                self.transition(SessionStatus::Decoding, SessionStatus::Stalled);
            }
            FlowEvent::Resumed => {
                self.transition(SessionStatus::Stalled, SessionStatus::Decoding);
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn add_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn stream_type(&self) -> StreamType {
        *recover(self.stream_type.lock())
    }

    pub(crate) fn set_stream_type(&self, stream_type: StreamType) {
        *recover(self.stream_type.lock()) = stream_type;
    }

    pub(crate) fn record_error(&self, error: &Error) {
        *recover(self.last_error.lock()) = Some(error.code());
    }

    pub(crate) fn last_error(&self) -> Option<ErrorCode> {
        *recover(self.last_error.lock())
    }

    /// Clear per-stream state before a new stream starts
    pub(crate) fn begin_stream(&self) {
        self.set_running(false);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.set_stream_type(StreamType::Unknown);
        *recover(self.last_error.lock()) = None;
    }

    pub(crate) fn task_started(&self) {
        *recover(self.tasks.lock()) += 1;
    }

    /// Called by each task as it exits; the last one returns the session to Idle
    pub(crate) fn task_exited(&self) {
        let mut tasks = recover(self.tasks.lock());
        *tasks = tasks.saturating_sub(1);
        if *tasks == 0 {
            self.set_running(false);
            self.set_status(SessionStatus::Idle);
            self.tasks_done.notify_all();
        }
    }

    /// Block until every task of the current stream has exited.
    /// Returns false if `timeout` elapsed first.
    pub(crate) fn wait_tasks(&self, timeout: Option<Duration>) -> bool {
        let tasks = recover(self.tasks.lock());
        match timeout {
            Some(timeout) => {
                let (_tasks, result) = self
                    .tasks_done
                    .wait_timeout_while(tasks, timeout, |n| *n > 0)
                    .unwrap_or_else(PoisonError::into_inner);
                !result.timed_out()
            }
            None => {
                let _tasks = self
                    .tasks_done
                    .wait_while(tasks, |n| *n > 0)
                    .unwrap_or_else(PoisonError::into_inner);
                true
            }
        }
    }

    pub(crate) fn store_decode_handle(&self, handle: JoinHandle<()>) {
        *recover(self.decode_handle.lock()) = Some(handle);
    }

    pub(crate) fn take_decode_handle(&self) -> Option<JoinHandle<()>> {
        recover(self.decode_handle.lock()).take()
    }

    pub(crate) fn stats(&self, ring: RingBufferStats) -> SessionStats {
        SessionStats {
            status: self.status(),
            stream_type: self.stream_type(),
            running: self.is_running(),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            last_error: self.last_error(),
            ring,
        }
    }
}
