//! Blocking byte ring buffer between the network task and the decode task
//!
//! The network task (producer) pushes compressed stream bytes with
//! [`RingBuffer::write`]; the decode task (consumer) pulls them with
//! [`RingBuffer::read`]. Both calls block instead of dropping or returning
//! partial data:
//!
//! - A writer that finds less free space than the next transfer unit waits on
//!   the "space available" condition until the reader frees room.
//! - A reader that finds less data than it needs waits on the "data
//!   available" condition until the fill level is back above the low
//!   watermark, so a starved decoder resumes with a cushion instead of being
//!   fed a trickle of tiny reads. A reader never outwaits a blocked writer:
//!   once the writer is parked on a full buffer, the reader takes what is
//!   queued.
//!
//! ```text
//! network task ── write() ──► [ RingBuffer: capacity bytes ] ── read() ──► decode task
//!                   ▲ blocks when full                          ▲ blocks below watermark
//! ```
//!
//! All cursors, the fill level and the diagnostic counters live behind one
//! mutex. [`RingBuffer::cancel`] and [`RingBuffer::reset`] wake every waiter
//! so a blocked call can observe teardown instead of hanging.

use crate::config::BufferConfig;
use crate::error::{Error, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Starvation transitions reported to a reader's observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// The reader found too little data and is about to block
    Starved,
    /// The reader woke up again (data arrived, end of stream, or teardown)
    Resumed,
}

/// Overflow and underflow totals are logged at `warn` once per this many events
pub const FLOW_LOG_INTERVAL: u64 = 1000;

/// Snapshot of ring buffer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferStats {
    pub capacity: usize,
    pub fill: usize,
    pub overflow_count: u64,
    pub underflow_count: u64,
}

impl RingBufferStats {
    /// Fill level as a percentage (0.0 to 100.0)
    pub fn fill_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.fill as f32 / self.capacity as f32 * 100.0
    }

    pub fn free(&self) -> usize {
        self.capacity - self.fill
    }
}

struct RingState {
    storage: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    fill: usize,
    overflow_count: u64,
    underflow_count: u64,
    /// Producer reached end of stream; readers drain what is left
    finished: bool,
    /// Session torn down; every blocked call returns
    cancelled: bool,
    /// Writer is parked waiting for space
    writer_waiting: bool,
    /// Bumped on reset so blocked calls re-evaluate against the new state
    generation: u64,
}

impl RingState {
    /// Copy `data` in at the write cursor, wrapping at most once.
    /// Caller guarantees `data.len()` fits in the free space.
    fn copy_in(&mut self, data: &[u8]) {
        let capacity = self.storage.len();
        debug_assert!(data.len() <= capacity - self.fill);

        let first = data.len().min(capacity - self.write_pos);
        let (head, tail) = data.split_at(first);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(head);
        self.storage[..tail.len()].copy_from_slice(tail);

        self.write_pos = (self.write_pos + data.len()) % capacity;
        self.fill += data.len();
    }

    /// Copy `out.len()` bytes out at the read cursor, wrapping at most once.
    /// Caller guarantees that many bytes are queued.
    fn copy_out(&mut self, out: &mut [u8]) {
        let capacity = self.storage.len();
        debug_assert!(out.len() <= self.fill);

        let first = out.len().min(capacity - self.read_pos);
        let (head, tail) = out.split_at_mut(first);
        head.copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        let tail_len = tail.len();
        tail.copy_from_slice(&self.storage[..tail_len]);

        self.read_pos = (self.read_pos + out.len()) % capacity;
        self.fill -= out.len();
    }
}

/// Fixed-capacity blocking byte FIFO
///
/// Single producer, single consumer. Safe to share through `Arc`.
pub struct RingBuffer {
    state: Mutex<RingState>,
    data_available: Condvar,
    space_available: Condvar,
    capacity: usize,
    low_watermark: usize,
    transfer_unit: usize,
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("low_watermark", &self.low_watermark)
            .field("transfer_unit", &self.transfer_unit)
            .field("fill", &stats.fill)
            .field("overflow_count", &stats.overflow_count)
            .field("underflow_count", &stats.underflow_count)
            .finish()
    }
}

impl RingBuffer {
    /// Create a ring buffer.
    ///
    /// # Arguments
    /// * `capacity` - Storage size in bytes (must be > 0)
    /// * `low_watermark` - Fill level a starved reader waits for (clamped to
    ///   `capacity - transfer_unit`, so the writer can always reach it)
    /// * `transfer_unit` - Largest copy per lock acquisition (clamped to 1..=capacity)
    pub fn new(capacity: usize, low_watermark: usize, transfer_unit: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("ring buffer capacity must be > 0".to_string()));
        }

        let transfer_unit = transfer_unit.clamp(1, capacity);
        let reachable = capacity - transfer_unit;
        if low_watermark > reachable {
            warn!(
                "Low watermark {} exceeds capacity {} minus transfer unit {}, using {}",
                low_watermark, capacity, transfer_unit, reachable
            );
        }
        let low_watermark = low_watermark.min(reachable);

        debug!(
            "Creating ring buffer: capacity={} bytes, low_watermark={}, transfer_unit={}",
            capacity, low_watermark, transfer_unit
        );

        Ok(Self {
            state: Mutex::new(RingState {
                storage: vec![0u8; capacity].into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
                fill: 0,
                overflow_count: 0,
                underflow_count: 0,
                finished: false,
                cancelled: false,
                writer_waiting: false,
                generation: 0,
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity,
            low_watermark,
            transfer_unit,
        })
    }

    pub fn from_config(config: &BufferConfig) -> Result<Self> {
        Self::new(
            config.capacity_bytes,
            config.low_watermark_bytes,
            config.transfer_unit_bytes,
        )
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append all of `data`, blocking while the buffer is full.
    ///
    /// Data is copied in transfer-unit pieces; whenever the next piece does
    /// not fit, the overflow counter is bumped once and the caller sleeps
    /// until the reader frees room. Returns [`Error::Cancelled`] if the
    /// buffer is cancelled before everything was written.
    pub fn write(&self, mut data: &[u8]) -> Result<()> {
        let mut state = self.lock();

        while !data.is_empty() {
            if state.cancelled {
                return Err(Error::Cancelled);
            }

            let n = data.len().min(self.transfer_unit);
            if self.capacity - state.fill < n {
                state.overflow_count += 1;
                let count = state.overflow_count;
                trace!(
                    "Ring buffer full (fill={}, need={}, overflows={})",
                    state.fill,
                    n,
                    count
                );
                if count % FLOW_LOG_INTERVAL == 0 {
                    warn!("Ring buffer overflow (total: {})", count);
                }

                // A reader waiting on the watermark must not wait for us
                state.writer_waiting = true;
                self.data_available.notify_one();

                let generation = state.generation;
                state = self
                    .space_available
                    .wait_while(state, |s| {
                        !s.cancelled && s.generation == generation && self.capacity - s.fill < n
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                state.writer_waiting = false;
                continue;
            }

            let (piece, rest) = data.split_at(n);
            state.copy_in(piece);
            data = rest;
            self.data_available.notify_one();
        }

        Ok(())
    }

    /// Fill `buf` completely, blocking while data is short.
    ///
    /// Returns fewer bytes than requested only once the producer has
    /// [finished](RingBuffer::finish) and the buffer is drained, or when the
    /// buffer is cancelled. `0` therefore means end of stream.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.read_observed(buf, |_| {})
    }

    /// [`read`](RingBuffer::read), reporting starvation transitions.
    ///
    /// `observe` runs while the buffer lock is held and must not call back
    /// into this buffer.
    pub fn read_observed<F>(&self, buf: &mut [u8], mut observe: F) -> usize
    where
        F: FnMut(FlowEvent),
    {
        let mut state = self.lock();
        let mut copied = 0;

        while copied < buf.len() && !state.cancelled {
            let want = (buf.len() - copied).min(self.transfer_unit);

            if state.fill >= want {
                state.copy_out(&mut buf[copied..copied + want]);
                copied += want;
                self.space_available.notify_one();
                continue;
            }

            if state.finished || (state.writer_waiting && state.fill > 0) {
                if state.fill == 0 {
                    break;
                }
                let n = state.fill.min(buf.len() - copied);
                state.copy_out(&mut buf[copied..copied + n]);
                copied += n;
                self.space_available.notify_one();
                continue;
            }

            let target = want.max(self.low_watermark);
            state.underflow_count += 1;
            let count = state.underflow_count;
            trace!(
                "Ring buffer underflow (fill={}, need={}, underflows={}), waiting for {} bytes",
                state.fill,
                want,
                count,
                target
            );
            if count % FLOW_LOG_INTERVAL == 0 {
                warn!("Ring buffer underflow (total: {})", count);
            }
            observe(FlowEvent::Starved);

            let generation = state.generation;
            state = self
                .data_available
                .wait_while(state, |s| {
                    !s.cancelled
                        && !s.finished
                        && !(s.writer_waiting && s.fill > 0)
                        && s.generation == generation
                        && s.fill < target
                })
                .unwrap_or_else(PoisonError::into_inner);

            observe(FlowEvent::Resumed);
        }

        copied
    }

    /// Mark end of stream: no more writes will come, readers drain and return
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        self.data_available.notify_all();
    }

    /// Tear down: every blocked or future read/write returns immediately
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        self.data_available.notify_all();
        self.space_available.notify_all();
    }

    /// Reinitialize cursors, fill level, counters and end-of-stream flags.
    ///
    /// Only meaningful when no task is mid-read or mid-write; any call still
    /// blocked is woken once so it re-evaluates against the empty buffer.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.read_pos = 0;
        state.write_pos = 0;
        state.fill = 0;
        state.overflow_count = 0;
        state.underflow_count = 0;
        state.finished = false;
        state.cancelled = false;
        state.writer_waiting = false;
        state.generation = state.generation.wrapping_add(1);
        self.data_available.notify_all();
        self.space_available.notify_all();
        debug!("Ring buffer reset");
    }

    /// Bytes currently queued.
    ///
    /// Advisory only: the value may change as soon as the lock is released.
    pub fn fill(&self) -> usize {
        self.lock().fill
    }

    /// Bytes currently free. Advisory, like [`fill`](RingBuffer::fill).
    pub fn free(&self) -> usize {
        self.capacity - self.fill()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    pub fn overflow_count(&self) -> u64 {
        self.lock().overflow_count
    }

    pub fn underflow_count(&self) -> u64 {
        self.lock().underflow_count
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn stats(&self) -> RingBufferStats {
        let state = self.lock();
        RingBufferStats {
            capacity: self.capacity,
            fill: state.fill,
            overflow_count: state.overflow_count,
            underflow_count: state.underflow_count,
        }
    }
}
