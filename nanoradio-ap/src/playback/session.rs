//! Stream session controller
//!
//! Owns the lifecycle of one stream: connects (with retry), sends the
//! request, and runs two threads that meet at the [`RingBuffer`]:
//!
//! ```text
//! open() ──► connect + GET ──► network thread ── on_body ──► RingBuffer ──► decode thread ──► OutputSink
//!                                   │                                          ▲
//!                                   └── first fragment buffered: spawn ────────┘
//! ```
//!
//! The network thread reads the HTTP response, classifies the stream from
//! `Content-Type`, follows redirects and pushes body fragments into the ring
//! buffer. Once enough data is buffered it spawns the decode thread picked by
//! the [`DecoderRegistry`]. When the last of the two threads exits the
//! session returns to [`SessionStatus::Idle`] and can be opened again.
//!
//! Teardown ([`StreamSession::stop`]) fires the session's cancellation token
//! and cancels the ring buffer so that blocked reads and writes return, then
//! joins both threads.

use crate::audio::{OutputDevice, OutputSink, StreamType};
use crate::config::PlayerConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::http::{send_request, BodySummary, HttpResponseContext, ResponseEvents, ResponseOutcome};
use crate::net::{Connector, SchemeConnector, Transport};
use crate::playback::decode_task::{
    DecodeContext, DecodeEntry, DecoderRegistry, SymphoniaDecoders,
};
use crate::playback::ring_buffer::RingBuffer;
use crate::playback::state::{SessionShared, SessionStats, SessionStatus};
use nanoradio_common::url::{Scheme, StreamUrl};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Granularity at which a connect retry delay notices `stop()`
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// State shared by the controller and the stream threads
struct SessionCore {
    config: PlayerConfig,
    ring: Arc<RingBuffer>,
    output: Arc<Mutex<OutputSink>>,
    connector: Arc<dyn Connector>,
    decoders: Arc<dyn DecoderRegistry>,
    shared: Arc<SessionShared>,
}

/// Threads and token of the stream currently owned by the session
struct ActiveStream {
    cancel: CancellationToken,
    network: Option<JoinHandle<()>>,
}

/// Decrements the live task count when a stream thread exits (or panics)
struct TaskGuard(Arc<SessionShared>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.task_exited();
    }
}

/// One internet radio stream at a time
pub struct StreamSession {
    core: Arc<SessionCore>,
    active: Mutex<Option<ActiveStream>>,
}

impl StreamSession {
    /// Bring up a session with the production collaborators: TCP/TLS
    /// transport chosen by URL scheme and symphonia decode tasks.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A configuration value is out of range
    /// - The ring buffer or TLS client cannot be created
    pub fn init(config: PlayerConfig, device: Box<dyn OutputDevice>) -> Result<Self> {
        let connector = SchemeConnector::from_config(&config.http)?;
        Self::with_collaborators(
            config,
            device,
            Arc::new(connector),
            Arc::new(SymphoniaDecoders),
        )
    }

    /// Bring up a session with explicit transport and decode collaborators
    pub fn with_collaborators(
        config: PlayerConfig,
        device: Box<dyn OutputDevice>,
        connector: Arc<dyn Connector>,
        decoders: Arc<dyn DecoderRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let ring = Arc::new(RingBuffer::from_config(&config.buffer)?);

        info!(
            "Stream session ready (ring buffer {} KiB, watermark {} KiB)",
            ring.capacity() / 1024,
            ring.low_watermark() / 1024
        );

        Ok(Self {
            core: Arc::new(SessionCore {
                config,
                ring,
                output: Arc::new(Mutex::new(OutputSink::new(device))),
                connector,
                decoders,
                shared: Arc::new(SessionShared::new()),
            }),
            active: Mutex::new(None),
        })
    }

    /// Open `http://host:port/path` (TLS when `port` is 443).
    ///
    /// Returns once the request has been sent; the response is read by the
    /// network thread.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if a stream is already active (nothing is started)
    /// - [`Error::TransportFatal`] once the connect attempts are exhausted
    /// - any other transport or request error, immediately
    pub fn open(&self, host: &str, path: &str, port: u16) -> Result<()> {
        let scheme = if port == Scheme::Https.default_port() {
            Scheme::Https
        } else {
            Scheme::Http
        };
        let target = StreamUrl::from_parts(scheme, host, port, path)?;
        self.open_target(target)
    }

    /// Open a stream by URL; the scheme selects plain or TLS transport
    pub fn open_url(&self, url: &str) -> Result<()> {
        let target = StreamUrl::parse(url)?;
        self.open_target(target)
    }

    fn open_target(&self, target: StreamUrl) -> Result<()> {
        let shared = &self.core.shared;
        if !shared.transition(SessionStatus::Idle, SessionStatus::Caching) {
            debug!("Open {} rejected: session is {}", target, shared.status());
            return Err(Error::Busy);
        }

        match self.start(target) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Failed to open stream: {}", e);
                shared.record_error(&e);
                shared.set_status(SessionStatus::Idle);
                Err(e)
            }
        }
    }

    fn start(&self, target: StreamUrl) -> Result<()> {
        // The previous stream's threads have exited (status was Idle)
        self.reap();

        let shared = &self.core.shared;
        self.core.ring.reset();
        shared.begin_stream();

        let cancel = CancellationToken::new();
        *self.lock_active() = Some(ActiveStream {
            cancel: cancel.clone(),
            network: None,
        });

        info!("Opening stream {}", target);
        let transport = self.core.connect(&target, &cancel)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        shared.task_started();
        let task = NetworkTask {
            core: Arc::clone(&self.core),
            cancel: cancel.clone(),
            target,
        };
        let handle = thread::Builder::new()
            .name("network".to_string())
            .spawn(move || task.run(transport))
            .map_err(|e| {
                shared.task_exited();
                Error::Failed(format!("Failed to spawn network task: {}", e))
            })?;

        let mut active = self.lock_active();
        match active.as_mut() {
            Some(stream) => stream.network = Some(handle),
            // Stopped while connecting: keep the handle so the next stop/open joins it
            None => {
                *active = Some(ActiveStream {
                    cancel,
                    network: Some(handle),
                })
            }
        }
        Ok(())
    }

    /// Tear down the current stream and return to `Idle`.
    ///
    /// Blocked ring buffer calls return immediately; a network thread
    /// blocked in the transport returns within the read timeout.
    pub fn stop(&self) {
        let active = self.lock_active().take();
        if let Some(stream) = &active {
            stream.cancel.cancel();
        }
        self.core.ring.cancel();

        if let Some(handle) = active.and_then(|stream| stream.network) {
            join_task(handle, "network");
        }
        if let Some(handle) = self.core.shared.take_decode_handle() {
            join_task(handle, "decode");
        }

        self.core.ring.reset();
        self.core.shared.set_running(false);
        self.core.shared.set_status(SessionStatus::Idle);
        debug!("Stream session stopped");
    }

    /// Block until the network and decode threads of the current stream
    /// have exited
    pub fn wait(&self) {
        self.core.shared.wait_tasks(None);
    }

    /// [`wait`](StreamSession::wait) with a deadline; false on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.core.shared.wait_tasks(Some(timeout))
    }

    pub fn status(&self) -> SessionStatus {
        self.core.shared.status()
    }

    pub fn stream_type(&self) -> StreamType {
        self.core.shared.stream_type()
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.core.shared.last_error()
    }

    pub fn is_running(&self) -> bool {
        self.core.shared.is_running()
    }

    pub fn stats(&self) -> SessionStats {
        self.core.shared.stats(self.core.ring.stats())
    }

    pub fn ring_buffer(&self) -> &Arc<RingBuffer> {
        &self.core.ring
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join threads left over from a finished stream
    fn reap(&self) {
        let previous = self.lock_active().take();
        if let Some(handle) = previous.and_then(|stream| stream.network) {
            join_task(handle, "network");
        }
        if let Some(handle) = self.core.shared.take_decode_handle() {
            join_task(handle, "decode");
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `delay` in short slices, returning early once `cancel` fires
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) {
    let mut remaining = delay;
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let slice = remaining.min(CANCEL_POLL_INTERVAL);
        thread::sleep(slice);
        remaining -= slice;
    }
}

fn join_task(handle: JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        error!("{} task panicked", name);
    }
}

impl SessionCore {
    /// Connect and send the GET request.
    ///
    /// Connect failures ([`Error::TransportFatal`]) are retried after
    /// `session.retry_delay_ms`, up to `session.max_connect_attempts`
    /// attempts (0 = forever). Other errors are returned immediately.
    fn connect(&self, target: &StreamUrl, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        let policy = &self.config.session;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt = attempt.saturating_add(1);

            match self
                .connector
                .connect(target.scheme(), target.host(), target.port())
            {
                Ok(mut transport) => {
                    if attempt > 1 {
                        info!("Connected to {} after {} attempts", target.host(), attempt);
                    }
                    if let Err(e) = send_request(
                        transport.as_mut(),
                        target.host(),
                        target.path(),
                        None,
                        self.config.http.scratch_size,
                    ) {
                        transport.close();
                        return Err(e);
                    }
                    return Ok(transport);
                }
                Err(e) if e.is_fatal_transport() => {
                    if policy.max_connect_attempts != 0 && attempt >= policy.max_connect_attempts {
                        warn!("Giving up on {} after {} attempts", target.host(), attempt);
                        return Err(e);
                    }
                    warn!(
                        "Connect attempt {} to {}:{} failed: {}; retrying in {:?}",
                        attempt,
                        target.host(),
                        target.port(),
                        e,
                        policy.retry_delay()
                    );
                    sleep_unless_cancelled(policy.retry_delay(), cancel);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bytes buffered before decoding starts, kept well below capacity so
    /// the producer never blocks before the consumer exists
    fn prebuffer_threshold(&self) -> usize {
        self.config
            .session
            .prebuffer_bytes
            .min(self.ring.capacity() / 2)
    }

    /// Spawn the decode thread for the classified stream type
    fn start_decode_task(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        let shared = &self.shared;
        let stream_type = shared.stream_type();
        let entry = self.decoders.select(stream_type).ok_or_else(|| {
            Error::Failed(format!("no decode task for {} stream", stream_type))
        })?;

        shared.set_running(true);
        shared.set_status(SessionStatus::Decoding);
        shared.task_started();

        let ctx = DecodeContext::new(
            Arc::clone(&self.ring),
            Arc::clone(&self.output),
            cancel.clone(),
            Arc::clone(&self.shared),
        );
        let core = Arc::clone(self);

        let spawned = thread::Builder::new()
            .name(format!("decode-{}", entry.name))
            .stack_size(entry.stack_size)
            .spawn(move || core.run_decode(entry, ctx));

        match spawned {
            Ok(handle) => {
                shared.store_decode_handle(handle);
                info!(
                    "Decode task '{}' started ({} bytes buffered)",
                    entry.name,
                    self.ring.fill()
                );
                Ok(())
            }
            Err(e) => {
                shared.set_running(false);
                shared.set_status(SessionStatus::Caching);
                shared.task_exited();
                Err(Error::Failed(format!(
                    "Failed to spawn decode task '{}': {}",
                    entry.name, e
                )))
            }
        }
    }

    /// Decode thread body
    fn run_decode(&self, entry: DecodeEntry, ctx: DecodeContext) {
        let _guard = TaskGuard(Arc::clone(&self.shared));
        let cancel = ctx.cancel_token().clone();

        match (entry.run)(ctx) {
            Ok(()) => info!("Decode task '{}' finished", entry.name),
            Err(Error::Cancelled) => debug!("Decode task '{}' cancelled", entry.name),
            Err(e) => {
                error!("Decode task '{}' failed: {}", entry.name, e);
                self.shared.record_error(&e);
            }
        }

        // Nothing consumes the ring buffer any more: release the producer
        cancel.cancel();
        self.ring.cancel();
        self.shared.set_running(false);
    }
}

/// Network thread: reads the response into the ring buffer
struct NetworkTask {
    core: Arc<SessionCore>,
    cancel: CancellationToken,
    target: StreamUrl,
}

impl NetworkTask {
    fn run(self, mut transport: Box<dyn Transport>) {
        let _guard = TaskGuard(Arc::clone(&self.core.shared));
        let shared = &self.core.shared;

        let result = self.stream(&mut transport);
        transport.close();

        match &result {
            Ok(summary) => {
                info!(
                    "Stream body ended: {} bytes received",
                    summary.content_read_length
                );
                // Short stream that never reached the prebuffer threshold
                if shared.status() == SessionStatus::Caching
                    && !shared.is_running()
                    && !self.core.ring.is_cancelled()
                    && self.core.ring.fill() > 0
                {
                    if let Err(e) = self.core.start_decode_task(&self.cancel) {
                        error!("Stream failed: {}", e);
                        shared.record_error(&e);
                    }
                }
            }
            Err(Error::Cancelled) => debug!("Network task cancelled"),
            Err(e) => {
                error!("Stream failed: {}", e);
                shared.record_error(e);
            }
        }

        self.core.ring.finish();
    }

    /// Read responses until a body completes, following redirects
    fn stream(&self, transport: &mut Box<dyn Transport>) -> Result<BodySummary> {
        let http = &self.core.config.http;
        let mut ctx = HttpResponseContext::new(http.scratch_size)
            .with_length_check(http.verify_content_length);

        let mut current = self.target.clone();
        let mut visited = HashSet::from([current.to_string()]);
        let mut hops = 0u32;

        loop {
            let mut events = StreamEvents {
                core: &self.core,
                cancel: &self.cancel,
            };

            match ctx.read_response(transport.as_mut(), &mut events)? {
                ResponseOutcome::Body(summary) => return Ok(summary),
                ResponseOutcome::Redirected(location) => {
                    hops += 1;
                    if hops > http.max_redirects {
                        return Err(Error::TooManyRedirects(format!(
                            "more than {} redirects",
                            http.max_redirects
                        )));
                    }

                    let next = current.join(&location)?;
                    if !visited.insert(next.to_string()) {
                        return Err(Error::TooManyRedirects(format!(
                            "redirect loop at {}",
                            next
                        )));
                    }

                    info!("Following redirect to {}", next);
                    transport.close();
                    *transport = self.core.connect(&next, &self.cancel)?;
                    current = next;
                }
            }
        }
    }
}

/// Response callbacks of the network thread
struct StreamEvents<'a> {
    core: &'a Arc<SessionCore>,
    cancel: &'a CancellationToken,
}

impl ResponseEvents for StreamEvents<'_> {
    fn on_content_type(&mut self, content_type: &str) -> Result<()> {
        let stream_type = StreamType::from_content_type(content_type);
        if stream_type == StreamType::Unknown {
            return Err(Error::UnknownType(content_type.to_string()));
        }
        info!("Stream type: {} ({})", stream_type, content_type);
        self.core.shared.set_stream_type(stream_type);
        Ok(())
    }

    fn on_body(&mut self, fragment: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.core.ring.write(fragment)?;
        let shared = &self.core.shared;
        shared.add_bytes(fragment.len());

        if shared.status() == SessionStatus::Caching
            && !shared.is_running()
            && self.core.ring.fill() >= self.core.prebuffer_threshold()
        {
            self.core.start_decode_task(self.cancel)?;
        }
        Ok(())
    }

    fn on_redirect(&mut self, location: &str) -> Result<()> {
        if !self.core.config.http.follow_redirects {
            return Err(Error::TooManyRedirects(format!(
                "redirects disabled (location {})",
                location
            )));
        }
        Ok(())
    }
}
