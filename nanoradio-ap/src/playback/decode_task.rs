//! Decode task selection
//!
//! A decode task is a function run on its own thread that pulls compressed
//! bytes from the session ring buffer and pushes PCM to the output sink.
//! Tasks are picked from a closed set of formats by [`DecoderKind`]; the
//! session only sees the [`DecoderRegistry`] seam so tests can plug in
//! their own tasks.

use crate::audio::{
    decode_stream, FlowObserver, OutputSink, PcmFormat, RingBufferSource, StreamType,
};
use crate::error::Result;
use crate::playback::ring_buffer::RingBuffer;
use crate::playback::state::SessionShared;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Entry point of a decode task
pub type DecodeFn = fn(DecodeContext) -> Result<()>;

/// A decode task: entry point plus the thread stack it needs
#[derive(Debug, Clone, Copy)]
pub struct DecodeEntry {
    pub name: &'static str,
    pub run: DecodeFn,
    pub stack_size: usize,
}

/// Picks the decode task for a stream
pub trait DecoderRegistry: Send + Sync {
    /// `None` when no task can play `stream_type`
    fn select(&self, stream_type: StreamType) -> Option<DecodeEntry>;
}

/// Everything a decode task gets from its session
pub struct DecodeContext {
    ring: Arc<RingBuffer>,
    output: Arc<Mutex<OutputSink>>,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
}

impl DecodeContext {
    pub(crate) fn new(
        ring: Arc<RingBuffer>,
        output: Arc<Mutex<OutputSink>>,
        cancel: CancellationToken,
        shared: Arc<SessionShared>,
    ) -> Self {
        Self {
            ring,
            output,
            cancel,
            shared,
        }
    }

    /// Pull compressed bytes, blocking like [`RingBuffer::read`].
    ///
    /// Starvation moves the session to `Stalled` and back to `Decoding`.
    /// Returns 0 at end of stream or teardown.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.ring.read_observed(buf, |event| self.shared.on_flow(event))
    }

    /// The ring buffer as a symphonia media source (same stall reporting)
    pub fn source(&self) -> RingBufferSource {
        let shared = Arc::clone(&self.shared);
        let observer: FlowObserver = Arc::new(move |event| shared.on_flow(event));
        RingBufferSource::new(Arc::clone(&self.ring), observer)
    }

    /// Configure the output (no-op when unchanged) and write all of `pcm`
    pub fn write_pcm(&self, format: PcmFormat, pcm: &[u8]) -> Result<()> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        output.configure(format)?;
        output.write_all(pcm, &self.cancel)
    }

    pub fn output(&self) -> &Mutex<OutputSink> {
        &self.output
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Formats with a decode task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    Mpeg,
    Aac,
    Mp4,
    OctetStream,
}

impl DecoderKind {
    pub fn from_stream_type(stream_type: StreamType) -> Option<Self> {
        match stream_type {
            StreamType::Mpeg => Some(DecoderKind::Mpeg),
            StreamType::Aac => Some(DecoderKind::Aac),
            StreamType::Mp4 => Some(DecoderKind::Mp4),
            StreamType::OctetStream => Some(DecoderKind::OctetStream),
            StreamType::Unknown => None,
        }
    }

    /// Probe hint handed to symphonia
    pub fn extension(self) -> Option<&'static str> {
        match self {
            DecoderKind::Mpeg => Some("mp3"),
            DecoderKind::Aac => Some("aac"),
            DecoderKind::Mp4 => Some("m4a"),
            DecoderKind::OctetStream => None,
        }
    }

    pub fn entry(self) -> DecodeEntry {
        match self {
            DecoderKind::Mpeg => DecodeEntry {
                name: "mpeg",
                run: decode_mpeg,
                stack_size: 256 * 1024,
            },
            DecoderKind::Aac => DecodeEntry {
                name: "aac",
                run: decode_aac,
                stack_size: 256 * 1024,
            },
            DecoderKind::Mp4 => DecodeEntry {
                name: "mp4",
                run: decode_mp4,
                stack_size: 512 * 1024,
            },
            DecoderKind::OctetStream => DecodeEntry {
                name: "probe",
                run: decode_probe,
                stack_size: 512 * 1024,
            },
        }
    }
}

/// Decode tasks backed by symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoders;

impl DecoderRegistry for SymphoniaDecoders {
    fn select(&self, stream_type: StreamType) -> Option<DecodeEntry> {
        DecoderKind::from_stream_type(stream_type).map(DecoderKind::entry)
    }
}

fn run_symphonia(ctx: DecodeContext, kind: DecoderKind) -> Result<()> {
    let source = ctx.source();
    decode_stream(source, kind.extension(), ctx.output(), ctx.cancel_token()).map(|_| ())
}

fn decode_mpeg(ctx: DecodeContext) -> Result<()> {
    run_symphonia(ctx, DecoderKind::Mpeg)
}

fn decode_aac(ctx: DecodeContext) -> Result<()> {
    run_symphonia(ctx, DecoderKind::Aac)
}

fn decode_mp4(ctx: DecodeContext) -> Result<()> {
    run_symphonia(ctx, DecoderKind::Mp4)
}

fn decode_probe(ctx: DecodeContext) -> Result<()> {
    run_symphonia(ctx, DecoderKind::OctetStream)
}
