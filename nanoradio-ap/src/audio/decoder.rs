//! Streaming audio decoder using symphonia
//!
//! Decodes compressed stream bytes pulled from the session [`RingBuffer`]
//! and writes interleaved signed 16-bit PCM to the [`OutputSink`]. The ring
//! buffer is forward-only, so it is exposed to symphonia as a non-seekable
//! [`MediaSource`].

use super::output::OutputSink;
use super::types::PcmFormat;
use crate::error::{Error, Result};
use crate::playback::ring_buffer::{FlowEvent, RingBuffer};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consecutive undecodable packets tolerated before giving up
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 50;

/// Receives ring buffer starvation transitions
pub type FlowObserver = Arc<dyn Fn(FlowEvent) + Send + Sync>;

/// Forward-only [`MediaSource`] over the session ring buffer.
///
/// `read` blocks in the ring buffer; it returns 0 (end of stream) once the
/// producer finished and the buffer drained, or when the session is torn
/// down.
pub struct RingBufferSource {
    ring: Arc<RingBuffer>,
    on_flow: FlowObserver,
    /// Bytes consumed so far, reported for `SeekFrom::Current(0)`
    pos: u64,
}

impl RingBufferSource {
    pub fn new(ring: Arc<RingBuffer>, on_flow: FlowObserver) -> Self {
        Self {
            ring,
            on_flow,
            pos: 0,
        }
    }
}

impl Read for RingBufferSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let on_flow = &self.on_flow;
        let n = self.ring.read_observed(buf, |event| on_flow(event));
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RingBufferSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.pos),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "ring buffer source is not seekable",
            )),
        }
    }
}

impl MediaSource for RingBufferSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Counters for one decoded stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub packets: u64,
    pub frames: u64,
    pub decode_errors: u64,
}

/// Decode everything `source` yields into `sink`.
///
/// # Arguments
/// - `extension`: container/codec hint for the probe (`"mp3"`, `"aac"`,
///   `"m4a"`), or `None` to let the probe decide
///
/// # Errors
/// - Stream format not recognized / no audio track
/// - Too many consecutive undecodable packets
/// - Output device errors
/// - [`Error::Cancelled`] when `cancel` fires while writing PCM
pub fn decode_stream(
    source: RingBufferSource,
    extension: Option<&str>,
    sink: &Mutex<OutputSink>,
    cancel: &CancellationToken,
) -> Result<DecodeSummary> {
    let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            // Source hit EOF before the probe saw a frame: torn down or empty stream
            SymphoniaError::IoError(ref io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                if cancel.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::Decode("stream ended before audio was found".to_string())
                }
            }
            other => Error::Decode(format!("Failed to probe format: {}", other)),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    info!(
        "Decoding stream: codec={:?}, sample_rate={:?}, channels={:?}",
        track.codec_params.codec,
        track.codec_params.sample_rate,
        track.codec_params.channels.map(|c| c.count())
    );

    let mut summary = DecodeSummary::default();
    let mut consecutive_errors = 0u32;
    let mut samples: Option<SampleBuffer<i16>> = None;
    let mut pcm = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Reached end of stream");
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                // Stream parameters changed (chained stream); start over
                decoder.reset();
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }
        summary.packets += 1;

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => {
                consecutive_errors = 0;
                decoded
            }
            Err(SymphoniaError::DecodeError(e)) => {
                summary.decode_errors += 1;
                consecutive_errors += 1;
                warn!("Decode error (skipping packet): {}", e);
                if consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                    return Err(Error::Decode(format!(
                        "{} consecutive undecodable packets",
                        consecutive_errors
                    )));
                }
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        let needed = decoded.capacity() * spec.channels.count();
        if samples.as_ref().is_some_and(|b| b.capacity() < needed) {
            samples = None;
        }
        let buffer =
            samples.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buffer.copy_interleaved_ref(decoded);

        pcm.clear();
        pcm.extend(buffer.samples().iter().flat_map(|s| s.to_le_bytes()));

        let pcm_format = PcmFormat::s16(spec.rate, spec.channels.count() as u16);
        let mut output = sink.lock().unwrap_or_else(PoisonError::into_inner);
        output.configure(pcm_format)?;
        output.write_all(&pcm, cancel)?;

        summary.frames += frames as u64;
    }

    info!(
        "Stream decode finished: {} packets, {} frames, {} decode errors",
        summary.packets, summary.frames, summary.decode_errors
    );
    Ok(summary)
}
