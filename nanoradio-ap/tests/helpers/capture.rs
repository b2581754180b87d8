//! Capture devices and decode tasks
//!
//! Records what would reach the speakers so tests can compare it with what
//! the scripted server sent.

use nanoradio_ap::audio::{OutputDevice, PcmFormat, StreamType};
use nanoradio_ap::http::ResponseEvents;
use nanoradio_ap::playback::{DecodeContext, DecodeEntry, DecodeFn, DecoderRegistry};
use nanoradio_ap::{Error, Result};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Output device that keeps every byte written to it
#[derive(Clone, Default)]
pub struct CaptureOutput {
    data: Arc<Mutex<Vec<u8>>>,
    formats: Arc<Mutex<Vec<PcmFormat>>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Formats passed to `configure`, in order
    pub fn formats(&self) -> Vec<PcmFormat> {
        self.formats.lock().unwrap().clone()
    }

    /// Wait until at least `n` bytes were captured
    pub fn wait_for_bytes(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        self.len() >= n
    }
}

impl OutputDevice for CaptureOutput {
    fn configure(&mut self, format: PcmFormat) -> Result<()> {
        self.formats.lock().unwrap().push(format);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.data.lock().unwrap().extend_from_slice(pcm);
        Ok(pcm.len())
    }
}

/// Format reported by the capture decode tasks
pub const CAPTURE_FORMAT: PcmFormat = PcmFormat {
    sample_rate: 8000,
    bit_depth: 16,
    channels: 1,
};

/// Copies the compressed stream straight to the output
fn passthrough(ctx: DecodeContext) -> Result<()> {
    let mut buf = [0u8; 256];
    loop {
        let n = ctx.read(&mut buf);
        if n == 0 {
            return Ok(());
        }
        ctx.write_pcm(CAPTURE_FORMAT, &buf[..n])?;
    }
}

/// Never reads; exits once the stream is torn down
fn idle_until_cancelled(ctx: DecodeContext) -> Result<()> {
    while !ctx.is_cancelled() {
        thread::sleep(Duration::from_millis(2));
    }
    Ok(())
}

/// Reads one buffer, then fails like a decoder hitting garbage
fn fail_after_first_read(ctx: DecodeContext) -> Result<()> {
    let mut buf = [0u8; 16];
    ctx.read(&mut buf);
    Err(Error::Decode("corrupt frame".to_string()))
}

/// Registry running the same task for every known stream type
#[derive(Clone, Copy)]
pub struct CaptureDecoders {
    name: &'static str,
    run: DecodeFn,
}

impl CaptureDecoders {
    pub fn passthrough() -> Self {
        Self {
            name: "passthrough",
            run: passthrough,
        }
    }

    pub fn idle() -> Self {
        Self {
            name: "idle",
            run: idle_until_cancelled,
        }
    }

    pub fn failing() -> Self {
        Self {
            name: "failing",
            run: fail_after_first_read,
        }
    }
}

impl DecoderRegistry for CaptureDecoders {
    fn select(&self, stream_type: StreamType) -> Option<DecodeEntry> {
        if stream_type == StreamType::Unknown {
            return None;
        }
        Some(DecodeEntry {
            name: self.name,
            run: self.run,
            stack_size: 128 * 1024,
        })
    }
}

/// Response callbacks that record what they were given
#[derive(Default)]
pub struct EventLog {
    pub content_types: Vec<String>,
    pub fragments: Vec<Vec<u8>>,
    pub redirects: Vec<String>,
    /// Fail `on_body` once this many fragments were accepted
    pub fail_body_after: Option<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(fragments: usize) -> Self {
        Self {
            fail_body_after: Some(fragments),
            ..Self::default()
        }
    }

    /// All fragments concatenated
    pub fn body(&self) -> Vec<u8> {
        self.fragments.concat()
    }
}

impl ResponseEvents for EventLog {
    fn on_content_type(&mut self, content_type: &str) -> Result<()> {
        self.content_types.push(content_type.to_string());
        Ok(())
    }

    fn on_body(&mut self, fragment: &[u8]) -> Result<()> {
        if self.fail_body_after == Some(self.fragments.len()) {
            return Err(Error::Cancelled);
        }
        self.fragments.push(fragment.to_vec());
        Ok(())
    }

    fn on_redirect(&mut self, location: &str) -> Result<()> {
        self.redirects.push(location.to_string());
        Ok(())
    }
}
