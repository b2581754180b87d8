//! Output device abstraction
//!
//! Decode tasks write interleaved PCM bytes into an [`OutputSink`], which
//! wraps the actual [`OutputDevice`] and takes care of two device quirks:
//! reconfiguring is skipped when the format did not change, and short writes
//! are retried until everything is accepted.

use super::types::PcmFormat;
use crate::error::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pause before retrying a device that accepted nothing
const FULL_DEVICE_BACKOFF: Duration = Duration::from_millis(5);

/// PCM sink (sound card, file, test capture, ...)
pub trait OutputDevice: Send {
    /// Switch the device to `format`
    fn configure(&mut self, format: PcmFormat) -> Result<()>;

    /// Queue interleaved PCM; may accept fewer bytes than offered (or none
    /// while the device queue is full)
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;
}

/// Device wrapper used by decode tasks
pub struct OutputSink {
    device: Box<dyn OutputDevice>,
    format: Option<PcmFormat>,
    bytes_written: u64,
}

impl OutputSink {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            format: None,
            bytes_written: 0,
        }
    }

    pub fn format(&self) -> Option<PcmFormat> {
        self.format
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Configure the device; no-op when `format` is already active
    pub fn configure(&mut self, format: PcmFormat) -> Result<()> {
        if self.format == Some(format) {
            return Ok(());
        }
        info!("Configuring audio output: {}", format);
        self.device.configure(format)?;
        self.format = Some(format);
        Ok(())
    }

    /// Write all of `pcm`, looping on short writes.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires while the device is full.
    pub fn write_all(&mut self, mut pcm: &[u8], cancel: &CancellationToken) -> Result<()> {
        if self.format.is_none() {
            return Err(Error::AudioOutput("write before configure".to_string()));
        }

        while !pcm.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = self.device.write(pcm)?;
            if n == 0 {
                std::thread::sleep(FULL_DEVICE_BACKOFF);
                continue;
            }
            self.bytes_written += n as u64;
            pcm = &pcm[n..];
        }
        Ok(())
    }
}

/// Discards all PCM (headless runs, `--device null`)
#[derive(Debug, Default)]
pub struct NullOutput;

impl OutputDevice for NullOutput {
    fn configure(&mut self, _format: PcmFormat) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        Ok(pcm.len())
    }
}
