//! Sound card output using cpal
//!
//! cpal streams are not `Send`, so each configured format gets its own
//! output thread that owns the device and the stream. Decoded PCM reaches
//! the audio callback through a lock-free SPSC ring (`ringbuf`) of `i16`
//! samples; the callback plays silence when the ring runs dry.

use super::output::OutputDevice;
use super::types::PcmFormat;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the output thread checks its stop flag
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Log every Nth callback underrun
const UNDERRUN_LOG_INTERVAL: u64 = 1000;

struct OutputThread {
    producer: HeapProd<i16>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// cpal-backed [`OutputDevice`]
pub struct CpalOutput {
    device_name: Option<String>,
    queue_frames: usize,
    active: Option<OutputThread>,
    underruns: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Output on `device_name` (None = default device).
    ///
    /// Nothing is opened until the first `configure`.
    pub fn new(device_name: Option<String>, queue_frames: usize) -> Self {
        Self {
            device_name,
            queue_frames: queue_frames.max(1),
            active: None,
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Shared count of callback underruns since creation
    pub fn underrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.underruns)
    }

    fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Release);
            if active.handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl OutputDevice for CpalOutput {
    fn configure(&mut self, format: PcmFormat) -> Result<()> {
        if format.bit_depth != 16 {
            return Err(Error::AudioOutput(format!(
                "unsupported bit depth {} (expected 16)",
                format.bit_depth
            )));
        }

        self.shutdown();

        let capacity = self.queue_frames * usize::from(format.channels.max(1));
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = {
            let stop = Arc::clone(&stop);
            let underruns = Arc::clone(&self.underruns);
            let device_name = self.device_name.clone();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    run_output_thread(device_name, format, consumer, underruns, stop, ready_tx)
                })
                .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?
        };

        // Wait for the thread to report whether the stream started
        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::AudioOutput("output thread exited".to_string())));

        match started {
            Ok(()) => {
                self.active = Some(OutputThread {
                    producer,
                    stop,
                    handle,
                });
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::AudioOutput("output not configured".to_string()))?;

        if active.handle.is_finished() {
            return Err(Error::AudioOutput("output stream stopped".to_string()));
        }

        let free = active.producer.vacant_len();
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .take(free)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let pushed = active.producer.push_slice(&samples);
        Ok(pushed * 2)
    }
}

/// Output thread body: opens the device, plays until `stop` is set
fn run_output_thread(
    device_name: Option<String>,
    format: PcmFormat,
    consumer: HeapCons<i16>,
    underruns: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<()>>,
) {
    let stream = match open_stream(device_name.as_deref(), format, consumer, underruns) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::AudioOutput(format!("Failed to start stream: {}", e))));
        return;
    }
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Acquire) {
        thread::sleep(STOP_POLL_INTERVAL);
    }

    debug!("Audio output thread stopping");
    drop(stream);
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

fn open_stream(
    device_name: Option<&str>,
    format: PcmFormat,
    mut consumer: HeapCons<i16>,
    underruns: Arc<AtomicU64>,
) -> Result<Stream> {
    let device = select_device(device_name)?;

    let sample_format = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?
        .sample_format();

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

    let mut next_sample = move || match consumer.try_pop() {
        Some(sample) => sample,
        None => {
            let count = underruns.fetch_add(1, Ordering::Relaxed) + 1;
            if count % UNDERRUN_LOG_INTERVAL == 0 {
                warn!("Audio output underrun (total: {})", count);
            }
            0
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = f32::from(next_sample()) / 32768.0;
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = next_sample();
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = (i32::from(next_sample()) + 32768) as u16;
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    }
    .map_err(|e| Error::AudioOutput(format!("Failed to build stream ({}): {}", format, e)))?;

    info!("Audio stream opened: {} ({:?} device samples)", format, sample_format);
    Ok(stream)
}
