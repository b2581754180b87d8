//! Configuration management for the nanoradio-ap player
//!
//! Bootstrap configuration is a single TOML file. Every section and every
//! field is optional; anything left out falls back to the built-in defaults
//! below.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--log-level, --device)
//! 2. Environment variables (NANORADIO_CONFIG selects the file)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! ```toml
//! station = "http://radio.example/live.mp3"
//!
//! [buffer]
//! capacity_bytes = 2097152
//! low_watermark_bytes = 114688
//!
//! [http]
//! read_timeout_ms = 10000
//! follow_redirects = true
//!
//! [session]
//! max_connect_attempts = 10
//! retry_delay_ms = 1000
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default ring buffer capacity (2 MiB of compressed stream)
pub const DEFAULT_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

/// Default low watermark: a starved reader waits for this much data
pub const DEFAULT_LOW_WATERMARK: usize = 112 * 1024;

/// Default largest copy performed per ring buffer lock acquisition
pub const DEFAULT_TRANSFER_UNIT: usize = 4096;

/// Default HTTP scratch buffer size; must hold the complete response header
pub const DEFAULT_SCRATCH_SIZE: usize = 4096;

/// Smallest accepted scratch buffer (status line plus a few headers)
pub const MIN_SCRATCH_SIZE: usize = 256;

/// Complete player configuration, as read from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Station URL played when none is given on the command line
    pub station: Option<String>,
    pub buffer: BufferConfig,
    pub http: HttpConfig,
    pub session: SessionConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

/// Ring buffer sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity_bytes: usize,
    pub low_watermark_bytes: usize,
    pub transfer_unit_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_BUFFER_CAPACITY,
            low_watermark_bytes: DEFAULT_LOW_WATERMARK,
            transfer_unit_bytes: DEFAULT_TRANSFER_UNIT,
        }
    }
}

/// HTTP reader and transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub scratch_size: usize,
    pub read_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Compare delivered body length with Content-Length at end of stream
    pub verify_content_length: bool,
    pub follow_redirects: bool,
    pub max_redirects: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scratch_size: DEFAULT_SCRATCH_SIZE,
            read_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            verify_content_length: true,
            follow_redirects: true,
            max_redirects: 5,
        }
    }
}

/// Session controller policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connect attempts before giving up on an unreachable host (0 = forever)
    pub max_connect_attempts: u32,
    pub retry_delay_ms: u64,
    /// Bytes buffered before the decode task starts (0 = first fragment)
    pub prebuffer_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 10,
            retry_delay_ms: 1_000,
            prebuffer_bytes: 0,
        }
    }
}

/// Audio output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = default device)
    pub device: Option<String>,
    /// Capacity of the PCM queue feeding the device callback, in frames
    pub pcm_queue_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            pcm_queue_frames: 16_384,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub audio_device: Option<String>,
}

impl PlayerConfig {
    /// Load configuration from an optional TOML file and apply overrides.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - TOML file cannot be read or parsed
    /// - A setting is out of range (see [`PlayerConfig::validate`])
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config: PlayerConfig = nanoradio_common::config::load_toml(path)?;

        if let Some(level) = overrides.log_level {
            config.logging.level = level;
        }
        if let Some(device) = overrides.audio_device {
            config.audio.device = Some(device);
        }

        config.validate()?;

        if let Some(path) = path {
            info!("Loaded configuration from {}", path.display());
        }
        Ok(config)
    }

    /// Reject settings the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity_bytes == 0 {
            return Err(Error::Config("buffer.capacity_bytes must be > 0".to_string()));
        }
        if self.buffer.transfer_unit_bytes == 0 {
            return Err(Error::Config("buffer.transfer_unit_bytes must be > 0".to_string()));
        }
        if self.http.scratch_size < MIN_SCRATCH_SIZE {
            return Err(Error::Config(format!(
                "http.scratch_size must be >= {} (got {})",
                MIN_SCRATCH_SIZE, self.http.scratch_size
            )));
        }
        if self.audio.pcm_queue_frames == 0 {
            return Err(Error::Config("audio.pcm_queue_frames must be > 0".to_string()));
        }
        Ok(())
    }
}

impl HttpConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}

impl SessionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.capacity_bytes, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.http.scratch_size, DEFAULT_SCRATCH_SIZE);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.prebuffer_bytes, 0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PlayerConfig = toml::from_str(
            r#"
            station = "http://radio.example/live"

            [http]
            max_redirects = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.station.as_deref(), Some("http://radio.example/live"));
        assert_eq!(config.http.max_redirects, 2);
        assert!(config.http.follow_redirects);
        assert_eq!(config.buffer.low_watermark_bytes, DEFAULT_LOW_WATERMARK);
    }

    #[test]
    fn test_small_scratch_rejected() {
        let mut config = PlayerConfig::default();
        config.http.scratch_size = 64;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_read_timeout_disables_timeout() {
        let http = HttpConfig {
            read_timeout_ms: 0,
            ..HttpConfig::default()
        };
        assert!(http.read_timeout().is_none());
    }
}
