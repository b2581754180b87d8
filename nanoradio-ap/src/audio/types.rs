//! Audio stream and PCM format types

use std::fmt;

/// Compressed stream format, classified from the response `Content-Type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamType {
    Mpeg,
    Aac,
    Mp4,
    OctetStream,
    #[default]
    Unknown,
}

impl StreamType {
    /// Classify a MIME type. Parameters (`; charset=...`) and case are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use nanoradio_ap::audio::StreamType;
    ///
    /// assert_eq!(StreamType::from_content_type("audio/mpeg"), StreamType::Mpeg);
    /// assert_eq!(StreamType::from_content_type("Audio/AAC; rate=44100"), StreamType::Aac);
    /// assert_eq!(StreamType::from_content_type("text/html"), StreamType::Unknown);
    /// ```
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" => StreamType::Mpeg,
            "audio/aac" | "audio/aacp" => StreamType::Aac,
            "audio/mp4" | "audio/x-m4a" => StreamType::Mp4,
            "application/octet-stream" => StreamType::OctetStream,
            _ => StreamType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Mpeg => "mpeg",
            StreamType::Aac => "aac",
            StreamType::Mp4 => "mp4",
            StreamType::OctetStream => "octet-stream",
            StreamType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interleaved PCM layout handed to an output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    /// Bits per sample (decoders emit 16)
    pub bit_depth: u16,
    pub channels: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, bit_depth: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bit_depth,
            channels,
        }
    }

    /// Signed 16-bit interleaved PCM
    pub fn s16(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, 16, channels)
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth).div_ceil(8)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} ch",
            self.sample_rate, self.bit_depth, self.channels
        )
    }
}
