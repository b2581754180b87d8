//! # NanoRadio Audio Player Library (nanoradio-ap)
//!
//! Internet radio streaming pipeline.
//!
//! **Purpose:** Fetch an MP3/AAC stream over HTTP(S), buffer it against
//! network jitter, decode it and hand PCM to an audio output.
//!
//! **Architecture:** A stream session runs a network thread (HTTP response
//! reader with chunked decoding) and a decode thread (symphonia), connected
//! by a blocking byte ring buffer. Audio goes out through cpal.

pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod playback;

pub use config::PlayerConfig;
pub use error::{Error, ErrorCode, Result};
pub use playback::{SessionStatus, StreamSession};
