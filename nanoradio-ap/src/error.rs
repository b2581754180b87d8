//! Error types for nanoradio-ap
//!
//! Defines the player's error type using thiserror for clear error propagation.
//! Every error maps onto a small `ErrorCode` that the stream session records as
//! its last error.

use thiserror::Error;

/// Main error type for nanoradio-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Host could not be resolved or the connection was refused/timed out.
    /// The session retries these while opening a stream.
    #[error("Connection failed: {0}")]
    TransportFatal(String),

    /// Send/receive failure in the middle of an exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or oversized status line/headers, or malformed chunk framing
    #[error("HTTP header error: {0}")]
    Header(String),

    /// Server answered with a status other than 200/206/301
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Content-Type not recognized as a playable stream
    #[error("Unknown stream type: {0}")]
    UnknownType(String),

    /// A stream session is already active
    #[error("Session busy")]
    Busy,

    /// Fixed-size scratch or formatting buffer too small for the input
    #[error("Buffer overflow: {0}")]
    BufferOverflow(String),

    /// Redirect chain too long, looping, or redirects disabled
    #[error("Too many redirects: {0}")]
    TooManyRedirects(String),

    /// Session was torn down while the operation was blocked
    #[error("Operation cancelled")]
    Cancelled,

    /// Decode task could not be selected or spawned
    #[error("Operation failed: {0}")]
    Failed(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the shared library (config loading, URL parsing)
    #[error(transparent)]
    Common(#[from] nanoradio_common::Error),

    /// I/O errors outside the transport layer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compact error classification recorded by the stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TransportFatal,
    Transport,
    Header,
    HttpStatus(u16),
    UnknownType,
    Busy,
    BufferOverflow,
    TooManyRedirects,
    Cancelled,
    Failed,
    Decode,
    AudioOutput,
    Config,
    InvalidInput,
    Io,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::TransportFatal(_) => ErrorCode::TransportFatal,
            Error::Transport(_) => ErrorCode::Transport,
            Error::Header(_) => ErrorCode::Header,
            Error::HttpStatus(status) => ErrorCode::HttpStatus(*status),
            Error::UnknownType(_) => ErrorCode::UnknownType,
            Error::Busy => ErrorCode::Busy,
            Error::BufferOverflow(_) => ErrorCode::BufferOverflow,
            Error::TooManyRedirects(_) => ErrorCode::TooManyRedirects,
            Error::Cancelled => ErrorCode::Cancelled,
            Error::Failed(_) => ErrorCode::Failed,
            Error::Decode(_) => ErrorCode::Decode,
            Error::AudioOutput(_) => ErrorCode::AudioOutput,
            Error::Config(_) => ErrorCode::Config,
            Error::Common(nanoradio_common::Error::Config(_)) => ErrorCode::Config,
            Error::Common(nanoradio_common::Error::InvalidInput(_)) => ErrorCode::InvalidInput,
            Error::Common(nanoradio_common::Error::Io(_)) | Error::Io(_) => ErrorCode::Io,
        }
    }

    /// True for connect-time failures that opening a stream retries
    pub fn is_fatal_transport(&self) -> bool {
        matches!(self, Error::TransportFatal(_))
    }
}

/// Convenience Result type using nanoradio-ap Error
pub type Result<T> = std::result::Result<T, Error>;
