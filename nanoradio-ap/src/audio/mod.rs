//! Audio decoding and output
//!
//! - [`types`]: stream classification and PCM layout
//! - [`decoder`]: symphonia decoding from the session ring buffer
//! - [`output`]: output device trait, sink wrapper, null device
//! - [`cpal_output`]: sound card output

pub mod cpal_output;
pub mod decoder;
pub mod output;
pub mod types;

pub use cpal_output::CpalOutput;
pub use decoder::{decode_stream, DecodeSummary, FlowObserver, RingBufferSource};
pub use output::{NullOutput, OutputDevice, OutputSink};
pub use types::{PcmFormat, StreamType};
