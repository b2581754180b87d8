//! Stream playback: ring buffer, session controller and decode tasks

pub mod decode_task;
pub mod ring_buffer;
pub mod session;
pub mod state;

pub use decode_task::{
    DecodeContext, DecodeEntry, DecodeFn, DecoderKind, DecoderRegistry, SymphoniaDecoders,
};
pub use ring_buffer::{FlowEvent, RingBuffer, RingBufferStats};
pub use session::StreamSession;
pub use state::{SessionStats, SessionStatus};
