//! Minimal HTTP/1.1 client for stream acquisition
//!
//! One GET per connection (`Connection: close`), response read through a
//! fixed-size scratch buffer with plain or chunked body decoding.

pub mod request;
pub mod response;

pub use request::{build_request, send_request, ByteRange};
pub use response::{BodySummary, HttpResponseContext, ResponseEvents, ResponseOutcome};

/// Position of the first `\r` of the `\r\n\r\n` header/body separator
pub(crate) fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}
