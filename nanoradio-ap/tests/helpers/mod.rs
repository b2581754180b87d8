//! Test helpers for nanoradio-ap integration tests
//!
//! Provides:
//! - Scripted transports and connectors standing in for a radio server
//! - Capture output device and pass-through decode tasks
//! - Canned HTTP responses and a small test configuration

#![allow(dead_code)]

pub mod capture;
pub mod scripted_transport;

pub use capture::{CaptureDecoders, CaptureOutput, EventLog};
pub use scripted_transport::{ScriptedConnector, ScriptedTransport};

use nanoradio_ap::config::PlayerConfig;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Small buffers, no watermark or prebuffer, fast retries
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.buffer.capacity_bytes = 64 * 1024;
    config.buffer.low_watermark_bytes = 0;
    config.buffer.transfer_unit_bytes = 1024;
    config.http.scratch_size = 512;
    config.session.max_connect_attempts = 3;
    config.session.retry_delay_ms = 5;
    config.session.prebuffer_bytes = 0;
    config
}

/// Response head with the given status line and headers, no body
pub fn response_head(status_line: &str, headers: &[(&str, &str)]) -> Vec<u8> {
    let mut head = format!("{}\r\n", status_line);
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    head.into_bytes()
}

/// `200 OK` with `Content-Length` and the whole body
pub fn plain_response(content_type: &str, body: &[u8]) -> Vec<u8> {
    let length = body.len().to_string();
    let mut response = response_head(
        "HTTP/1.1 200 OK",
        &[("Content-Type", content_type), ("Content-Length", &length)],
    );
    response.extend_from_slice(body);
    response
}

/// `200 OK` with a chunked body, one chunk per entry of `chunks`
pub fn chunked_response(content_type: &str, chunks: &[&[u8]]) -> Vec<u8> {
    let mut response = response_head(
        "HTTP/1.1 200 OK",
        &[("Content-Type", content_type), ("Transfer-Encoding", "chunked")],
    );
    response.extend_from_slice(&chunked_body(chunks));
    response
}

/// Chunk framing for `chunks`, including the terminating zero chunk
pub fn chunked_body(chunks: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    for chunk in chunks {
        body.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        body.extend_from_slice(chunk);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"0\r\n\r\n");
    body
}

/// `301 Moved Permanently` pointing at `location`
pub fn redirect_response(location: &str) -> Vec<u8> {
    response_head("HTTP/1.1 301 Moved Permanently", &[("Location", location)])
}

/// Deterministic non-repeating-looking payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
