//! HTTP/1.1 GET request serialization

use crate::error::{Error, Result};
use crate::net::Transport;
use tracing::debug;

const CONNECTION_CLOSE: &[u8] = b"Connection: close\r\n\r\n";

/// Byte range requested with a `Range: bytes=start-[end]` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive last byte; `None` requests everything from `start`
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn bounded(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    fn header_line(&self) -> String {
        match self.end {
            Some(end) => format!("Range: bytes={}-{}\r\n", self.start, end),
            None => format!("Range: bytes={}-\r\n", self.start),
        }
    }
}

/// Assemble a GET request.
///
/// The request must fit in `limit` bytes (the header assembly buffer). The
/// total length is computed with checked arithmetic before anything is
/// formatted; a request that would not fit is [`Error::BufferOverflow`].
pub fn build_request(
    host: &str,
    path: &str,
    range: Option<ByteRange>,
    limit: usize,
) -> Result<Vec<u8>> {
    if host.is_empty() {
        return Err(Error::Header("empty host".to_string()));
    }
    if !path.starts_with('/') {
        return Err(Error::Header(format!("request path must start with '/': {}", path)));
    }
    if has_line_break(host) || has_line_break(path) {
        return Err(Error::Header("line break in request host or path".to_string()));
    }

    let range_line = range.map(|r| r.header_line());

    let total = ["GET ", " HTTP/1.1\r\n", "Host: ", "\r\n"]
        .iter()
        .map(|s| s.len())
        .chain([
            host.len(),
            path.len(),
            range_line.as_ref().map_or(0, String::len),
            CONNECTION_CLOSE.len(),
        ])
        .try_fold(0usize, |acc, n| acc.checked_add(n))
        .filter(|&total| total <= limit)
        .ok_or_else(|| {
            Error::BufferOverflow(format!(
                "request for host {} bytes / path {} bytes exceeds {} byte header buffer",
                host.len(),
                path.len(),
                limit
            ))
        })?;

    let mut req = Vec::with_capacity(total);
    req.extend_from_slice(b"GET ");
    req.extend_from_slice(path.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\n");
    req.extend_from_slice(b"Host: ");
    req.extend_from_slice(host.as_bytes());
    req.extend_from_slice(b"\r\n");
    if let Some(line) = &range_line {
        req.extend_from_slice(line.as_bytes());
    }
    req.extend_from_slice(CONNECTION_CLOSE);

    debug_assert_eq!(req.len(), total);
    Ok(req)
}

/// Write a GET request for `path` on `host` to `transport`.
pub fn send_request(
    transport: &mut dyn Transport,
    host: &str,
    path: &str,
    range: Option<ByteRange>,
    limit: usize,
) -> Result<()> {
    let req = build_request(host, path, range, limit)?;
    debug!("GET {} (host {}, {} bytes)", path, host, req.len());
    transport.send_all(&req)
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}
