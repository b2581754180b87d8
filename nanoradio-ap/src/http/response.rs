//! HTTP response reader
//!
//! Reads one response through a fixed-size scratch buffer: the status line
//! and the complete header block must fit in it, and the body is then
//! streamed through the same buffer, refilled from offset 0 whenever it is
//! exhausted. Body bytes are handed to [`ResponseEvents::on_body`] as
//! fragments; fragment boundaries follow buffer refills and chunk framing and
//! carry no meaning of their own.
//!
//! Chunked bodies are decoded with a three-state machine:
//!
//! ```text
//!              hex digits / CR                       any byte but LF
//!                 ┌──┐                                   ┌──┐
//!                 ▼  │     LF, size > 0                  ▼  │
//!  start ──► ChunkSizeLine ─────────────► Body ──► ChunkTerminator
//!                 │  ▲                 (size bytes)      │
//!  LF, size == 0  │  └───────────────── LF ──────────────┘
//!                 ▼
//!            end of body
//! ```
//!
//! A plain body stays in `Body` until the transport reports end of stream.

use super::find_header_end;
use crate::error::{Error, Result};
use crate::net::Transport;
use tracing::{debug, trace, warn};

/// Callbacks invoked while a response is read.
///
/// Any `Err` returned aborts the response immediately and is propagated
/// unchanged out of [`HttpResponseContext::read_response`].
pub trait ResponseEvents {
    /// Value of the `Content-Type` header of a 200/206 response
    fn on_content_type(&mut self, _content_type: &str) -> Result<()> {
        Ok(())
    }

    /// Next run of body bytes, in transport order
    fn on_body(&mut self, _fragment: &[u8]) -> Result<()> {
        Ok(())
    }

    /// `Location` of a 301 response
    fn on_redirect(&mut self, _location: &str) -> Result<()> {
        Ok(())
    }
}

/// Body decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Payload bytes (all of a plain body, or the data of one chunk)
    Body,
    /// Hex digits of a chunk size, ended by CRLF
    ChunkSizeLine,
    /// CRLF trailing a chunk's data
    ChunkTerminator,
}

/// How a body ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySummary {
    pub status: u16,
    /// `Content-Length` header, if the server sent one
    pub content_length: Option<u64>,
    /// Bytes delivered to `on_body`
    pub content_read_length: u64,
    pub chunked: bool,
    /// True when a chunked body reached its zero-length chunk. Always false
    /// for plain bodies, which end at transport EOF.
    pub terminated: bool,
}

impl BodySummary {
    /// True if the server announced a length and delivered something else
    pub fn length_mismatch(&self) -> bool {
        self.content_length
            .is_some_and(|expected| expected != self.content_read_length)
    }
}

/// Result of a successfully read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// 200/206: the body was streamed to `on_body`
    Body(BodySummary),
    /// 301: `on_redirect` accepted this location; no body was read
    Redirected(String),
}

/// Headers the reader acts on
#[derive(Debug, Default)]
struct ResponseHead {
    status: u16,
    content_length: Option<u64>,
    content_type: Option<String>,
    location: Option<String>,
    chunked: bool,
}

/// Per-exchange reader state
///
/// Reused across exchanges; every call to
/// [`read_response`](HttpResponseContext::read_response) starts from a reset
/// state.
pub struct HttpResponseContext {
    scratch: Vec<u8>,
    /// Valid bytes currently resident in `scratch`
    write_pos: usize,
    content_length: Option<u64>,
    content_read_length: u64,
    chunked: bool,
    /// Bytes of the current chunk not yet delivered, or the chunk size being
    /// parsed while in `ChunkSizeLine`
    chunked_remaining: u64,
    decode_state: DecodeState,
    verify_content_length: bool,
}

impl HttpResponseContext {
    /// `scratch_size` bounds the status line plus header block
    pub fn new(scratch_size: usize) -> Self {
        Self {
            scratch: vec![0u8; scratch_size.max(1)],
            write_pos: 0,
            content_length: None,
            content_read_length: 0,
            chunked: false,
            chunked_remaining: 0,
            decode_state: DecodeState::Body,
            verify_content_length: true,
        }
    }

    /// Warn when a body's length differs from `Content-Length` (default on)
    pub fn with_length_check(mut self, enabled: bool) -> Self {
        self.verify_content_length = enabled;
        self
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn content_read_length(&self) -> u64 {
        self.content_read_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    fn reset(&mut self) {
        self.write_pos = 0;
        self.content_length = None;
        self.content_read_length = 0;
        self.chunked = false;
        self.chunked_remaining = 0;
        self.decode_state = DecodeState::Body;
    }

    /// Read one response from `transport`.
    ///
    /// - 200/206: reports `Content-Type`, then streams the body
    /// - 301: reports `Location` through `on_redirect`
    /// - anything else: [`Error::HttpStatus`]
    ///
    /// # Errors
    ///
    /// - [`Error::Header`] for a malformed status line or header, a header
    ///   block larger than the scratch buffer, or malformed chunk framing
    /// - [`Error::Transport`] when the transport fails mid-exchange
    /// - any error returned by a callback
    pub fn read_response(
        &mut self,
        transport: &mut dyn Transport,
        events: &mut dyn ResponseEvents,
    ) -> Result<ResponseOutcome> {
        self.reset();

        let header_end = self.read_head(transport)?;
        let head = parse_head(&self.scratch[..header_end])?;
        debug!(
            "HTTP {} (content-length={:?}, content-type={:?}, chunked={})",
            head.status, head.content_length, head.content_type, head.chunked
        );

        match head.status {
            200 | 206 => {}
            301 => {
                let location = head.location.ok_or(Error::HttpStatus(301))?;
                debug!("Redirected to {}", location);
                events.on_redirect(&location)?;
                return Ok(ResponseOutcome::Redirected(location));
            }
            other => return Err(Error::HttpStatus(other)),
        }

        self.content_length = head.content_length;
        self.chunked = head.chunked;

        if let Some(content_type) = &head.content_type {
            events.on_content_type(content_type)?;
        }

        let terminated = self.decode_body(transport, events, header_end + 4)?;

        let summary = BodySummary {
            status: head.status,
            content_length: self.content_length,
            content_read_length: self.content_read_length,
            chunked: self.chunked,
            terminated,
        };

        if self.verify_content_length && summary.length_mismatch() {
            warn!(
                "Body length mismatch: content-length={:?}, received={}",
                summary.content_length, summary.content_read_length
            );
        }
        debug!(
            "Response body done: {} bytes (chunked={}, terminated={})",
            summary.content_read_length, summary.chunked, summary.terminated
        );

        Ok(ResponseOutcome::Body(summary))
    }

    /// Receive until the `\r\n\r\n` separator is resident.
    /// Returns the offset of the separator's first byte.
    fn read_head(&mut self, transport: &mut dyn Transport) -> Result<usize> {
        loop {
            if let Some(end) = find_header_end(&self.scratch[..self.write_pos]) {
                return Ok(end);
            }
            if self.write_pos == self.scratch.len() {
                return Err(Error::Header(format!(
                    "response header exceeds {} byte buffer",
                    self.scratch.len()
                )));
            }

            let n = transport.recv(&mut self.scratch[self.write_pos..])?;
            if n == 0 {
                return Err(Error::Header(
                    "connection closed before end of response header".to_string(),
                ));
            }
            self.write_pos += n;
        }
    }

    /// Refill the scratch buffer from offset 0. Returns false at EOF.
    fn refill(&mut self, transport: &mut dyn Transport) -> Result<bool> {
        self.write_pos = 0;
        let n = transport.recv(&mut self.scratch)?;
        self.write_pos = n;
        trace!("Body refill: {} bytes", n);
        Ok(n > 0)
    }

    fn deliver(&mut self, events: &mut dyn ResponseEvents, start: usize, end: usize) -> Result<()> {
        let fragment = &self.scratch[start..end];
        trace!("Body fragment: {} bytes", fragment.len());
        events.on_body(fragment)?;

        let len = fragment.len() as u64;
        self.content_read_length += len;
        if self.chunked {
            self.chunked_remaining -= len;
        }
        Ok(())
    }

    /// Stream the body starting at `pos` in the scratch buffer.
    /// Returns true when a chunked body reached its terminating chunk.
    fn decode_body(
        &mut self,
        transport: &mut dyn Transport,
        events: &mut dyn ResponseEvents,
        mut pos: usize,
    ) -> Result<bool> {
        self.decode_state = if self.chunked {
            DecodeState::ChunkSizeLine
        } else {
            DecodeState::Body
        };
        let mut start = pos;

        loop {
            // Buffer exhausted: flush the pending fragment before refilling
            if pos >= self.write_pos {
                if self.decode_state == DecodeState::Body && pos > start {
                    self.deliver(events, start, pos)?;
                }
                if !self.refill(transport)? {
                    if self.chunked {
                        warn!(
                            "Chunked body ended without terminating chunk ({:?})",
                            self.decode_state
                        );
                    }
                    return Ok(false);
                }
                pos = 0;
                start = 0;
                continue;
            }

            match self.decode_state {
                DecodeState::Body => {
                    if !self.chunked {
                        pos = self.write_pos;
                        continue;
                    }

                    // `start..pos` is pending but not yet subtracted
                    let pending = (pos - start) as u64;
                    let left_in_chunk = self.chunked_remaining - pending;
                    let available = (self.write_pos - pos) as u64;
                    pos += left_in_chunk.min(available) as usize;

                    if (pos - start) as u64 == self.chunked_remaining {
                        self.deliver(events, start, pos)?;
                        self.decode_state = DecodeState::ChunkTerminator;
                    }
                }
                DecodeState::ChunkSizeLine => {
                    let byte = self.scratch[pos];
                    pos += 1;
                    match byte {
                        b'\n' if self.chunked_remaining == 0 => return Ok(true),
                        b'\n' => {
                            trace!("Chunk of {} bytes", self.chunked_remaining);
                            self.decode_state = DecodeState::Body;
                            start = pos;
                        }
                        b'\r' => {}
                        _ => {
                            let digit = (byte as char).to_digit(16).ok_or_else(|| {
                                Error::Header(format!("invalid byte 0x{:02x} in chunk size", byte))
                            })?;
                            self.chunked_remaining = self
                                .chunked_remaining
                                .checked_mul(16)
                                .and_then(|v| v.checked_add(u64::from(digit)))
                                .ok_or_else(|| Error::Header("chunk size overflow".to_string()))?;
                        }
                    }
                }
                DecodeState::ChunkTerminator => {
                    if self.scratch[pos] == b'\n' {
                        self.chunked_remaining = 0;
                        self.decode_state = DecodeState::ChunkSizeLine;
                    }
                    pos += 1;
                }
            }
        }
    }
}

/// Parse the status line and the headers the reader acts on
fn parse_head(data: &[u8]) -> Result<ResponseHead> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.split("\r\n");

    // Status line: HTTP/1.1 200 OK (HTTP/1.0 and SHOUTcast "ICY" accepted)
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !(version == "HTTP/1.1" || version == "HTTP/1.0" || version == "ICY") {
        return Err(Error::Header(format!("bad status line: {:?}", status_line)));
    }
    let status: u16 = parts
        .next()
        .and_then(|code| code.parse().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| Error::Header(format!("bad status code: {:?}", status_line)))?;

    let mut head = ResponseHead {
        status,
        ..ResponseHead::default()
    };

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::Header(format!("malformed header line: {:?}", line)));
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            let length = value
                .parse()
                .map_err(|_| Error::Header(format!("bad Content-Length: {:?}", value)))?;
            head.content_length = Some(length);
        } else if name.eq_ignore_ascii_case("content-type") {
            head.content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("location") {
            head.location = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            head.chunked = value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        }
    }

    Ok(head)
}
