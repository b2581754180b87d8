//! Integration tests for the HTTP response reader
//!
//! Drives `HttpResponseContext` with scripted transports: header parsing,
//! plain and chunked bodies, fragment delivery across buffer refills,
//! redirects and error statuses.

mod helpers;

use helpers::{
    chunked_body, chunked_response, plain_response, redirect_response, response_head,
    EventLog, ScriptedTransport,
};
use nanoradio_ap::http::{HttpResponseContext, ResponseOutcome};
use nanoradio_ap::Error;

const WIKIPEDIA: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

fn read(
    scratch: usize,
    transport: &mut ScriptedTransport,
    events: &mut EventLog,
) -> nanoradio_ap::Result<ResponseOutcome> {
    HttpResponseContext::new(scratch).read_response(transport, events)
}

#[test]
fn test_chunked_body_delivers_each_chunk() {
    let mut transport = ScriptedTransport::serving(WIKIPEDIA);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.fragments, vec![b"Wiki".to_vec(), b"pedia".to_vec()]);
    match outcome {
        ResponseOutcome::Body(summary) => {
            assert!(summary.chunked);
            assert!(summary.terminated);
            assert_eq!(summary.content_read_length, 9);
            assert_eq!(summary.status, 200);
        }
        other => panic!("expected body, got {:?}", other),
    }
}

#[test]
fn test_chunked_body_byte_at_a_time() {
    let mut transport = ScriptedTransport::serving(WIKIPEDIA).trickle(1);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), b"Wikipedia");
    assert!(matches!(outcome, ResponseOutcome::Body(s) if s.terminated));
}

#[test]
fn test_content_length_body_across_reads() {
    let mut transport = ScriptedTransport::new()
        .data(response_head("HTTP/1.1 200 OK", &[("Content-Length", "5")]))
        .data(&b"hel"[..])
        .data(&b"lo"[..]);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), b"hello");
    match outcome {
        ResponseOutcome::Body(summary) => {
            assert_eq!(summary.content_length, Some(5));
            assert_eq!(summary.content_read_length, 5);
            assert!(!summary.length_mismatch());
            assert!(!summary.chunked);
        }
        other => panic!("expected body, got {:?}", other),
    }
}

#[test]
fn test_body_in_same_read_as_header() {
    let mut transport = ScriptedTransport::serving(plain_response("audio/mpeg", b"hello"));
    let mut events = EventLog::new();

    read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.content_types, vec!["audio/mpeg".to_string()]);
    assert_eq!(events.body(), b"hello");
}

#[test]
fn test_malformed_chunk_size_stops_delivery() {
    let mut transport = ScriptedTransport::serving(
        &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\nzz\r\nmore\r\n0\r\n\r\n"[..],
    );
    let mut events = EventLog::new();

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::Header(_))), "{:?}", result);
    assert_eq!(events.body(), b"Wiki");
}

#[test]
fn test_redirect_reports_location_without_body() {
    let mut transport = ScriptedTransport::serving(redirect_response("http://x/y"));
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(outcome, ResponseOutcome::Redirected("http://x/y".to_string()));
    assert_eq!(events.redirects, vec!["http://x/y".to_string()]);
    assert!(events.fragments.is_empty());
    assert!(events.content_types.is_empty());
}

#[test]
fn test_redirect_without_location_is_status_error() {
    let mut transport =
        ScriptedTransport::serving(response_head("HTTP/1.1 301 Moved Permanently", &[]));
    let mut events = EventLog::new();

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::HttpStatus(301))));
    assert!(events.redirects.is_empty());
}

#[test]
fn test_error_status_reported() {
    let mut transport = ScriptedTransport::serving(response_head(
        "HTTP/1.1 404 Not Found",
        &[("Content-Type", "text/html"), ("Content-Length", "9")],
    ))
    .data(&b"not found"[..]);
    let mut events = EventLog::new();

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::HttpStatus(404))));
    assert!(events.content_types.is_empty());
    assert!(events.fragments.is_empty());
}

#[test]
fn test_partial_content_accepted() {
    let mut transport = ScriptedTransport::serving(response_head(
        "HTTP/1.1 206 Partial Content",
        &[("Content-Type", "audio/aac"), ("Content-Length", "3")],
    ))
    .data(&b"abc"[..]);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert!(matches!(outcome, ResponseOutcome::Body(s) if s.status == 206));
    assert_eq!(events.body(), b"abc");
}

#[test]
fn test_oversized_header_rejected() {
    let long_value = "x".repeat(600);
    let mut transport = ScriptedTransport::serving(response_head(
        "HTTP/1.1 200 OK",
        &[("X-Padding", &long_value)],
    ));
    let mut events = EventLog::new();

    let result = read(256, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::Header(_))));
    assert!(events.fragments.is_empty());
}

#[test]
fn test_eof_inside_header_rejected() {
    let mut transport = ScriptedTransport::serving(&b"HTTP/1.1 200 OK\r\nContent-Ty"[..]);
    let mut events = EventLog::new();

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::Header(_))));
}

#[test]
fn test_header_names_case_insensitive() {
    let mut transport = ScriptedTransport::serving(
        &b"HTTP/1.1 200 OK\r\ncontent-type: audio/mpeg\r\nTRANSFER-ENCODING: Chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"[..],
    );
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.content_types, vec!["audio/mpeg".to_string()]);
    assert!(matches!(outcome, ResponseOutcome::Body(s) if s.chunked && s.terminated));
    assert_eq!(events.body(), b"abc");
}

#[test]
fn test_crlf_inside_chunk_data_passes_through() {
    let mut transport = ScriptedTransport::serving(chunked_response(
        "audio/mpeg",
        &[&b"a\r\nb"[..], &b"\r\n"[..]],
    ));
    let mut events = EventLog::new();

    read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), b"a\r\nb\r\n");
}

#[test]
fn test_chunk_larger_than_scratch_buffer() {
    let payload = helpers::pattern(1000);
    let mut transport = ScriptedTransport::serving(chunked_response("audio/mpeg", &[&payload]));
    let mut events = EventLog::new();

    let outcome = read(256, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), payload);
    assert!(events.fragments.len() > 1);
    assert!(events.fragments.iter().all(|f| !f.is_empty() && f.len() <= 256));
    assert!(matches!(outcome, ResponseOutcome::Body(s) if s.content_read_length == 1000));
}

#[test]
fn test_uppercase_hex_chunk_size() {
    let payload = helpers::pattern(26);
    let mut response = response_head("HTTP/1.1 200 OK", &[("Transfer-Encoding", "chunked")]);
    response.extend_from_slice(b"1A\r\n");
    response.extend_from_slice(&payload);
    response.extend_from_slice(b"\r\n0\r\n\r\n");
    let mut transport = ScriptedTransport::serving(response);
    let mut events = EventLog::new();

    read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), payload);
}

#[test]
fn test_chunked_stream_cut_short_is_not_terminated() {
    let mut body = chunked_body(&[&b"abcd"[..]]);
    body.truncate(body.len() - b"0\r\n\r\n".len());
    let mut response = response_head("HTTP/1.1 200 OK", &[("Transfer-Encoding", "chunked")]);
    response.extend_from_slice(&body);
    let mut transport = ScriptedTransport::serving(response);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    assert_eq!(events.body(), b"abcd");
    assert!(matches!(outcome, ResponseOutcome::Body(s) if !s.terminated));
}

#[test]
fn test_short_plain_body_flags_mismatch() {
    let mut transport = ScriptedTransport::serving(response_head(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "10")],
    ))
    .data(&b"abc"[..]);
    let mut events = EventLog::new();

    let outcome = read(4096, &mut transport, &mut events).unwrap();

    match outcome {
        ResponseOutcome::Body(summary) => {
            assert_eq!(summary.content_read_length, 3);
            assert!(summary.length_mismatch());
        }
        other => panic!("expected body, got {:?}", other),
    }
}

#[test]
fn test_callback_error_aborts_response() {
    let mut transport = ScriptedTransport::serving(WIKIPEDIA);
    let mut events = EventLog::failing_after(1);

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(events.fragments, vec![b"Wiki".to_vec()]);
}

#[test]
fn test_transport_failure_mid_body() {
    let mut transport = ScriptedTransport::serving(response_head(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "10")],
    ))
    .data(&b"abc"[..])
    .fail("connection reset");
    let mut events = EventLog::new();

    let result = read(4096, &mut transport, &mut events);

    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(events.body(), b"abc");
}

#[test]
fn test_context_reused_between_responses() {
    let mut ctx = HttpResponseContext::new(4096);

    let mut first = ScriptedTransport::serving(WIKIPEDIA);
    let mut events = EventLog::new();
    ctx.read_response(&mut first, &mut events).unwrap();

    let mut second = ScriptedTransport::serving(plain_response("audio/mpeg", b"xyz"));
    let mut events = EventLog::new();
    let outcome = ctx.read_response(&mut second, &mut events).unwrap();

    assert_eq!(events.body(), b"xyz");
    match outcome {
        ResponseOutcome::Body(summary) => {
            assert!(!summary.chunked);
            assert_eq!(summary.content_read_length, 3);
        }
        other => panic!("expected body, got {:?}", other),
    }
}
