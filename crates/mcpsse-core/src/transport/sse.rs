//! Line-level decoding of the event stream.
//!
//! The server emits a fixed subset of SSE: one preamble line, one
//! `data: <endpoint-path>` line announcing where to POST, then a sequence of
//! `data: <json>` events. `SseScanner` walks that sequence one line at a time
//! and `LineDecoder` turns arbitrary network chunks into lines.

use crate::config::TransportConfig;
use crate::error::ParseError;
use crate::message::JsonRpcMessage;
use bytes::BytesMut;
use tracing::warn;

/// What a single line meant.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// First line of a connection, discarded.
    Preamble,
    /// Second line carried the session endpoint path.
    Endpoint(String),
    /// Second line was not an endpoint announcement.
    HandshakeFailed { line: String },
    /// A data line decoded into an envelope.
    Message(JsonRpcMessage),
    /// A data line whose payload was not a valid envelope.
    Discarded(ParseError),
    /// Anything else after the handshake (comments, `event:` lines, blanks).
    Ignored,
}

/// Per-connection scanner; create a fresh one for every GET.
#[derive(Debug, Default)]
pub struct SseScanner {
    lines_seen: u64,
}

impl SseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the next line of the stream.
    pub fn feed(&mut self, line: &str) -> ScanEvent {
        let line = line.trim();
        self.lines_seen = self.lines_seen.saturating_add(1);

        match self.lines_seen {
            1 => ScanEvent::Preamble,
            2 => match data_field(line) {
                Some(path) if !path.is_empty() => ScanEvent::Endpoint(path.to_string()),
                _ => ScanEvent::HandshakeFailed {
                    line: line.to_string(),
                },
            },
            _ => match data_field(line) {
                Some(payload) => match JsonRpcMessage::parse(payload) {
                    Ok(message) => ScanEvent::Message(message),
                    Err(e) => ScanEvent::Discarded(e),
                },
                None => ScanEvent::Ignored,
            },
        }
    }

    /// True once both handshake lines have been consumed.
    pub fn handshake_done(&self) -> bool {
        self.lines_seen >= 2
    }
}

/// Value of a `data:` field with the optional single leading space removed.
fn data_field(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest).trim())
}

/// Reassembles lines from body chunks. Accepts `\n` and `\r\n` endings; a
/// line may be split across any number of chunks.
///
/// A line longer than `max_line` bytes is dropped whole with a warning; the
/// buffer never holds more than `max_line` bytes plus one chunk.
#[derive(Debug)]
pub struct LineDecoder {
    buf: BytesMut,
    max_line: usize,
    /// Inside an oversized line; skip up to the next terminator.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(TransportConfig::MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_line,
            discarding: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                if self.buf.len() > self.max_line {
                    if !self.discarding {
                        warn!("Dropping SSE line longer than {} bytes", self.max_line);
                    }
                    self.buf.clear();
                    self.discarding = true;
                }
                return None;
            };

            let mut line = self.buf.split_to(pos + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if pos > self.max_line {
                warn!("Dropping SSE line longer than {} bytes", self.max_line);
                continue;
            }

            line.truncate(pos);
            if line.ends_with(b"\r") {
                line.truncate(pos - 1);
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buf.split();
        if std::mem::take(&mut self.discarding) || rest.is_empty() || rest.len() > self.max_line {
            return None;
        }
        let text = String::from_utf8_lossy(&rest);
        Some(text.trim_end_matches('\r').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestId;

    #[test]
    fn test_handshake_extracts_endpoint() {
        let mut scanner = SseScanner::new();
        assert_eq!(scanner.feed(":ping"), ScanEvent::Preamble);
        assert!(!scanner.handshake_done());
        assert_eq!(
            scanner.feed("data: /session/abc123"),
            ScanEvent::Endpoint("/session/abc123".to_string())
        );
        assert!(scanner.handshake_done());
    }

    #[test]
    fn test_handshake_accepts_event_preamble_and_query() {
        let mut scanner = SseScanner::new();
        scanner.feed("event: endpoint");
        assert_eq!(
            scanner.feed("data: /messages/?session_id=9f2c\r"),
            ScanEvent::Endpoint("/messages/?session_id=9f2c".to_string())
        );
    }

    #[test]
    fn test_handshake_without_space_after_colon() {
        let mut scanner = SseScanner::new();
        scanner.feed("event: endpoint");
        assert_eq!(
            scanner.feed("data:/messages"),
            ScanEvent::Endpoint("/messages".to_string())
        );
    }

    #[test]
    fn test_malformed_handshake() {
        let mut scanner = SseScanner::new();
        scanner.feed("event: endpoint");
        assert_eq!(
            scanner.feed("event: message"),
            ScanEvent::HandshakeFailed {
                line: "event: message".to_string()
            }
        );

        let mut scanner = SseScanner::new();
        scanner.feed("");
        assert!(matches!(scanner.feed("data: "), ScanEvent::HandshakeFailed { .. }));
    }

    #[test]
    fn test_data_lines_after_handshake() {
        let mut scanner = SseScanner::new();
        scanner.feed(":ping");
        scanner.feed("data: /s");

        match scanner.feed(r#"data: {"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#) {
            ScanEvent::Message(message) => {
                assert_eq!(message.id(), Some(&RequestId::Number(1)));
                assert_eq!(message.method(), Some("ping"));
            }
            other => panic!("expected a message, got {:?}", other),
        }

        assert_eq!(scanner.feed("event: message"), ScanEvent::Ignored);
        assert_eq!(scanner.feed(""), ScanEvent::Ignored);
        assert_eq!(scanner.feed(": keep-alive"), ScanEvent::Ignored);
    }

    #[test]
    fn test_payload_containing_data_prefix_is_intact() {
        let mut scanner = SseScanner::new();
        scanner.feed(":ping");
        scanner.feed("data: /s");

        match scanner.feed(r#"data: {"jsonrpc":"2.0","method":"log","params":{"text":"data: x"}}"#) {
            ScanEvent::Message(message) => {
                assert_eq!(
                    message.to_json().unwrap(),
                    r#"{"jsonrpc":"2.0","method":"log","params":{"text":"data: x"}}"#
                );
            }
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_data_lines_are_discarded() {
        let mut scanner = SseScanner::new();
        scanner.feed(":ping");
        scanner.feed("data: /s");

        assert!(matches!(
            scanner.feed("data: {oops"),
            ScanEvent::Discarded(ParseError::InvalidJson(_))
        ));
        assert_eq!(
            scanner.feed(r#"data: {"jsonrpc":"2.0"}"#),
            ScanEvent::Discarded(ParseError::MissingField("method"))
        );
    }

    #[test]
    fn test_line_decoder_across_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"event: end");
        assert_eq!(decoder.next_line(), None);

        decoder.push(b"point\r\ndata: /a\n\nda");
        assert_eq!(decoder.next_line().as_deref(), Some("event: endpoint"));
        assert_eq!(decoder.next_line().as_deref(), Some("data: /a"));
        assert_eq!(decoder.next_line().as_deref(), Some(""));
        assert_eq!(decoder.next_line(), None);

        decoder.push(b"ta: tail");
        assert_eq!(decoder.finish().as_deref(), Some("data: tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_bare_cr_lf_line() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"\r\n");
        assert_eq!(decoder.next_line().as_deref(), Some(""));
    }

    #[test]
    fn test_line_decoder_drops_oversized_lines() {
        let mut decoder = LineDecoder::with_max_line(8);

        // Terminated within one chunk.
        decoder.push(b"data: far too long\ndata: ok\n");
        assert_eq!(decoder.next_line().as_deref(), Some("data: ok"));

        // Unterminated and growing: the buffer is released early.
        decoder.push(b"xxxxxxxxxxxx");
        assert_eq!(decoder.next_line(), None);
        decoder.push(b"yyyyyyyyyyyy");
        assert_eq!(decoder.next_line(), None);
        decoder.push(b"zz\ndata: b\n");
        assert_eq!(decoder.next_line().as_deref(), Some("data: b"));
        assert_eq!(decoder.next_line(), None);

        decoder.push(b"unterminated-tail");
        assert_eq!(decoder.next_line(), None);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_multibyte_split() {
        let mut decoder = LineDecoder::new();
        let text = "data: héllo\n".as_bytes();
        decoder.push(&text[..8]);
        decoder.push(&text[8..]);
        assert_eq!(decoder.next_line().as_deref(), Some("data: héllo"));
    }
}
