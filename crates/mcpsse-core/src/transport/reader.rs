//! Server-to-client half: the long-lived event stream.
//!
//! The reader loops through four states for as long as the session is open:
//!
//! - CONNECTING: endpoint cleared, GET in flight
//! - HANDSHAKING: stream open, waiting for the endpoint announcement
//! - STREAMING: forwarding `data:` events to the inbound channel
//! - BACKING_OFF: connection failed or ended, waiting a fixed delay
//!
//! Failures never leave the reader; they are logged and followed by a
//! reconnect. It stops only when the session closes or nobody is left to
//! receive inbound envelopes.

use super::endpoint::EndpointSlot;
use super::sse::{LineDecoder, ScanEvent, SseScanner};
use crate::cancel::CancellationToken;
use crate::channel::EnvelopeSender;
use crate::error::TransportError;
use crate::network::SseConnector;
use crate::Result;
use futures::StreamExt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

/// Reader lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Connecting,
    Handshaking,
    Streaming,
    BackingOff,
    Stopped,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderState::Connecting => write!(f, "CONNECTING"),
            ReaderState::Handshaking => write!(f, "HANDSHAKING"),
            ReaderState::Streaming => write!(f, "STREAMING"),
            ReaderState::BackingOff => write!(f, "BACKING_OFF"),
            ReaderState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Why a single connection attempt ended without an error.
enum StreamEnd {
    Eof,
    Cancelled,
    InboundClosed,
}

/// Owns the GET connection and the inbound channel's producing half.
pub struct SseReader {
    connector: Arc<dyn SseConnector>,
    url: Url,
    endpoint: EndpointSlot,
    inbound: EnvelopeSender,
    closed: CancellationToken,
    reconnect_delay: Duration,
    state: watch::Sender<ReaderState>,
}

impl SseReader {
    pub fn new(
        connector: Arc<dyn SseConnector>,
        url: Url,
        endpoint: EndpointSlot,
        inbound: EnvelopeSender,
        closed: CancellationToken,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ReaderState::Connecting);
        Self {
            connector,
            url,
            endpoint,
            inbound,
            closed,
            reconnect_delay,
            state,
        }
    }

    /// Observe state transitions. The last state stays readable after the
    /// reader has stopped.
    pub fn subscribe(&self) -> watch::Receiver<ReaderState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ReaderState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("SSE reader {} -> {}", previous, state);
        }
    }

    /// Run the connect/stream/back-off loop until the session closes.
    pub async fn run(self) {
        let mut attempt: u64 = 0;

        loop {
            if self.closed.is_cancelled() || self.inbound.is_closed() {
                break;
            }

            attempt += 1;
            self.endpoint.clear();
            self.set_state(ReaderState::Connecting);
            debug!("SSE connection init: {} (attempt {})", self.url, attempt);

            match self.stream_once().await {
                Ok(StreamEnd::Eof) => info!("SSE stream from {} ended", self.url),
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::InboundClosed) => {
                    debug!("Inbound channel closed, stopping SSE reader");
                    break;
                }
                Err(e) => error!("SSE connection error: {}", e),
            }

            self.set_state(ReaderState::BackingOff);
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ReaderState::Stopped);
        debug!("SSE reader stopped after {} connection attempt(s)", attempt);
    }

    async fn stream_once(&self) -> Result<StreamEnd> {
        let mut body = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Ok(StreamEnd::Cancelled),
            result = self.connector.connect(&self.url) => result?,
        };
        self.set_state(ReaderState::Handshaking);

        let mut scanner = SseScanner::new();
        let mut decoder = LineDecoder::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    decoder.push(&bytes);
                    while let Some(line) = decoder.next_line() {
                        if self.handle_line(&mut scanner, &line).await.is_break() {
                            return Ok(StreamEnd::InboundClosed);
                        }
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if let Some(line) = decoder.finish() {
                        if self.handle_line(&mut scanner, &line).await.is_break() {
                            return Ok(StreamEnd::InboundClosed);
                        }
                    }
                    if !scanner.handshake_done() {
                        warn!("SSE stream ended before the endpoint was announced");
                    }
                    return Ok(StreamEnd::Eof);
                }
            }
        }
    }

    async fn handle_line(&self, scanner: &mut SseScanner, line: &str) -> ControlFlow<()> {
        match scanner.feed(line) {
            ScanEvent::Preamble | ScanEvent::Ignored => {}
            ScanEvent::Endpoint(path) => {
                debug!("Extracted message endpoint: {}", path);
                self.endpoint.set(path);
                self.set_state(ReaderState::Streaming);
            }
            ScanEvent::HandshakeFailed { line } => {
                warn!(
                    "{}; outbound messages will be dropped until reconnect",
                    TransportError::Handshake { line }
                );
                self.set_state(ReaderState::Streaming);
            }
            ScanEvent::Message(message) => {
                let label = message.describe();
                if self.inbound.send(message).await.is_err() {
                    return ControlFlow::Break(());
                }
                debug!("Delivered inbound {}", label);
            }
            ScanEvent::Discarded(e) => warn!("Discarding SSE data line: {}", e),
        }
        ControlFlow::Continue(())
    }
}
