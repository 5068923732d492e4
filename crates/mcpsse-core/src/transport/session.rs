//! Session lifecycle: wires the channels and workers together and tears them
//! down in order.

use super::endpoint::{base_url, EndpointSlot};
use super::reader::{ReaderState, SseReader};
use super::sender::{MessageSender, SenderStats};
use crate::cancel::CancellationToken;
use crate::channel::{rendezvous, EnvelopeReceiver, EnvelopeSender, StreamPair};
use crate::config::{SessionConfig, SseServerParameters};
use crate::network::{HttpClient, HttpPoster, SseConnector};
use crate::{Result, TransportError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unopened => "unopened",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Backend {
    connector: Arc<dyn SseConnector>,
    poster: Arc<dyn HttpPoster>,
}

struct Workers {
    reader: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// One client connection to an SSE server.
///
/// `open` starts the reader and sender tasks and hands back the stream pair;
/// `close` shuts everything down. Dropping an open session aborts its tasks
/// without waiting for them.
pub struct TransportSession {
    url: Url,
    config: SessionConfig,
    state: SessionState,
    /// Preset backend; when absent, `open` builds an `HttpClient`.
    preset: Option<Backend>,
    backend: Option<Backend>,
    closed: CancellationToken,
    endpoint: EndpointSlot,
    reader_state: Option<watch::Receiver<ReaderState>>,
    sender_stats: Option<Arc<SenderStats>>,
    workers: Option<Workers>,
}

impl TransportSession {
    /// Create an unopened session for `params`.
    pub fn new(params: SseServerParameters, config: SessionConfig) -> Result<Self> {
        let url = parse_sse_url(params.url())?;
        Ok(Self {
            url,
            config,
            state: SessionState::Unopened,
            preset: None,
            backend: None,
            closed: CancellationToken::new(),
            endpoint: EndpointSlot::new(),
            reader_state: None,
            sender_stats: None,
            workers: None,
        })
    }

    /// Create a session that talks through `backend` instead of building its
    /// own HTTP client.
    pub fn with_backend<B>(
        params: SseServerParameters,
        config: SessionConfig,
        backend: Arc<B>,
    ) -> Result<Self>
    where
        B: SseConnector + HttpPoster,
    {
        let mut session = Self::new(params, config)?;
        session.preset = Some(Backend {
            connector: backend.clone(),
            poster: backend,
        });
        Ok(session)
    }

    /// Start the reader and sender. Must be called from within a Tokio runtime.
    pub fn open(&mut self) -> Result<StreamPair> {
        if self.state != SessionState::Unopened {
            return Err(TransportError::SessionState {
                expected: SessionState::Unopened.as_str(),
                actual: self.state.as_str(),
            });
        }

        let backend = match self.preset.take() {
            Some(backend) => backend,
            None => {
                let client = Arc::new(HttpClient::with_config(&self.config)?);
                Backend {
                    connector: client.clone(),
                    poster: client,
                }
            }
        };

        let (inbound_tx, inbound_rx) = rendezvous(&self.closed);
        let (outbound_tx, outbound_rx) = rendezvous(&self.closed);

        let reader = SseReader::new(
            backend.connector.clone(),
            self.url.clone(),
            self.endpoint.clone(),
            inbound_tx,
            self.closed.clone(),
            self.config.reconnect_delay,
        );
        let sender = MessageSender::new(
            backend.poster.clone(),
            base_url(&self.url),
            self.endpoint.clone(),
            outbound_rx,
        );
        self.reader_state = Some(reader.subscribe());
        self.sender_stats = Some(sender.stats());

        self.workers = Some(Workers {
            reader: tokio::spawn(reader.run()),
            sender: tokio::spawn(sender.run()),
        });
        self.backend = Some(backend);
        self.state = SessionState::Open;

        info!("SSE transport opened: {}", self.url);
        Ok(StreamPair {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }

    /// Close the session. Safe to call more than once.
    ///
    /// Channels close first so pending `send`/`recv` calls return, then both
    /// tasks are cancelled and awaited, then the HTTP client is released. The
    /// reader winds down on its own once the channels close; an in-flight POST
    /// is abandoned.
    pub async fn close(&mut self) {
        match self.state {
            SessionState::Closing | SessionState::Closed => return,
            SessionState::Unopened => {
                self.closed.cancel();
                self.preset = None;
                self.state = SessionState::Closed;
                return;
            }
            SessionState::Open => {}
        }

        self.state = SessionState::Closing;
        debug!("Closing SSE transport: {}", self.url);
        self.closed.cancel();

        if let Some(workers) = self.workers.take() {
            workers.sender.abort();
            join_worker("reader", workers.reader).await;
            join_worker("sender", workers.sender).await;
        }

        self.backend = None;
        self.endpoint.clear();
        self.state = SessionState::Closed;
        info!("SSE transport closed: {}", self.url);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The SSE URL this session connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Endpoint path announced on the current connection, if any.
    pub fn endpoint(&self) -> Option<Arc<str>> {
        self.endpoint.get()
    }

    /// Current reader state, once the session has been opened.
    pub fn reader_state(&self) -> Option<ReaderState> {
        self.reader_state.as_ref().map(|rx| *rx.borrow())
    }

    /// Watch reader state transitions.
    pub fn watch_reader(&self) -> Option<watch::Receiver<ReaderState>> {
        self.reader_state.clone()
    }

    /// Outbound delivery counters, once the session has been opened.
    pub fn sender_stats(&self) -> Option<Arc<SenderStats>> {
        self.sender_stats.clone()
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(workers) = self.workers.take() {
            self.closed.cancel();
            workers.reader.abort();
            workers.sender.abort();
        }
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("endpoint", &self.endpoint.get())
            .finish()
    }
}

async fn join_worker(name: &str, handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("SSE {} task failed: {}", name, e),
    }
}

fn parse_sse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| TransportError::invalid_url(raw, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(TransportError::InvalidUrl {
                url: raw.to_string(),
                message: format!("unsupported scheme '{}'", other),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(TransportError::InvalidUrl {
            url: raw.to_string(),
            message: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// Run `body` against an open session and close the session afterwards.
///
/// `body` receives the inbound receiver and outbound sender. The session is
/// closed once `body` returns; if `body` panics, dropping the session aborts
/// its tasks.
pub async fn sse_client<F, Fut, T>(
    params: SseServerParameters,
    config: SessionConfig,
    body: F,
) -> Result<T>
where
    F: FnOnce(EnvelopeReceiver, EnvelopeSender) -> Fut,
    Fut: Future<Output = T>,
{
    let mut session = TransportSession::new(params, config)?;
    let (inbound, outbound) = session.open()?.into_parts();
    let output = body(inbound, outbound).await;
    session.close().await;
    Ok(output)
}
