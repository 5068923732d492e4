//! mcpsse core - JSON-RPC 2.0 client transport over HTTP and Server-Sent Events.
//!
//! The server pushes messages over one long-lived `GET` event stream and the
//! client sends messages with `POST` requests to an endpoint the server
//! announces at the start of that stream. This crate turns that pair of HTTP
//! interactions into two in-process channels of [`JsonRpcMessage`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpsse_core::{sse_client, JsonRpcMessage, SessionConfig, SseServerParameters};
//!
//! #[tokio::main]
//! async fn main() -> mcpsse_core::Result<()> {
//!     let params = SseServerParameters::new("http://localhost:8000/sse");
//!
//!     sse_client(params, SessionConfig::default(), |mut inbound, outbound| async move {
//!         // Wait for the server to say something, then ping it.
//!         if let Some(message) = inbound.recv().await {
//!             println!("server: {}", message.describe());
//!         }
//!         let _ = outbound.send(JsonRpcMessage::request(1, "ping", None)).await;
//!     })
//!     .await
//! }
//! ```

pub mod cancel;
pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod network;
pub mod transport;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use channel::{rendezvous, ChannelClosed, EnvelopeReceiver, EnvelopeSender, StreamPair};
pub use config::{SessionConfig, SseServerParameters, TransportConfig};
pub use error::{ParseError, Result, TransportError};
pub use message::{
    JsonRpcError, JsonRpcMessage, MessageKind, Notification, Outcome, Request, RequestId,
    Response, JSONRPC_VERSION,
};
pub use network::{HttpClient, HttpPoster, SseConnector};
pub use transport::{sse_client, ReaderState, SessionState, TransportSession};
