//! HTTP+SSE client transport.
//!
//! A session runs two workers over one HTTP client:
//! - `SseReader` holds the GET event stream open, learns the POST endpoint
//!   from the handshake and forwards events to the inbound channel
//! - `MessageSender` POSTs envelopes from the outbound channel to that
//!   endpoint
//!
//! `TransportSession` owns both and enforces the shutdown order.

pub mod endpoint;
pub mod reader;
pub mod sender;
pub mod session;
pub mod sse;

pub use endpoint::EndpointSlot;
pub use reader::{ReaderState, SseReader};
pub use sender::{Delivery, MessageSender, SenderStats};
pub use session::{sse_client, SessionState, TransportSession};
