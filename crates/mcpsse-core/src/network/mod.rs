//! Network seams for the transport.
//!
//! The reader only needs "open an event stream" and the sender only needs
//! "POST this JSON". Both are traits so the workers can be driven by
//! in-memory fakes in tests; `HttpClient` implements both on top of reqwest.

mod client;

pub use client::HttpClient;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

/// Raw body chunks of an event stream, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opens the long-lived GET that carries server-to-client events.
#[async_trait]
pub trait SseConnector: Send + Sync + 'static {
    /// Issue the GET and return the body once the server has answered with
    /// a success status. Network failures and error statuses are
    /// `TransportError::Connection`.
    async fn connect(&self, url: &Url) -> Result<ByteStream>;
}

/// Delivers one serialized envelope to the server.
#[async_trait]
pub trait HttpPoster: Send + Sync + 'static {
    /// POST `body` as `application/json` and return the (2xx) status code.
    async fn post_json(&self, url: &Url, body: String) -> Result<u16>;
}
