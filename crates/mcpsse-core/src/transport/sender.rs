//! Client-to-server half: drains the outbound channel into POSTs.

use super::endpoint::{resolve_endpoint, EndpointSlot};
use crate::channel::EnvelopeReceiver;
use crate::message::JsonRpcMessage;
use crate::network::HttpPoster;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

/// Counters for outbound delivery.
#[derive(Debug, Default)]
pub struct SenderStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl SenderStats {
    /// Envelopes the server accepted.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Envelopes discarded because no endpoint was known.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Envelopes whose POST failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// What happened to one outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Posted(u16),
    NoEndpoint,
}

/// Owns the outbound channel's consuming half.
pub struct MessageSender {
    poster: Arc<dyn HttpPoster>,
    base_url: Url,
    endpoint: EndpointSlot,
    outbound: EnvelopeReceiver,
    stats: Arc<SenderStats>,
}

impl MessageSender {
    pub fn new(
        poster: Arc<dyn HttpPoster>,
        base_url: Url,
        endpoint: EndpointSlot,
        outbound: EnvelopeReceiver,
    ) -> Self {
        Self {
            poster,
            base_url,
            endpoint,
            outbound,
            stats: Arc::new(SenderStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SenderStats> {
        self.stats.clone()
    }

    /// Deliver envelopes one at a time until the outbound channel closes.
    pub async fn run(mut self) {
        while let Some(message) = self.outbound.recv().await {
            let label = message.describe();
            match self.dispatch(&message).await {
                Ok(Delivery::Posted(status)) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    debug!("Sent {} ({})", label, status);
                }
                Ok(Delivery::NoEndpoint) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("No endpoint yet, dropping outbound {}", label);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!("Error sending {}: {}", label, e);
                }
            }
        }
        debug!(
            "Message sender stopped (sent={}, dropped={}, failed={})",
            self.stats.sent(),
            self.stats.dropped(),
            self.stats.failed()
        );
    }

    /// POST one envelope to the endpoint known right now.
    pub async fn dispatch(&self, message: &JsonRpcMessage) -> Result<Delivery> {
        let Some(path) = self.endpoint.get() else {
            return Ok(Delivery::NoEndpoint);
        };

        let url = resolve_endpoint(&self.base_url, &path)?;
        let body = message.to_json()?;

        let status = self.poster.post_json(&url, body).await?;
        Ok(Delivery::Posted(status))
    }
}
