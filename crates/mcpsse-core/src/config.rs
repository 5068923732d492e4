//! Centralized configuration for the SSE transport.
//!
//! Constants live on `TransportConfig`; per-session overrides go through
//! `SessionConfig`. `SseServerParameters` is the value a configuration loader
//! hands over when it selects the SSE transport.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport-level constants.
pub struct TransportConfig;

impl TransportConfig {
    pub const DEFAULT_SSE_ENDPOINT: &'static str = "http://localhost:8000/sse";
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
    pub const POOL_MAX_IDLE_PER_HOST: usize = 5;
    pub const POOL_MAX_CONNECTIONS: usize = 10;
    /// Floor for `max_connections`: the event stream holds one slot for its
    /// whole life, POSTs need another.
    pub const POOL_MIN_CONNECTIONS: usize = 2;
    pub const USER_AGENT: &'static str = concat!("mcpsse/", env!("CARGO_PKG_VERSION"));
    /// Longest SSE line kept; longer lines are dropped.
    pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;
    pub const EVENT_STREAM_CONTENT_TYPE: &'static str = "text/event-stream";
}

/// Tunables for a single transport session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed wait between a dropped SSE connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Keep-alive connections retained per host.
    pub max_idle_per_host: usize,
    /// Upper bound on concurrently open requests (the SSE stream counts as one).
    pub max_connections: usize,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: TransportConfig::RECONNECT_DELAY,
            max_idle_per_host: TransportConfig::POOL_MAX_IDLE_PER_HOST,
            max_connections: TransportConfig::POOL_MAX_CONNECTIONS,
            user_agent: TransportConfig::USER_AGENT.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the number of idle keep-alive connections per host.
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Set the concurrent connection limit. Clamped to at least
    /// `POOL_MIN_CONNECTIONS` so the SSE stream never starves outbound POSTs.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(TransportConfig::POOL_MIN_CONNECTIONS);
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Connection parameters for an SSE server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseServerParameters {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    TransportConfig::DEFAULT_SSE_ENDPOINT.to_string()
}

impl Default for SseServerParameters {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

impl SseServerParameters {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// The SSE URL to GET.
    pub fn url(&self) -> &str {
        &self.endpoint
    }
}
