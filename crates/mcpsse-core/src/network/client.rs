//! HTTP client with a bounded connection pool.
//!
//! Wraps reqwest with:
//! - A small keep-alive pool (idle connections per host)
//! - A hard cap on concurrently open requests
//! - No request timeout, since the event stream is expected to stay open

use super::{ByteStream, HttpPoster, SseConnector};
use crate::config::{SessionConfig, TransportConfig};
use crate::{Result, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

/// HTTP client shared by the reader and sender of one session.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    /// One permit per open request; the event stream holds its permit for
    /// as long as the body is being read.
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl HttpClient {
    /// Create a client with default pool settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&SessionConfig::default())
    }

    /// Create a client from session settings.
    ///
    /// `max_connections` below `POOL_MIN_CONNECTIONS` is raised to it, even
    /// when the config was built without `with_max_connections`.
    pub fn with_config(config: &SessionConfig) -> Result<Self> {
        let max_connections = config
            .max_connections
            .max(TransportConfig::POOL_MIN_CONNECTIONS);

        let client = Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| TransportError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Number of requests that could start right now without waiting.
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    async fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Http("Connection pool closed".to_string()))
    }
}

#[async_trait]
impl SseConnector for HttpClient {
    async fn connect(&self, url: &Url) -> Result<ByteStream> {
        let permit = self.acquire().await?;

        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, TransportConfig::EVENT_STREAM_CONTENT_TYPE)
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::connection(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connection {
                message: format!("GET {} returned {}", url, status),
                status: Some(status.as_u16()),
            });
        }

        debug!("SSE stream open: {} ({})", url, status);

        let body = response.bytes_stream().map(move |chunk| {
            // Keep the connection slot for the lifetime of the body.
            let _permit = &permit;
            chunk.map_err(|e| TransportError::connection(format!("SSE stream error: {}", e)))
        });
        Ok(body.boxed())
    }
}

#[async_trait]
impl HttpPoster for HttpClient {
    async fn post_json(&self, url: &Url, body: String) -> Result<u16> {
        let _permit = self.acquire().await?;

        let response = self
            .client
            .post(url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::connection(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!("POST {} returned {}: {}", url, status, text);

        if !status.is_success() {
            return Err(TransportError::Connection {
                message: format!("POST {} returned {}: {}", url, status, text),
                status: Some(status.as_u16()),
            });
        }

        Ok(status.as_u16())
    }
}
