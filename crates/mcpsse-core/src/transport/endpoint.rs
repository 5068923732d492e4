//! The session endpoint slot shared between reader and sender.

use crate::{Result, TransportError};
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Holds the POST path announced by the server, if any.
///
/// The reader is the only writer; the sender takes snapshots. The value is
/// replaced as a whole `Arc<str>`, so a snapshot is always either the old or
/// the new path.
#[derive(Debug, Clone, Default)]
pub struct EndpointSlot {
    inner: Arc<RwLock<Option<Arc<str>>>>,
}

impl EndpointSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<Arc<str>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(path.into());
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Snapshot of the current path.
    pub fn get(&self) -> Option<Arc<str>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// `scheme://host[:port]/` of the SSE URL, the base POST targets resolve against.
pub fn base_url(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base
}

/// Resolve an announced endpoint against the base URL.
///
/// Absolute paths replace the base path and relative ones are appended to it.
/// The result must stay on the base's scheme, host and port; an endpoint such
/// as `//other.host/x` or `http://other.host/x` is rejected.
pub fn resolve_endpoint(base: &Url, endpoint: &str) -> Result<Url> {
    let resolved = base
        .join(endpoint)
        .map_err(|e| TransportError::invalid_url(endpoint, e))?;
    if resolved.origin() != base.origin() {
        return Err(TransportError::InvalidUrl {
            url: endpoint.to_string(),
            message: format!(
                "endpoint resolves to {}, outside {}",
                resolved.origin().ascii_serialization(),
                base.origin().ascii_serialization()
            ),
        });
    }
    Ok(resolved)
}
