use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as Json;
use tracing::debug;

use weft_core::flight::{Flight, FlightMap};
use weft_core::TransportError;

/// Resolves a URL to a JSON-LD document body. Production implementations sit
/// on the HTTP session; tests use [`StaticLoader`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Json, TransportError>;
}

/// Remote document cache: memoizes resolved documents by URL and coalesces
/// concurrent loads of the same URL into one in-flight request. Failures are
/// not cached, so a later load retries.
pub struct DocumentCache {
    inner: Arc<dyn DocumentLoader>,
    docs: Mutex<HashMap<String, Json>>,
    flights: FlightMap<String, Result<Json, TransportError>>,
}

impl DocumentCache {
    pub fn new(inner: Arc<dyn DocumentLoader>) -> Self {
        Self {
            inner,
            docs: Mutex::new(HashMap::new()),
            flights: FlightMap::new(),
        }
    }

    /// Seed a document without going to the network. Used for well-known
    /// context documents and in tests.
    pub fn preload(&self, url: impl Into<String>, doc: Json) {
        self.docs.lock().insert(url.into(), doc);
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.docs.lock().contains_key(url)
    }

    pub async fn load(&self, url: &str) -> Result<Json, TransportError> {
        if let Some(doc) = self.docs.lock().get(url) {
            return Ok(doc.clone());
        }
        match self.flights.begin(url.to_owned()) {
            Flight::Leader(guard) => {
                debug!(url, "loading remote document");
                let result = self.inner.load(url).await;
                if let Ok(doc) = &result {
                    self.docs.lock().insert(url.to_owned(), doc.clone());
                }
                guard.settle(&result);
                result
            }
            Flight::Follower(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TransportError::Network(format!("load of {url} abandoned")))),
        }
    }
}

/// Fixed in-memory loader for tests and offline use.
pub struct StaticLoader {
    docs: Mutex<HashMap<String, Json>>,
    loads: std::sync::atomic::AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            loads: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Make every load suspend first, so tests can observe coalescing.
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self { delay: Some(delay), ..Self::new() }
    }

    pub fn insert(&self, url: impl Into<String>, doc: Json) {
        self.docs.lock().insert(url.into(), doc);
    }

    /// Number of loads that reached this loader (cache misses).
    pub fn load_count(&self) -> usize {
        self.loads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for StaticLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self, url: &str) -> Result<Json, TransportError> {
        self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.docs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::from_status(404, url))
    }
}
