use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as Json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use weft_core::errors::TransportError;
use weft_core::ids::IriId;
use weft_core::session::{PushStream, PushTransport, SearchKind, Session};

/// Scripted response for one object identifier.
#[derive(Clone)]
pub enum MockObject {
    Document(Json),
    Error(TransportError),
    Delayed(Duration, Json),
}

/// In-memory session for tests: scripted objects, context documents, and
/// search results, with fetch counting.
#[derive(Default)]
pub struct MockSession {
    objects: Mutex<HashMap<String, MockObject>>,
    documents: Mutex<HashMap<String, MockObject>>,
    search_results: Mutex<Vec<Json>>,
    fetches: AtomicUsize,
    token: Option<String>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()), ..Self::default() }
    }

    pub fn insert_object(&self, id: impl Into<String>, doc: Json) {
        self.objects.lock().insert(id.into(), MockObject::Document(doc));
    }

    pub fn fail_object(&self, id: impl Into<String>, error: TransportError) {
        self.objects.lock().insert(id.into(), MockObject::Error(error));
    }

    pub fn delay_object(&self, id: impl Into<String>, delay: Duration, doc: Json) {
        self.objects.lock().insert(id.into(), MockObject::Delayed(delay, doc));
    }

    pub fn insert_document(&self, url: impl Into<String>, doc: Json) {
        self.documents.lock().insert(url.into(), MockObject::Document(doc));
    }

    pub fn delay_document(&self, url: impl Into<String>, delay: Duration, doc: Json) {
        self.documents.lock().insert(url.into(), MockObject::Delayed(delay, doc));
    }

    pub fn set_search_results(&self, results: Vec<Json>) {
        *self.search_results.lock() = results;
    }

    /// How many object fetches have hit this session.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn fetch_object(&self, id: &IriId) -> Result<Json, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.objects.lock().get(id.as_str()).cloned();
        match scripted {
            Some(MockObject::Document(doc)) => Ok(doc),
            Some(MockObject::Error(error)) => Err(error),
            Some(MockObject::Delayed(delay, doc)) => {
                tokio::time::sleep(delay).await;
                Ok(doc)
            }
            None => Err(TransportError::from_status(404, id.as_str())),
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<Json, TransportError> {
        let scripted = self.documents.lock().get(url).cloned();
        match scripted {
            Some(MockObject::Document(doc)) => Ok(doc),
            Some(MockObject::Error(error)) => Err(error),
            Some(MockObject::Delayed(delay, doc)) => {
                tokio::time::sleep(delay).await;
                Ok(doc)
            }
            None => Err(TransportError::from_status(404, url)),
        }
    }

    async fn search(&self, _kind: SearchKind, _query: &str) -> Result<Vec<Json>, TransportError> {
        Ok(self.search_results.lock().clone())
    }

    fn push_url(&self, collection: &IriId) -> String {
        match &self.token {
            Some(token) => format!("{collection}?authorization={token}"),
            None => collection.to_string(),
        }
    }
}

type PushSender = tokio::sync::mpsc::UnboundedSender<Result<Json, TransportError>>;

/// Push transport with one scripted channel per URL. `open` hands out a
/// stream fed by `emit`; `close` ends it the way a server hangup would.
#[derive(Default)]
pub struct MockPush {
    senders: Mutex<HashMap<String, PushSender>>,
    opens: AtomicUsize,
    fail_opens: AtomicUsize,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a channel was opened, reconnects included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make the next `n` opens fail with a network error.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Deliver one payload on the channel opened for `url`.
    pub fn emit(&self, url: &str, payload: Json) -> bool {
        match self.senders.lock().get(url) {
            Some(tx) => tx.send(Ok(payload)).is_ok(),
            None => false,
        }
    }

    /// Deliver one error item on the channel opened for `url`.
    pub fn emit_error(&self, url: &str, error: TransportError) -> bool {
        match self.senders.lock().get(url) {
            Some(tx) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// End the stream for `url` from the server side.
    pub fn close(&self, url: &str) {
        self.senders.lock().remove(url);
    }

    /// Whether the consumer end of `url`'s channel is still being read.
    pub fn is_open(&self, url: &str) -> bool {
        self.senders
            .lock()
            .get(url)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl PushTransport for MockPush {
    async fn open(&self, url: &str) -> Result<PushStream, TransportError> {
        if self.fail_opens.load(Ordering::SeqCst) > 0 {
            self.fail_opens.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Network(format!("scripted failure for {url}")));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.senders.lock().insert(url.to_owned(), tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
