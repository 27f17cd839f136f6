use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value as Json;

use crate::errors::TransportError;
use crate::ids::IriId;

/// Decoded message stream of one push channel.
pub type PushStream = Pin<Box<dyn Stream<Item = Result<Json, TransportError>> + Send>>;

/// What a server-side search query matches against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    Actor,
    Emoji,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Emoji => "emoji",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server session: raw document retrieval and search.
///
/// Implementations own authentication; callers only ever see documents. The
/// session also parameterizes push-channel URLs because it holds the auth
/// token those URLs carry.
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch the raw JSON-LD document for an object identifier.
    async fn fetch_object(&self, id: &IriId) -> Result<Json, TransportError>;

    /// Fetch an arbitrary document URL, used for context resolution.
    async fn fetch_document(&self, url: &str) -> Result<Json, TransportError>;

    /// Server-side search returning raw result objects.
    async fn search(&self, kind: SearchKind, query: &str) -> Result<Vec<Json>, TransportError>;

    /// Push-channel URL for a collection, carrying whatever authorization
    /// the channel needs.
    fn push_url(&self, collection: &IriId) -> String;
}

/// Long-lived server-to-client message channel transport.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the channel at `url`, yielding one decoded JSON payload per
    /// pushed message until the peer closes the stream.
    async fn open(&self, url: &str) -> Result<PushStream, TransportError>;
}
