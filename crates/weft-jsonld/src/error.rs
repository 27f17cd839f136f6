use weft_core::TransportError;

/// Transform-side failures: context resolution and document shape problems.
#[derive(Clone, Debug, thiserror::Error)]
pub enum JsonLdError {
    #[error("document load failed: {0}")]
    Loader(#[from] TransportError),
    #[error("invalid context from {url}: {detail}")]
    InvalidContext { url: String, detail: String },
    #[error("context nesting exceeds {0} remote documents")]
    ContextTooDeep(usize),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}
