use weft_core::errors::TransportError;
use weft_jsonld::JsonLdError;

/// Errors surfaced by store operations. `Clone` so one settled fetch can
/// fan out to every coalesced caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("document processing error: {0}")]
    JsonLd(#[from] JsonLdError),

    /// The pipeline ran but produced nothing under the requested identifier.
    #[error("no object for {id} in the fetched document")]
    MissingObject { id: String },

    /// The coalesced fetch driving this request went away without settling.
    #[error("fetch was abandoned before settling")]
    FetchAborted,
}
