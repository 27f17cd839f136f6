use std::sync::Arc;

use serde_json::Value as Json;

use weft_core::node::Node;

use crate::compact::compact_node;
use crate::context::Context;
use crate::error::JsonLdError;
use crate::expand::expand_member;
use crate::flatten::flatten;
use crate::loader::{DocumentCache, DocumentLoader};

/// The shared document pipeline. Expansion runs under the document's own
/// `@context`; compaction runs under whatever context the caller supplies,
/// so every document read through one processor ends up in the same shape.
pub struct Processor {
    documents: DocumentCache,
}

impl Processor {
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self { documents: DocumentCache::new(loader) }
    }

    /// The context cache behind the pipeline, for preloading well-known
    /// context documents before any fetch happens.
    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    /// Flatten a raw document and expand each resulting member under the
    /// document's `@context`.
    pub async fn expand(&self, doc: &Json) -> Result<Vec<Json>, JsonLdError> {
        let members = flatten(doc);
        if members.is_empty() {
            return Err(JsonLdError::MalformedDocument(format!(
                "document has no graph members: {doc}"
            )));
        }
        let declared = doc.get("@context").cloned().unwrap_or(Json::Null);
        let ctx = Context::resolve(&declared, &self.documents).await?;
        members.iter().map(|m| expand_member(m, &ctx)).collect()
    }

    /// Compact expanded members against a caller-chosen context.
    pub async fn compact(
        &self,
        expanded: &[Json],
        context: &Json,
    ) -> Result<Vec<Node>, JsonLdError> {
        let ctx = Context::resolve(context, &self.documents).await?;
        Ok(expanded.iter().map(|m| compact_node(m, &ctx)).collect())
    }
}
