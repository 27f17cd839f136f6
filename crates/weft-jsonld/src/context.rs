use std::collections::{HashMap, VecDeque};

use serde_json::Value as Json;

use crate::error::JsonLdError;
use crate::loader::DocumentCache;

/// Remote context documents one resolution may pull in before giving up.
pub const MAX_REMOTE_CONTEXTS: usize = 8;

/// One term definition from a resolved context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermDef {
    pub iri: String,
    /// `"@type": "@id"`: string values of this term are references.
    pub id_typed: bool,
    /// `"@container": "@list"`: values form an ordered list.
    pub list_container: bool,
}

impl TermDef {
    fn plain(iri: String) -> Self {
        Self { iri, ..Self::default() }
    }
}

/// A resolved JSON-LD context: the term table expansion and compaction work
/// against. Built from inline definitions, arrays, and remote context URLs
/// (loaded through the document cache).
#[derive(Clone, Debug, Default)]
pub struct Context {
    terms: HashMap<String, TermDef>,
    vocab: Option<String>,
}

impl Context {
    pub async fn resolve(value: &Json, documents: &DocumentCache) -> Result<Context, JsonLdError> {
        let mut ctx = Context::default();
        let mut queue = VecDeque::from([value.clone()]);
        let mut remote_loads = 0usize;

        while let Some(entry) = queue.pop_front() {
            match entry {
                // explicit null resets the active context
                Json::Null => {
                    ctx.terms.clear();
                    ctx.vocab = None;
                }
                Json::String(url) => {
                    remote_loads += 1;
                    if remote_loads > MAX_REMOTE_CONTEXTS {
                        return Err(JsonLdError::ContextTooDeep(MAX_REMOTE_CONTEXTS));
                    }
                    let doc = documents.load(&url).await?;
                    tracing::debug!(%url, "resolved remote context");
                    let inner = doc.get("@context").cloned().ok_or_else(|| {
                        JsonLdError::InvalidContext {
                            url: url.clone(),
                            detail: "missing @context member".into(),
                        }
                    })?;
                    queue.push_front(inner);
                }
                Json::Array(items) => {
                    for item in items.into_iter().rev() {
                        queue.push_front(item);
                    }
                }
                Json::Object(defs) => ctx.merge_definitions(&defs),
                other => {
                    return Err(JsonLdError::InvalidContext {
                        url: "inline".into(),
                        detail: format!("unexpected context entry: {other}"),
                    })
                }
            }
        }
        Ok(ctx)
    }

    fn merge_definitions(&mut self, defs: &serde_json::Map<String, Json>) {
        for (term, def) in defs {
            if term == "@vocab" {
                self.vocab = def.as_str().map(str::to_owned);
                continue;
            }
            if term.starts_with('@') {
                // @base, @language, @version and friends carry no term
                continue;
            }
            match def {
                Json::Null => {
                    self.terms.remove(term);
                }
                Json::String(iri) => {
                    let iri = self.expand_iri(iri);
                    self.terms.insert(term.clone(), TermDef::plain(iri));
                }
                Json::Object(body) => {
                    let iri = match body.get("@id").and_then(Json::as_str) {
                        Some(id) => self.expand_iri(id),
                        // container-only definitions fall back to vocab mapping
                        None => match &self.vocab {
                            Some(vocab) => format!("{vocab}{term}"),
                            None => continue,
                        },
                    };
                    let id_typed = body.get("@type").and_then(Json::as_str) == Some("@id");
                    let list_container = match body.get("@container") {
                        Some(Json::String(c)) => c == "@list",
                        Some(Json::Array(cs)) => cs.iter().any(|c| c.as_str() == Some("@list")),
                        _ => false,
                    };
                    self.terms.insert(term.clone(), TermDef { iri, id_typed, list_container });
                }
                _ => {}
            }
        }
    }

    /// Expand a property key. `None` means the key maps to nothing under this
    /// context and its property is dropped by expansion.
    pub fn expand_key(&self, key: &str) -> Option<(String, TermDef)> {
        if let Some(def) = self.terms.get(key) {
            return Some((def.iri.clone(), def.clone()));
        }
        if key.starts_with('@') {
            return Some((key.to_owned(), TermDef::plain(key.to_owned())));
        }
        if key.contains(':') {
            let iri = self.expand_iri(key);
            return Some((iri.clone(), TermDef::plain(iri)));
        }
        self.vocab
            .as_ref()
            .map(|vocab| format!("{vocab}{key}"))
            .map(|iri| (iri.clone(), TermDef::plain(iri)))
    }

    /// Expand an IRI-position value: keywords and absolute/blank IRIs pass
    /// through, compact IRIs expand via their prefix term, bare names fall
    /// back to the vocabulary mapping.
    pub fn expand_iri(&self, value: &str) -> String {
        if value.starts_with('@') {
            return value.to_owned();
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if let Some(def) = self.terms.get(prefix) {
                return format!("{}{suffix}", def.iri);
            }
            return value.to_owned();
        }
        match &self.vocab {
            Some(vocab) => format!("{vocab}{value}"),
            None => value.to_owned(),
        }
    }

    /// Expand a type-position value, where bare terms resolve through the
    /// term table first (`"Note"` → its full IRI).
    pub fn expand_type(&self, value: &str) -> String {
        if let Some(def) = self.terms.get(value) {
            return def.iri.clone();
        }
        self.expand_iri(value)
    }

    /// Exact reverse lookup for compaction. Ties break toward the shortest,
    /// then lexicographically smallest, term so output is deterministic.
    pub fn term_for(&self, iri: &str) -> Option<(&str, &TermDef)> {
        self.terms
            .iter()
            .filter(|(_, def)| def.iri == iri)
            .min_by_key(|(name, _)| (name.len(), name.as_str()))
            .map(|(name, def)| (name.as_str(), def))
    }

    /// Compact a type-position IRI back to its term where one exists.
    pub fn compact_type(&self, iri: &str) -> String {
        match self.term_for(iri) {
            Some((name, _)) => name.to_owned(),
            None => iri.to_owned(),
        }
    }
}
