use serde_json::Value as Json;

use weft_core::ids::IriId;
use weft_core::node::{Node, Value, Values};

use crate::context::Context;

/// Compact one expanded graph member into a typed node. Property IRIs map
/// back to context terms where one exists; node identifiers stay full IRIs
/// so they keep working as cache keys. Every property carries the array
/// arrangement, which keeps refetched nodes congruent with cached ones.
pub fn compact_node(expanded: &Json, ctx: &Context) -> Node {
    let mut node = match expanded.get("@id").and_then(Json::as_str) {
        Some(id) => Node::new(id),
        None => Node::anonymous(),
    };

    let Some(obj) = expanded.as_object() else {
        return node;
    };

    for (iri, value) in obj {
        match iri.as_str() {
            "@id" => {}
            "@type" => {
                let name = ctx
                    .term_for("@type")
                    .map_or("@type", |(name, _)| name)
                    .to_owned();
                let types: Vec<Value> = elements_of(value)
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|t| Value::String(ctx.compact_type(t)))
                    .collect();
                node.insert(name, Values::Many(types));
            }
            _ => {
                let name = ctx
                    .term_for(iri)
                    .map_or(iri.as_str(), |(name, _)| name)
                    .to_owned();
                let mut out = Vec::new();
                for element in elements_of(value) {
                    compact_into(element, ctx, &mut out);
                }
                node.insert(name, Values::Many(out));
            }
        }
    }
    node
}

fn compact_into(element: &Json, ctx: &Context, out: &mut Vec<Value>) {
    // list wrappers dissolve into the surrounding sequence
    if let Some(list) = element.get("@list") {
        for item in elements_of(list) {
            compact_into(item, ctx, out);
        }
        return;
    }
    if let Some(value) = compact_value(element, ctx) {
        out.push(value);
    }
}

fn compact_value(element: &Json, ctx: &Context) -> Option<Value> {
    if let Some(literal) = element.get("@value") {
        return match literal {
            Json::String(s) => Some(Value::String(s.clone())),
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::Number(n) => Some(Value::Number(n.clone())),
            _ => None,
        };
    }
    if let Some(obj) = element.as_object() {
        if obj.len() == 1 {
            if let Some(id) = obj.get("@id").and_then(Json::as_str) {
                return Some(Value::Ref(IriId::new(id)));
            }
        }
        return Some(Value::Node(Box::new(compact_node(element, ctx))));
    }
    // expanded form only carries objects; tolerate a stray scalar
    match element {
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => Some(Value::Number(n.clone())),
        _ => None,
    }
}

fn elements_of(value: &Json) -> &[Json] {
    match value {
        Json::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}
