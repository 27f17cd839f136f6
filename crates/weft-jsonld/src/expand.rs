use serde_json::{json, Map, Value as Json};

use weft_core::node::is_metadata_key;

use crate::context::{Context, TermDef};
use crate::error::JsonLdError;

/// Expand one graph member: property keys become IRIs, every value becomes an
/// array of `@value`/`@id`/node objects, list containers stay explicit.
/// Keys the context cannot map are dropped, as the standard transform does.
pub fn expand_member(member: &Json, ctx: &Context) -> Result<Json, JsonLdError> {
    let obj = member
        .as_object()
        .ok_or_else(|| JsonLdError::MalformedDocument(format!("graph member is not an object: {member}")))?;
    Ok(Json::Object(expand_object(obj, ctx)))
}

fn expand_object(obj: &Map<String, Json>, ctx: &Context) -> Map<String, Json> {
    let mut out = Map::new();
    for (key, value) in obj {
        if key == "@context" {
            continue;
        }
        let Some((iri, def)) = ctx.expand_key(key) else {
            continue;
        };
        match iri.as_str() {
            "@id" => {
                if let Some(id) = value.as_str() {
                    out.insert("@id".to_owned(), Json::String(ctx.expand_iri(id)));
                }
            }
            "@type" => {
                let types: Vec<Json> = as_elements(value)
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|t| Json::String(ctx.expand_type(t)))
                    .collect();
                if !types.is_empty() {
                    out.insert("@type".to_owned(), Json::Array(types));
                }
            }
            "@list" => {
                // list at member level only appears inside value positions;
                // reaching it here means the document was malformed, keep it
                out.insert(key.clone(), value.clone());
            }
            _ if is_metadata_key(&iri) => {}
            _ => {
                let expanded = expand_values(value, &def, ctx);
                out.insert(iri, expanded);
            }
        }
    }
    out
}

/// Expand one property's value(s) into the array form.
fn expand_values(value: &Json, def: &TermDef, ctx: &Context) -> Json {
    // a literal list object keeps its wrapper; elements are expanded in place
    if let Some(list) = value.get("@list") {
        return json!([{ "@list": expand_elements(list, def, ctx) }]);
    }
    let elements = expand_elements(value, def, ctx);
    let already_list = elements.len() == 1 && elements[0].get("@list").is_some();
    if def.list_container && !already_list {
        return json!([{ "@list": elements }]);
    }
    Json::Array(elements)
}

fn expand_elements(value: &Json, def: &TermDef, ctx: &Context) -> Vec<Json> {
    let mut out = Vec::new();
    for element in as_elements(value) {
        match element {
            Json::Null => {}
            Json::Array(inner) => {
                // nested arrays flatten into the same sequence
                for v in inner {
                    out.extend(expand_elements(v, def, ctx));
                }
            }
            Json::Object(obj) => {
                if obj.contains_key("@value") {
                    out.push(element.clone());
                } else if let Some(list) = obj.get("@list") {
                    out.push(json!({ "@list": expand_elements(list, def, ctx) }));
                } else {
                    out.push(Json::Object(expand_object(obj, ctx)));
                }
            }
            Json::String(s) => {
                if def.id_typed {
                    out.push(json!({ "@id": ctx.expand_iri(s) }));
                } else {
                    out.push(json!({ "@value": s }));
                }
            }
            Json::Bool(_) | Json::Number(_) => {
                out.push(json!({ "@value": element }));
            }
        }
    }
    out
}

fn as_elements(value: &Json) -> &[Json] {
    match value {
        Json::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}
