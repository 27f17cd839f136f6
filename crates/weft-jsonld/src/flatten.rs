use std::collections::{HashMap, VecDeque};

use serde_json::{json, Map, Value as Json};

use weft_core::node::is_metadata_key;

/// Pull every identified object with its own properties up to the top level,
/// leaving an `{"@id"}` stub where it sat. Works on the raw document, so both
/// `@id` and the common `id` alias count as identifiers. When the same
/// identifier occurs more than once the member seen last keeps the slot.
pub fn flatten(doc: &Json) -> Vec<Json> {
    let mut queue: VecDeque<Map<String, Json>> = VecDeque::new();
    match doc {
        Json::Object(obj) => queue.push_back(obj.clone()),
        Json::Array(items) => {
            for item in items {
                if let Json::Object(obj) = item {
                    queue.push_back(obj.clone());
                }
            }
        }
        _ => {}
    }

    let mut members: Vec<Json> = Vec::new();
    let mut slot_by_id: HashMap<String, usize> = HashMap::new();

    while let Some(mut member) = queue.pop_front() {
        for (key, value) in member.iter_mut() {
            if is_metadata_key(key) || key == "id" {
                continue;
            }
            hoist_element(value, &mut queue);
        }

        match object_id(&member).map(str::to_owned) {
            Some(id) => match slot_by_id.get(&id) {
                Some(&slot) => members[slot] = Json::Object(member),
                None => {
                    slot_by_id.insert(id, members.len());
                    members.push(Json::Object(member));
                }
            },
            None => members.push(Json::Object(member)),
        }
    }
    members
}

fn hoist_element(value: &mut Json, queue: &mut VecDeque<Map<String, Json>>) {
    match value {
        Json::Array(items) => {
            for item in items {
                hoist_element(item, queue);
            }
        }
        Json::Object(obj) => {
            // list wrappers are containers, not members; hoist what they hold
            if let Some(list) = obj.get_mut("@list") {
                hoist_element(list, queue);
                return;
            }
            match object_id(obj) {
                Some(id) if has_own_properties(obj) => {
                    let id = id.to_owned();
                    let taken = std::mem::take(obj);
                    queue.push_back(taken);
                    *value = json!({ "@id": id });
                }
                _ => {
                    // anonymous or bare reference: stays embedded, but
                    // anything identified underneath still comes up
                    for (key, nested) in obj.iter_mut() {
                        if !is_metadata_key(key) && key != "id" {
                            hoist_element(nested, queue);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn object_id(obj: &Map<String, Json>) -> Option<&str> {
    obj.get("@id")
        .or_else(|| obj.get("id"))
        .and_then(Json::as_str)
}

fn has_own_properties(obj: &Map<String, Json>) -> bool {
    obj.keys().any(|k| !is_metadata_key(k) && k != "id")
}
