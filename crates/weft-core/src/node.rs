use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;

use crate::ids::{IriId, BLANK_PREFIX};

/// Keys carrying this prefix are graph metadata, never object properties.
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with('@')
}

/// One property value: a scalar, a reference to another node's identifier,
/// or an embedded node.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Ref(IriId),
    Node(Box<Node>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&IriId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Equality under the diffing rule: exact match, except that two blank
    /// identifiers (string or reference form) are interchangeable, and
    /// embedded nodes compare recursively under the same rule.
    pub fn congruent(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => {
                a == b || (a.starts_with(BLANK_PREFIX) && b.starts_with(BLANK_PREFIX))
            }
            (Self::Ref(a), Self::Ref(b)) => a.equivalent(b),
            (Self::Node(a), Self::Node(b)) => a.congruent(b),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<IriId> for Value {
    fn from(id: IriId) -> Self {
        Self::Ref(id)
    }
}

/// Value arrangement of one property. Whether a property holds a scalar or a
/// sequence is significant for diffing, so it is kept explicit rather than
/// normalized away.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    One(Value),
    Many(Vec<Value>),
}

impl Values {
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        }
    }

    fn congruent(&self, other: &Values) -> bool {
        match (self, other) {
            (Self::One(a), Self::One(b)) => a.congruent(b),
            (Self::Many(a), Self::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.congruent(y))
            }
            _ => false,
        }
    }
}

/// Flat record of one entity's known properties.
///
/// Within the entity cache every stored node is keyed by its identifier and
/// is the canonical representation for it; embedded sub-objects only appear
/// as values when they carry no identifier of their own.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Node {
    pub id: Option<IriId>,
    props: BTreeMap<String, Values>,
}

impl Node {
    pub fn new(id: impl Into<IriId>) -> Self {
        Self { id: Some(id.into()), props: BTreeMap::new() }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Ordered values for `name`; empty if absent, a single scalar lifted
    /// into a one-element slice.
    pub fn get(&self, name: &str) -> &[Value] {
        self.props.get(name).map(Values::as_slice).unwrap_or(&[])
    }

    /// First value for `name`, if any.
    pub fn take(&self, name: &str) -> Option<&Value> {
        self.get(name).first()
    }

    /// First string-ish value for `name` (references read as their IRI), or
    /// the default.
    pub fn take_str<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.take(name) {
            Some(Value::String(s)) => s,
            Some(Value::Ref(id)) => id.as_str(),
            _ => default,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn contains(&self, name: &str, value: &Value) -> bool {
        self.get(name).contains(value)
    }

    pub fn contains_any(&self, name: &str, values: &[Value]) -> bool {
        values.iter().any(|v| self.contains(name, v))
    }

    /// Append `value`: an absent property becomes single-valued, a
    /// single-valued property becomes a two-element sequence, a sequence
    /// grows by one.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.props.remove(name) {
            None => {
                self.props.insert(name.to_owned(), Values::One(value));
            }
            Some(Values::One(prev)) => {
                self.props.insert(name.to_owned(), Values::Many(vec![prev, value]));
            }
            Some(Values::Many(mut vs)) => {
                vs.push(value);
                self.props.insert(name.to_owned(), Values::Many(vs));
            }
        }
    }

    /// Remove the property entirely; no-op if absent.
    pub fn clear(&mut self, name: &str) {
        self.props.remove(name);
    }

    /// Replace the property with an exact arrangement. Used by ingestion
    /// paths that already know whether a property is scalar or sequence.
    pub fn insert(&mut self, name: impl Into<String>, values: Values) {
        self.props.insert(name.into(), values);
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Values)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Structural equality for diffing: identifiers equivalent (blanks
    /// interchangeable), same property-name set, and per property the same
    /// arrangement with pairwise-congruent values.
    pub fn congruent(&self, other: &Node) -> bool {
        let ids_match = match (&self.id, &other.id) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equivalent(b),
            _ => false,
        };
        ids_match
            && self.props.len() == other.props.len()
            && self
                .props
                .iter()
                .all(|(name, values)| other.props.get(name).is_some_and(|theirs| values.congruent(theirs)))
    }

    /// Compacted-JSON shape of this node. Reference values serialize as
    /// single-key `{"id": ...}` objects so they survive a round-trip through
    /// [`Node::from_json`].
    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        if let Some(id) = &self.id {
            map.insert("id".to_owned(), Json::String(id.as_str().to_owned()));
        }
        for (name, values) in &self.props {
            let json = match values {
                Values::One(v) => value_to_json(v),
                Values::Many(vs) => Json::Array(vs.iter().map(value_to_json).collect()),
            };
            map.insert(name.clone(), json);
        }
        Json::Object(map)
    }

    /// Parse a compacted-JSON object into a node. Returns `None` for
    /// non-objects. `null` property values and array elements are dropped,
    /// matching their no-value meaning in the wire format.
    pub fn from_json(value: &Json) -> Option<Node> {
        let map = value.as_object()?;
        let mut node = Node::anonymous();
        for (key, value) in map {
            if key == "id" || key == "@id" {
                if let Some(id) = value.as_str() {
                    node.id = Some(IriId::new(id));
                    continue;
                }
            }
            match value {
                Json::Null => {}
                Json::Array(items) => {
                    let vs: Vec<Value> = items.iter().filter_map(value_from_json).collect();
                    node.insert(key.clone(), Values::Many(vs));
                }
                other => {
                    if let Some(v) = value_from_json(other) {
                        node.insert(key.clone(), Values::One(v));
                    }
                }
            }
        }
        Some(node)
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => Json::Number(n.clone()),
        Value::String(s) => Json::String(s.clone()),
        Value::Ref(id) => {
            let mut map = serde_json::Map::new();
            map.insert("id".to_owned(), Json::String(id.as_str().to_owned()));
            Json::Object(map)
        }
        Value::Node(node) => node.to_json(),
    }
}

fn value_from_json(value: &Json) -> Option<Value> {
    match value {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => Some(Value::Number(n.clone())),
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(id) = map.get("id").or_else(|| map.get("@id")).and_then(Json::as_str) {
                    return Some(Value::Ref(IriId::new(id)));
                }
            }
            Node::from_json(value).map(|n| Value::Node(Box::new(n)))
        }
        // nested arrays and nulls have no value-level representation
        Json::Null | Json::Array(_) => None,
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Json::deserialize(deserializer)?;
        Node::from_json(&value).ok_or_else(|| D::Error::custom("expected a JSON object"))
    }
}
