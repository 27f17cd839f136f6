use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker prefix for blank (anonymous, locally-scoped) identifiers.
pub const BLANK_PREFIX: &str = "_:";

/// Namespace prefix for synthetic entries that never touch the network.
pub const INTERNAL_PREFIX: &str = "weft:";

/// Identifier of a node in the federated graph.
///
/// Identifiers come off the wire, so there is no generated form. Servers mint
/// blank identifiers (`_:` prefix) when they serialize anonymous embedded
/// objects; those are interchangeable for diffing purposes (see
/// [`IriId::equivalent`]).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IriId(String);

impl IriId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Qualify a name into the reserved synthetic namespace.
    pub fn internal(name: &str) -> Self {
        Self(format!("{INTERNAL_PREFIX}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.starts_with(BLANK_PREFIX)
    }

    pub fn is_internal(&self) -> bool {
        self.0.starts_with(INTERNAL_PREFIX)
    }

    /// Identity for diffing: exact match, or both sides blank.
    pub fn equivalent(&self, other: &IriId) -> bool {
        self == other || (self.is_blank() && other.is_blank())
    }
}

impl fmt::Display for IriId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IriId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for IriId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IriId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for IriId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
