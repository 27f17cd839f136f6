use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use weft_core::ids::IriId;
use weft_core::node::Node;

/// Callback invoked after a cache mutation with the previous and new nodes.
/// Runs synchronously, in registration order, outside the store lock.
pub type ChangeHandler = Arc<dyn Fn(Option<&Node>, &Node) + Send + Sync>;

/// Opaque handle to one registered change handler.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct HandlerId(String);

impl HandlerId {
    pub(crate) fn new() -> Self {
        Self(format!("hdl_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt for a batch of registered change handlers. Hand it back to
/// `EntityStore::deregister` to detach them all; deregistration drains the
/// record, so running it twice is harmless.
#[derive(Default)]
pub struct RegistrationToken {
    pub(crate) entries: Vec<(IriId, HandlerId)>,
}

impl RegistrationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations this token still tracks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
