use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use weft_core::ids::IriId;

/// Delay before reopening a push channel after it ends or fails to open.
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Callback invoked with the processed identifier of each pushed message.
pub type CollectionListener = Arc<dyn Fn(&IriId) + Send + Sync>;

/// Opaque handle to one collection listener.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ListenerId(String);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(format!("lsn_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt for one collection subscription; hand it back to
/// `EntityStore::unlisten` to detach.
pub struct ListenToken {
    pub(crate) collection: IriId,
    pub(crate) id: ListenerId,
}

impl ListenToken {
    /// The collection this token subscribes to.
    pub fn collection(&self) -> &IriId {
        &self.collection
    }
}

/// One live push channel: its listeners and the dispatcher task driving it.
/// The task is aborted exactly once, on the empty-listener transition.
pub(crate) struct Channel {
    pub(crate) listeners: Vec<(ListenerId, CollectionListener)>,
    pub(crate) task: JoinHandle<()>,
}
