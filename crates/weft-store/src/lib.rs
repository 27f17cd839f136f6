//! Client-side entity store for a federated JSON-LD object graph.
//!
//! [`EntityStore`] resolves identifiers to flat [`weft_core::node::Node`]
//! records through the shared document pipeline, caches them, coalesces
//! concurrent fetches, diffs rewrites before notifying change handlers, and
//! keeps per-collection push channels open for server-sent updates.

pub mod channels;
pub mod error;
pub mod registry;
pub mod store;

pub use channels::{CollectionListener, ListenToken, ListenerId};
pub use error::StoreError;
pub use registry::{ChangeHandler, HandlerId, RegistrationToken};
pub use store::{store_state_id, EntityStore, StoreConfig, ACTIVITYSTREAMS_CONTEXT};
