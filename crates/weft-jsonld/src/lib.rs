pub mod compact;
pub mod context;
pub mod error;
pub mod expand;
pub mod flatten;
pub mod loader;
pub mod processor;

pub use compact::compact_node;
pub use context::{Context, TermDef, MAX_REMOTE_CONTEXTS};
pub use error::JsonLdError;
pub use expand::expand_member;
pub use flatten::flatten;
pub use loader::{DocumentCache, DocumentLoader, StaticLoader};
pub use processor::Processor;
