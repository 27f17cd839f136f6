pub mod errors;
pub mod flight;
pub mod ids;
pub mod node;
pub mod session;

pub use errors::TransportError;
pub use flight::{Flight, FlightGuard, FlightMap};
pub use ids::{IriId, BLANK_PREFIX, INTERNAL_PREFIX};
pub use node::{Node, Value, Values};
pub use session::{PushStream, PushTransport, SearchKind, Session};
