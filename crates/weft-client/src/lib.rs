pub mod mock;
pub mod session;
pub mod sse;
pub mod transport;

pub use mock::{MockObject, MockPush, MockSession};
pub use session::{HttpSession, SessionConfig};
pub use sse::{parse_records, SseRecord};
pub use transport::SseTransport;
