// Observer interest tracking and per-connection sessions

mod index;
pub mod protocol;
mod session;
mod topic;

pub use index::{ConnectionId, InterestIndex};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use session::ConnectionSession;
pub use topic::{Topic, TopicParseError};
