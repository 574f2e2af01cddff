//! Punch server protocol: the binary messages, the client session and the
//! listener for relayed connect requests.

pub mod listener;
pub mod message;
pub mod session;

pub use listener::NotificationListener;
pub use message::{PeerInfo, PeerReply, Request};
pub use session::{PunchSession, SessionConfig};

pub const DEFAULT_SERVER_PORT: u16 = 9988;
