//!NAT type detection and UDP hole punching through a rendezvous punch server.
//!
//!Two peers behind independent NATs want a direct UDP path. Neither can accept an inbound packet
//!until its own NAT has seen outbound traffic towards the other side, and what "the other side"
//!looks like depends on how each NAT maps ports.
//!
//!## How punchr works
//!Each peer first classifies its NAT with the classic RFC 3489 STUN test sequence, which also
//!reveals the external address and port the NAT maps it to. It then enrolls that record with a
//!public punch server over a long lived TCP connection and gets a numeric id back. Peers find each
//!other by id or by an opaque meta string.
//!
//!To connect, a peer looks the other up, asks the server to notify it, and punches holes:
//!
//!- when the remote NAT keeps one mapping per socket, probing the known port (and a few guesses)
//!  is enough;
//!- when either side is a symmetric NAT, hundreds of sockets send low TTL packets towards random
//!  ports. The packets open mappings in the local NAT but die before reaching the remote one, and
//!  the first socket the peer gets through to wins.
//!
//!The notified peer runs the direct strategy towards the initiator's record.
//!
//!## Feature flags
//!For convenience, the crate includes both client and server code by default.
//!
//!```toml
//!punchr = { version = "0.1", default-features=false, features=["client"]}
//!```
//!
//!- `client`: enroll and connect orchestration
//!- `server`: punch server

pub mod codec;
pub mod error;
pub mod hole;
pub mod nat;
pub mod punch;
mod socket;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};
pub use nat::NatType;
