//! NAT behaviour discovery.
//!
//! [`classify`] runs the classic RFC 3489 test sequence against a STUN
//! server and reports a [`NatType`] plus the externally mapped endpoint.

use crate::error::{Error, Result};
use std::fmt;

pub mod classify;
mod servers;
pub mod stun;

pub use classify::{classify, classify_with_retries, Classification, ClassifierConfig};
pub use servers::{random_stun_server, STUN_SERVERS};

pub const DEFAULT_STUN_PORT: u16 = 3478;

/// How the local NAT maps and filters outbound UDP flows.
///
/// The discriminants are the values carried on the punch server wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatType {
    Blocked = 0,
    OpenInternet = 1,
    FullCone = 2,
    RestrictedNat = 3,
    RestrictedPortNat = 4,
    SymmetricNat = 5,
    Error = 6,
}

impl NatType {
    pub const ALL: [NatType; 7] = [
        NatType::Blocked,
        NatType::OpenInternet,
        NatType::FullCone,
        NatType::RestrictedNat,
        NatType::RestrictedPortNat,
        NatType::SymmetricNat,
        NatType::Error,
    ];

    /// Human readable name, stable across releases.
    pub fn describe(&self) -> &'static str {
        match self {
            NatType::Blocked => "blocked",
            NatType::OpenInternet => "open internet",
            NatType::FullCone => "full cone",
            NatType::RestrictedNat => "restricted NAT",
            NatType::RestrictedPortNat => "port-restricted cone",
            NatType::SymmetricNat => "symmetric NAT",
            NatType::Error => "error",
        }
    }

    pub fn is_symmetric(&self) -> bool {
        *self == NatType::SymmetricNat
    }

    /// Whether the NAT keeps one external mapping per local socket, so a
    /// peer that learns the mapped port can reach it.
    pub fn is_cooperative(&self) -> bool {
        matches!(
            self,
            NatType::OpenInternet
                | NatType::FullCone
                | NatType::RestrictedNat
                | NatType::RestrictedPortNat
        )
    }

    /// Classification failed and the caller may retry.
    pub fn is_failure(&self) -> bool {
        matches!(self, NatType::Blocked | NatType::Error)
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl From<NatType> for u16 {
    fn from(t: NatType) -> u16 {
        t as u16
    }
}

impl TryFrom<u16> for NatType {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        NatType::ALL
            .iter()
            .copied()
            .find(|t| *t as u16 == v)
            .ok_or_else(|| Error::protocol(format!("unknown nat type {}", v)))
    }
}
