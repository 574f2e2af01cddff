use super::stun::{ChangeRequest, Message, BIND_RESPONSE};
use super::{random_stun_server, NatType};
use crate::codec::{hex_dump, MAX_STUN_MESSAGE_LEN};
use crate::error::{Error, Result};
use crate::socket::udp_socket;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};

/// Attempts made by [`classify_with_retries`].
pub const CLASSIFY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// How long to wait for each binding response.
    pub recv_timeout: Duration,
    /// Binding request transmissions before a probe counts as unanswered.
    pub retries: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(3),
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub nat_type: NatType,
    /// Endpoint the probe server saw on the first binding request,
    /// `0.0.0.0:0` when it never answered.
    pub external: SocketAddrV4,
}

/// Runs the RFC 3489 test sequence from `local_ip:local_port`.
///
/// When `probe_host` is `None` a server from the bundled list is picked at
/// random. Only local socket failures other than "address in use" are
/// reported as `Err`, every probing outcome is a [`NatType`].
pub async fn classify(
    probe_host: Option<&str>,
    probe_port: u16,
    local_ip: Ipv4Addr,
    local_port: u16,
    config: &ClassifierConfig,
) -> Result<Classification> {
    let probe_host = probe_host.unwrap_or_else(|| random_stun_server());
    log::debug!("classifying nat with stun server {}:{}", probe_host, probe_port);

    let mut external = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    let done = |nat_type: NatType, external: SocketAddrV4| -> Result<Classification> {
        log::debug!("nat type {}, external {}", nat_type, external);
        Ok(Classification { nat_type, external })
    };

    let socket = match udp_socket(SocketAddrV4::new(local_ip, local_port), true, None) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            log::warn!("{}:{} in use, try another port", local_ip, local_port);
            return done(NatType::Error, external);
        }
        Err(e) => return Err(e.into()),
    };
    let local_addr = socket.local_addr()?;
    let prober = Prober { socket, config };

    let server = match resolve_v4(probe_host, probe_port).await {
        Ok(addr) => addr,
        Err(e) => {
            log::warn!("no such host {}: {}", probe_host, e);
            return done(NatType::Blocked, external);
        }
    };

    let resp = match prober.bind_request(server, ChangeRequest::NONE).await {
        Ok(Some(resp)) => resp,
        Ok(None) => return done(NatType::Blocked, external),
        Err(e) => {
            log::debug!("binding request to {} failed: {}", server, e);
            return done(NatType::Blocked, external);
        }
    };

    external = match resp.mapped_address() {
        Some(mapped) => mapped,
        None => {
            log::debug!("binding response without mapped address");
            return done(NatType::Error, external);
        }
    };

    if SocketAddr::V4(external) == local_addr {
        return done(NatType::OpenInternet, external);
    }

    let changed = match resp
        .changed_address()
        .filter(|c| !c.ip().is_unspecified() && c.port() != 0)
    {
        Some(changed) => changed,
        None => {
            log::warn!("no alternative server, can't detect nat type");
            return done(NatType::Error, external);
        }
    };

    if !matches!(
        prober.bind_request(server, ChangeRequest::IP_AND_PORT).await,
        Ok(Some(_))
    ) {
        return done(NatType::FullCone, external);
    }

    let alt = SocketAddr::V4(changed);
    let alt_resp = match prober.bind_request(alt, ChangeRequest::NONE).await {
        Ok(Some(resp)) => resp,
        _ => {
            log::warn!("failed to send request to alternative server {}", alt);
            return done(NatType::Error, external);
        }
    };

    if alt_resp.mapped_address() != Some(external) {
        return done(NatType::SymmetricNat, external);
    }

    match prober.bind_request(alt, ChangeRequest::PORT).await {
        Ok(Some(_)) => done(NatType::RestrictedNat, external),
        _ => done(NatType::RestrictedPortNat, external),
    }
}

/// Repeats [`classify`] until it yields something other than `Blocked` or
/// `Error`, at most [`CLASSIFY_ATTEMPTS`] times. Each attempt without an
/// explicit `probe_host` draws a fresh random server.
pub async fn classify_with_retries(
    probe_host: Option<&str>,
    probe_port: u16,
    local_ip: Ipv4Addr,
    local_port: u16,
    config: &ClassifierConfig,
) -> Result<Classification> {
    let mut result = classify(probe_host, probe_port, local_ip, local_port, config).await?;
    for attempt in 1..CLASSIFY_ATTEMPTS {
        if !result.nat_type.is_failure() {
            break;
        }
        log::debug!("classification attempt {} got {}, retrying", attempt, result.nat_type);
        result = classify(probe_host, probe_port, local_ip, local_port, config).await?;
    }
    Ok(result)
}

async fn resolve_v4(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or(Error::Unsupported("stun server has no ipv4 address"))
}

struct Prober<'a> {
    socket: UdpSocket,
    config: &'a ClassifierConfig,
}

impl Prober<'_> {
    /// Sends a binding request, retransmitting on timeout.
    ///
    /// `Ok(None)` means no matching response arrived after all retries.
    /// Responses may come from any address since CHANGE-REQUEST makes the
    /// server answer from its alternate endpoint.
    async fn bind_request(
        &self,
        server: SocketAddr,
        change: ChangeRequest,
    ) -> Result<Option<Message>> {
        let req = Message::bind_request(change);
        let bytes = req.to_bytes()?;
        let mut buf = [0u8; MAX_STUN_MESSAGE_LEN];

        for attempt in 0..self.config.retries {
            log::trace!(
                "binding request #{} to {} ({:?}): {}",
                attempt,
                server,
                change,
                hex_dump(&bytes)
            );
            self.socket.send_to(&bytes, server).await?;

            let deadline = Instant::now() + self.config.recv_timeout;
            loop {
                let (n, from) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Ok(r) => r?,
                    Err(_) => break,
                };
                let resp = Message::decode(&buf[..n])?;
                if resp.transaction_id != req.transaction_id {
                    log::trace!("stale stun response from {}", from);
                    continue;
                }
                if resp.kind != BIND_RESPONSE {
                    return Err(Error::protocol(format!(
                        "unexpected stun message type {:#06x}",
                        resp.kind
                    )));
                }
                log::trace!("binding response from {}: {}", from, hex_dump(&buf[..n]));
                return Ok(Some(resp));
            }
        }

        Ok(None)
    }
}
