//! UDP hole punching.
//!
//! Two strategies are implemented. [`Strategy::Direct`] probes the peer's
//! known mapping and then nearby guesses one socket at a time, which is
//! enough when the remote NAT keeps one mapping per socket.
//! [`Strategy::Symmetric`] opens hundreds of low TTL holes towards random
//! ports of the peer and keeps whichever socket the peer reaches first.

use crate::error::{Error, Result};
use crate::nat::NatType;
use crate::punch::{PeerInfo, PunchSession};
use crate::socket::udp_socket;
use async_shutdown::ShutdownManager;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

pub mod ports;
pub mod race;

pub use ports::PortPool;

const DUMMY: &[u8] = b"c";
pub const GREETING: &[u8] = b"hello, peer";
const MSG_BUF_SIZE: usize = 512;

#[derive(Debug, Clone)]
pub struct PunchConfig {
    /// TTL of symmetric holes, low enough to die before reaching the peer's NAT.
    pub ttl: u32,
    pub candidates: usize,
    pub send_interval: Duration,
    pub probe_wait: Duration,
    pub punch_timeout: Duration,
    pub send_timeout: Duration,
    pub restore_ttl: u32,
    pub bind_ip: Ipv4Addr,
    pub always_symmetric: bool,
}

impl Default for PunchConfig {
    fn default() -> Self {
        Self {
            ttl: 10,
            candidates: 700,
            send_interval: Duration::from_millis(100),
            probe_wait: Duration::from_millis(100),
            punch_timeout: Duration::from_secs(100),
            send_timeout: Duration::from_secs(5),
            restore_ttl: 64,
            bind_ip: Ipv4Addr::UNSPECIFIED,
            always_symmetric: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Symmetric,
    Direct,
}

impl Strategy {
    pub fn select(local: NatType, remote: NatType) -> Self {
        if local.is_symmetric() || !remote.is_cooperative() {
            Strategy::Symmetric
        } else {
            Strategy::Direct
        }
    }
}

/// An established path: the socket the peer reached and where it came from.
#[derive(Debug)]
pub struct PunchedPath {
    pub socket: UdpSocket,
    pub peer_addr: SocketAddr,
    /// The first datagram the peer got through.
    pub greeting: Vec<u8>,
}

pub struct HolePuncher {
    config: PunchConfig,
    shutdown: ShutdownManager<()>,
}

impl HolePuncher {
    pub fn new(config: PunchConfig, shutdown: ShutdownManager<()>) -> Self {
        Self { config, shutdown }
    }

    pub fn config(&self) -> &PunchConfig {
        &self.config
    }

    pub fn strategy(&self, local: NatType, remote: NatType) -> Strategy {
        if self.config.always_symmetric {
            return Strategy::Symmetric;
        }
        Strategy::select(local, remote)
    }

    /// Initiates a connection to an already looked up peer.
    pub async fn connect(
        &self,
        session: &mut PunchSession,
        peer: &PeerInfo,
    ) -> Result<PunchedPath> {
        let strategy = self.strategy(session.nat_type(), peer.nat_type);
        log::debug!(
            "connecting to {} ({}) at {}:{} using {:?}",
            peer.id,
            peer.nat_type,
            peer.ip,
            peer.port,
            strategy
        );

        match strategy {
            Strategy::Symmetric => self.connect_symmetric(session, peer).await,
            Strategy::Direct => {
                session.notify_peer(peer.id).await?;
                let addr = peer.addr()?;
                self.connect_direct(*addr.ip(), addr.port()).await
            }
        }
    }

    pub async fn connect_symmetric(
        &self,
        session: &mut PunchSession,
        peer: &PeerInfo,
    ) -> Result<PunchedPath> {
        let pool = PortPool::shuffled(&mut rand::thread_rng());
        self.punch_symmetric(&pool, session, peer).await
    }

    pub async fn punch_symmetric(
        &self,
        pool: &PortPool,
        session: &mut PunchSession,
        peer: &PeerInfo,
    ) -> Result<PunchedPath> {
        let remote = peer.addr()?;
        let mut holes = Vec::with_capacity(self.config.candidates);

        for port in pool.candidates(remote.port(), self.config.candidates) {
            if self.shutdown.is_shutdown_triggered() {
                return Err(Error::Shutdown);
            }
            let target = SocketAddrV4::new(*remote.ip(), port);
            match self.punch_hole(target, Some(self.config.ttl)).await {
                Ok(hole) => holes.push(hole),
                Err(e) if holes.is_empty() => return Err(e),
                Err(e) => {
                    log::debug!("stop punching after {} holes: {}", holes.len(), e);
                    break;
                }
            }
            sleep(self.config.send_interval).await;
        }
        log::debug!("{} holes punched towards {}", holes.len(), remote.ip());

        session.notify_peer(peer.id).await?;

        let deadline = Instant::now() + self.config.punch_timeout;
        let socket = race::first_responder(holes, deadline, &self.shutdown).await?;
        self.handshake(socket).await
    }

    /// Responds to a peer whose mapping is known, or initiates towards a
    /// cooperative NAT.
    pub async fn connect_direct(
        &self,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    ) -> Result<PunchedPath> {
        let pool = PortPool::shuffled(&mut rand::thread_rng());
        self.punch_direct(&pool, remote_ip, remote_port).await
    }

    pub async fn punch_direct(
        &self,
        pool: &PortPool,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    ) -> Result<PunchedPath> {
        let known = (remote_port != 0).then_some(remote_port);
        let targets = known
            .into_iter()
            .chain(pool.candidates(remote_port, self.config.candidates));

        let mut socks = Vec::new();
        for port in targets {
            if self.shutdown.is_shutdown_triggered() {
                return Err(Error::Shutdown);
            }
            match self.punch_hole(SocketAddrV4::new(remote_ip, port), None).await {
                Ok(s) => socks.push(s),
                Err(e) if socks.is_empty() => return Err(e),
                Err(e) => {
                    log::debug!("may trigger flooding protection: {}", e);
                    break;
                }
            }

            let deadline = Instant::now() + self.config.probe_wait;
            if let Some(i) = race::wait_readable(&socks, deadline).await {
                let s = socks.swap_remove(i);
                drop(socks);
                return self.handshake(s).await;
            }
        }

        log::debug!("holes punched, waiting for peer");
        let deadline = Instant::now() + self.config.punch_timeout;
        let socket = race::first_responder(socks, deadline, &self.shutdown).await?;
        self.handshake(socket).await
    }

    async fn punch_hole(&self, target: SocketAddrV4, ttl: Option<u32>) -> Result<UdpSocket> {
        let hole = udp_socket(SocketAddrV4::new(self.config.bind_ip, 0), false, ttl)?;
        match timeout(self.config.send_timeout, hole.send_to(DUMMY, target)).await {
            Ok(r) => {
                r?;
            }
            Err(_) => return Err(Error::Timeout),
        }
        log::trace!("hole {} -> {}", hole.local_addr()?, target);
        Ok(hole)
    }

    async fn handshake(&self, socket: UdpSocket) -> Result<PunchedPath> {
        let mut buf = [0u8; MSG_BUF_SIZE];
        let (n, peer_addr) = timeout(self.config.send_timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| Error::Timeout)??;
        log::debug!(
            "connected with {} on {}, received {:?}",
            peer_addr,
            socket.local_addr()?,
            String::from_utf8_lossy(&buf[..n])
        );

        socket.set_ttl(self.config.restore_ttl)?;
        socket.send_to(GREETING, peer_addr).await?;

        Ok(PunchedPath {
            socket,
            peer_addr,
            greeting: buf[..n].to_vec(),
        })
    }
}
