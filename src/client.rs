use crate::error::{Error, Result};
use crate::hole::{HolePuncher, PunchConfig, PunchedPath};
use crate::nat::{classify_with_retries, Classification, ClassifierConfig, DEFAULT_STUN_PORT};
use crate::punch::{NotificationListener, PeerInfo, PunchSession, SessionConfig};
use async_shutdown::ShutdownManager;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::Ipv4Addr;
use tokio::select;

pub const DEFAULT_LOCAL_PORT: u16 = 34780;
const RANDOM_META_LEN: usize = 20;

/// How to find a peer on the punch server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerKey {
    Id(u32),
    Meta(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// STUN server, a random public one when unset.
    pub stun_host: Option<String>,
    pub stun_port: u16,
    pub local_ip: Ipv4Addr,
    pub local_port: u16,
    pub server_addr: String,
    /// Enrolled meta, a random alphanumeric string when unset.
    pub meta: Option<String>,
    /// Peer to connect to right after enrolling.
    pub peer: Option<PeerKey>,
    pub classifier: ClassifierConfig,
    pub session: SessionConfig,
    pub punch: PunchConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stun_host: None,
            stun_port: DEFAULT_STUN_PORT,
            local_ip: Ipv4Addr::UNSPECIFIED,
            local_port: DEFAULT_LOCAL_PORT,
            server_addr: format!("127.0.0.1:{}", crate::punch::DEFAULT_SERVER_PORT),
            meta: None,
            peer: None,
            classifier: Default::default(),
            session: Default::default(),
            punch: Default::default(),
        }
    }
}

/// An enrolled peer: classified, registered with the punch server and ready
/// to connect out or accept connect requests.
pub struct Client {
    session: PunchSession,
    puncher: HolePuncher,
    shutdown: ShutdownManager<()>,
    info: PeerInfo,
    peer: Option<PeerKey>,
}

impl Client {
    /// Classifies the local NAT, then enrolls.
    pub async fn start(config: ClientConfig, shutdown: ShutdownManager<()>) -> Result<Self> {
        let c = classify_with_retries(
            config.stun_host.as_deref(),
            config.stun_port,
            config.local_ip,
            config.local_port,
            &config.classifier,
        )
        .await?;
        log::info!("nat type: {}", c.nat_type);

        Self::enroll(c, config, shutdown).await
    }

    /// Enrolls an already known classification.
    pub async fn enroll(
        c: Classification,
        config: ClientConfig,
        shutdown: ShutdownManager<()>,
    ) -> Result<Self> {
        if c.external.port() == 0 {
            return Err(Error::protocol(format!(
                "no external endpoint discovered, nat type {}",
                c.nat_type
            )));
        }
        log::info!("external address: {}", c.external);

        let meta = config.meta.unwrap_or_else(random_meta);
        let mut info = PeerInfo::new(
            c.external.ip().to_string(),
            c.external.port(),
            c.nat_type,
            meta.into_bytes(),
        );

        let mut session = PunchSession::connect(&config.server_addr, config.session).await?;
        info.id = session.enroll(&info, config.punch.ttl).await?;
        log::info!("enrolled as {} with meta {}", info.id, info.meta_str());

        Ok(Self {
            session,
            puncher: HolePuncher::new(config.punch, shutdown.clone()),
            shutdown,
            info,
            peer: config.peer,
        })
    }

    /// Own record as enrolled.
    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub async fn connect(&mut self, peer: &PeerKey) -> Result<PunchedPath> {
        let info = lookup_with(&mut self.session, peer).await?;
        self.puncher.connect(&mut self.session, &info).await
    }

    /// Connects to the configured peer if any, then answers connect requests
    /// until shutdown or until the punch server goes away.
    pub async fn run<F: FnMut(PunchedPath)>(mut self, mut on_path: F) -> Result<()> {
        if let Some(peer) = self.peer.take() {
            match self.connect(&peer).await {
                Ok(path) => on_path(path),
                Err(e) => log::warn!("failed to connect {:?}: {}", peer, e),
            }
        }

        let mut listener =
            NotificationListener::spawn(self.session.take_reader()?, self.shutdown.clone());
        loop {
            let peer = select! {
                peer = listener.recv() => peer,
                _ = self.shutdown.wait_shutdown_triggered() => None,
            };
            let Some(peer) = peer else {
                break;
            };

            let addr = match peer.addr() {
                Ok(addr) => addr,
                Err(e) => {
                    log::warn!("ignoring connect request from {}: {}", peer.id, e);
                    continue;
                }
            };
            match self.puncher.connect_direct(*addr.ip(), addr.port()).await {
                Ok(path) => on_path(path),
                Err(Error::Shutdown) => break,
                Err(e) => log::warn!("failed to reach peer {} at {}: {}", peer.id, addr, e),
            }
        }

        match listener.join().await {
            Ok(()) | Err(Error::Shutdown) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Looks a peer up without enrolling.
pub async fn lookup(server_addr: &str, config: SessionConfig, peer: &PeerKey) -> Result<PeerInfo> {
    let mut session = PunchSession::connect(server_addr, config).await?;
    lookup_with(&mut session, peer).await
}

async fn lookup_with(session: &mut PunchSession, peer: &PeerKey) -> Result<PeerInfo> {
    match peer {
        PeerKey::Id(id) => session.lookup_by_id(*id).await,
        PeerKey::Meta(meta) => session.lookup_by_meta(meta).await,
    }
}

fn random_meta() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_META_LEN)
        .map(char::from)
        .collect()
}
