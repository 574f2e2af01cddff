use crate::codec::{WireBuf, MAX_MESSAGE_LEN};
use crate::error::{Error, Result};
use crate::punch::message::{PeerInfo, Request, OFFLINE_SENTINEL};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{ReadHalf, WriteHalf},
        TcpListener, ToSocketAddrs,
    },
    select, task,
};

/// Punch server
///
/// keeps the records of enrolled peers, answers lookups and relays connect
/// requests to the notified peer.
pub struct PunchServer {
    listener: TcpListener,
    peers: PeerMap,
    count: u64,
}

impl PunchServer {
    pub async fn new<A: ToSocketAddrs>(listen_addr: A) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;

        Ok(Self {
            listener,
            peers: Default::default(),
            count: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn next_conn(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!("punch server listening on {}", self.listener.local_addr()?);
        loop {
            let (mut stream, addr) = self.listener.accept().await?;
            let conn = self.next_conn();
            let peers = self.peers.clone();
            log::debug!("connection {} from {}", conn, addr);

            task::spawn(async move {
                let (tx, rx) = channel(10);
                let (r, w) = stream.split();
                let h = PeerHandler {
                    stream: w,
                    peers,
                    conn,
                    peer_id: None,
                    cmd_tx: tx,
                    cmd_rx: rx,
                    buf: WireBuf::with_capacity(MAX_MESSAGE_LEN),
                };

                h.handle_stream(r).await;
            });
        }
    }
}

#[derive(Clone)]
struct PeerState {
    conn: u64,
    info: PeerInfo,
    cmd_tx: Sender<Command>,
}

#[derive(Default)]
struct Peers {
    last_id: u32,
    by_id: HashMap<u32, PeerState>,
    by_meta: HashMap<Vec<u8>, u32>,
}

impl Peers {
    fn next_id(&mut self) -> u32 {
        self.last_id += 1;
        self.last_id
    }

    fn find_meta(&self, meta: &[u8]) -> Option<&PeerState> {
        self.by_meta.get(meta).and_then(|id| self.by_id.get(id))
    }

    fn remove(&mut self, id: u32) {
        if let Some(p) = self.by_id.remove(&id) {
            if self.by_meta.get(&p.info.meta) == Some(&id) {
                self.by_meta.remove(&p.info.meta);
            }
        }
    }
}

type PeerMap = Arc<Mutex<Peers>>;

enum Command {
    Request(Request),
    /// Someone asked to connect to us, forward their record.
    Notify(PeerInfo),
}

struct PeerHandler<'a> {
    stream: WriteHalf<'a>,
    peers: PeerMap,
    conn: u64,
    peer_id: Option<u32>,
    cmd_tx: Sender<Command>,
    cmd_rx: Receiver<Command>,
    buf: WireBuf,
}

impl<'a> PeerHandler<'a> {
    async fn handle_stream(mut self, r: ReadHalf<'a>) {
        let cmd_tx = self.cmd_tx.clone();

        let r = select! {
            r = Self::read_reqs(r, cmd_tx) => r,
            r = self.handle_cmds() => r,
        };
        if let Err(e) = r {
            log::debug!("connection {} closed: {}", self.conn, e);
        }

        if let Some(id) = self.peer_id {
            let mut peers = self.peers();
            if peers.by_id.get(&id).map(|p| p.conn) == Some(self.conn) {
                peers.remove(id);
            }
            drop(peers);
            log::debug!("peer {} disconnect", id);
        }
    }

    async fn read_reqs(mut r: ReadHalf<'a>, cmd_tx: Sender<Command>) -> Result<()> {
        loop {
            let req = Request::read_from(&mut r).await?;
            cmd_tx
                .send(Command::Request(req))
                .await
                .map_err(|_| Error::protocol("cmd channel closed"))?;
        }
    }

    async fn handle_cmds(&mut self) -> Result<()> {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Request(Request::Enroll(info)) => self.handle_enroll(info).await?,
                Command::Request(Request::GetPeerInfo(id)) => {
                    let found = self.peers().by_id.get(&id).map(|p| p.info.clone());
                    self.send_peer(found).await?
                }
                Command::Request(Request::GetPeerInfoFromMeta(meta)) => {
                    let found = self.peers().find_meta(&meta).map(|p| p.info.clone());
                    self.send_peer(found).await?
                }
                Command::Request(Request::NotifyPeer(id)) => {
                    let target = self.peers().by_id.get(&id).cloned();
                    self.handle_notify(target).await?
                }
                Command::Request(Request::NotifyPeerFromMeta(meta)) => {
                    let target = self.peers().find_meta(&meta).cloned();
                    self.handle_notify(target).await?
                }
                Command::Notify(info) => {
                    log::debug!("forwarding connect request from {}", info.id);
                    self.send_peer(Some(info)).await?
                }
            }
        }

        Err(Error::protocol("cmd handler channel closed"))
    }

    fn peers(&self) -> std::sync::MutexGuard<'_, Peers> {
        // a poisoned map still holds consistent entries
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn handle_enroll(&mut self, mut info: PeerInfo) -> Result<()> {
        let old = self.peer_id.take();
        let id = {
            let mut peers = self.peers();
            if let Some(old) = old {
                peers.remove(old);
            }
            let id = peers.next_id();
            info.id = id;
            if !info.meta.is_empty() {
                peers.by_meta.insert(info.meta.clone(), id);
            }
            log::info!(
                "peer {} enrolled, {}:{} {} meta {}",
                id,
                info.ip,
                info.port,
                info.nat_type,
                info.meta_str()
            );
            peers.by_id.insert(
                id,
                PeerState {
                    conn: self.conn,
                    info,
                    cmd_tx: self.cmd_tx.clone(),
                },
            );
            id
        };
        self.peer_id = Some(id);

        self.stream.write_all(&id.to_be_bytes()).await?;
        Ok(())
    }

    /// Relays our record to `target`. Notifications are fire-and-forget, so
    /// a miss is only logged and nothing is written back.
    async fn handle_notify(&self, target: Option<PeerState>) -> Result<()> {
        let me = self
            .peer_id
            .and_then(|id| self.peers().by_id.get(&id).map(|p| p.info.clone()));

        match (target, me) {
            (Some(target), Some(me)) => {
                log::debug!("peer {} wants to connect {}", me.id, target.info.id);
                if target.cmd_tx.send(Command::Notify(me)).await.is_err() {
                    log::debug!("peer {} gone while notifying", target.info.id);
                }
            }
            (None, _) => log::debug!("notify target not found"),
            (Some(_), None) => {
                log::debug!("connection {} notifies before enroll", self.conn)
            }
        }
        Ok(())
    }

    /// Writes a peer record, or the offline sentinel when there is none.
    async fn send_peer(&mut self, info: Option<PeerInfo>) -> Result<()> {
        match info {
            Some(info) => {
                self.buf.clear();
                info.encode(&mut self.buf)?;
                self.stream.write_all(self.buf.as_slice()).await?;
            }
            None => self.stream.write_all(&[OFFLINE_SENTINEL]).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::NatType;
    use crate::punch::{NotificationListener, PunchSession, SessionConfig};
    use async_shutdown::ShutdownManager;
    use std::time::Duration;

    async fn start() -> String {
        let server = PunchServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());
        addr
    }

    fn config() -> SessionConfig {
        SessionConfig {
            enroll_timeout: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(2),
        }
    }

    async fn enrolled(addr: &str, port: u16, meta: &[u8]) -> PunchSession {
        let mut s = PunchSession::connect(addr, config()).await.unwrap();
        let info = PeerInfo::new("198.51.100.1", port, NatType::RestrictedPortNat, meta.to_vec());
        s.enroll(&info, 10).await.unwrap();
        s
    }

    #[tokio::test]
    async fn test_enroll_and_lookup() {
        let addr = start().await;
        let mut a = enrolled(&addr, 1000, b"alice").await;
        let mut b = enrolled(&addr, 2000, b"bob").await;
        assert_eq!(a.id(), Some(1));
        assert_eq!(b.id(), Some(2));

        let bob = a.lookup_by_id(2).await.unwrap();
        assert_eq!(bob.port, 2000);
        assert_eq!(bob.meta, b"bob");
        assert_eq!(bob.nat_type, NatType::RestrictedPortNat);

        let alice = b.lookup_by_meta(b"alice").await.unwrap();
        assert_eq!(alice.id, 1);
        assert_eq!(alice.ip, "198.51.100.1");

        assert!(matches!(a.lookup_by_id(99).await, Err(Error::PeerNotFound)));
        assert!(matches!(a.lookup_by_meta(b"carol").await, Err(Error::PeerNotFound)));
    }

    #[tokio::test]
    async fn test_lookup_without_enroll() {
        let addr = start().await;
        let _a = enrolled(&addr, 1000, b"alice").await;

        let mut anon = PunchSession::connect(&addr, config()).await.unwrap();
        assert_eq!(anon.lookup_by_meta(b"alice").await.unwrap().port, 1000);
    }

    #[tokio::test]
    async fn test_notify_relays_record() {
        let addr = start().await;
        let mut a = enrolled(&addr, 1000, b"alice").await;
        let mut b = enrolled(&addr, 2000, b"bob").await;
        let reader = b.take_reader().unwrap();
        let mut notices = NotificationListener::spawn(reader, ShutdownManager::new());

        a.notify_peer(2).await.unwrap();
        let n = notices.recv().await.unwrap();
        assert_eq!((n.id, n.port), (1, 1000));

        a.notify_peer_by_meta(b"bob").await.unwrap();
        assert_eq!(notices.recv().await.unwrap().meta, b"alice");
    }

    #[tokio::test]
    async fn test_disconnect_removes_peer() {
        let addr = start().await;
        let a = enrolled(&addr, 1000, b"alice").await;
        let mut b = enrolled(&addr, 2000, b"bob").await;
        drop(a);

        let mut gone = false;
        for _ in 0..50 {
            if matches!(b.lookup_by_meta(b"alice").await, Err(Error::PeerNotFound)) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
        assert!(matches!(b.lookup_by_id(1).await, Err(Error::PeerNotFound)));
    }

    #[tokio::test]
    async fn test_notify_miss_leaves_reply_stream_intact() {
        let addr = start().await;
        let mut a = enrolled(&addr, 1000, b"alice").await;
        let b = enrolled(&addr, 2000, b"bob").await;
        let bob_id = b.id().unwrap();
        drop(b);

        let mut gone = false;
        for _ in 0..50 {
            if matches!(a.lookup_by_id(bob_id).await, Err(Error::PeerNotFound)) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);

        a.notify_peer(bob_id).await.unwrap();
        a.notify_peer_by_meta(b"nobody").await.unwrap();
        let _c = enrolled(&addr, 3000, b"carol").await;

        let carol = a.lookup_by_meta(b"carol").await.unwrap();
        assert_eq!(carol.port, 3000);

        // not enrolled, notifying is still silent
        let mut anon = PunchSession::connect(&addr, config()).await.unwrap();
        anon.notify_peer(1).await.unwrap();
        assert_eq!(anon.lookup_by_meta(b"alice").await.unwrap().port, 1000);
    }
}
