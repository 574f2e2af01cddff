use super::message::{read_peer_reply, PeerInfo, PeerReply, Request};
use crate::codec::{hex_dump, WireBuf, MAX_MESSAGE_LEN};
use crate::error::{Error, Result};
use crate::nat::NatType;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        lookup_host,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub enroll_timeout: Duration,
    pub reply_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enroll_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(10),
        }
    }
}

/// A long lived connection to the punch server.
pub struct PunchSession {
    reader: Option<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    scratch: WireBuf,
    server_addr: SocketAddr,
    id: Option<u32>,
    nat_type: NatType,
    ttl: u32,
    config: SessionConfig,
}

impl PunchSession {
    pub async fn connect(server_addr: &str, config: SessionConfig) -> Result<Self> {
        let addr = lookup_host(server_addr)
            .await?
            .next()
            .ok_or_else(|| Error::protocol(format!("failed to resolve {}", server_addr)))?;
        let stream = TcpStream::connect(addr).await?;
        log::debug!("connected to punch server {}", addr);
        Self::from_stream(stream, config)
    }

    pub fn from_stream(stream: TcpStream, config: SessionConfig) -> Result<Self> {
        let server_addr = stream.peer_addr()?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: Some(r),
            writer: w,
            scratch: WireBuf::with_capacity(MAX_MESSAGE_LEN),
            server_addr,
            id: None,
            nat_type: NatType::Error,
            ttl: 0,
            config,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Server assigned id, `None` before a successful enroll.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn nat_type(&self) -> NatType {
        self.nat_type
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub async fn enroll(&mut self, info: &PeerInfo, ttl: u32) -> Result<u32> {
        if self.reader.is_none() {
            return Err(Error::ReaderTaken);
        }
        self.send(&Request::Enroll(info.clone())).await?;

        let mut id = [0u8; 4];
        let reader = self.reader.as_mut().ok_or(Error::ReaderTaken)?;
        match timeout(self.config.enroll_timeout, reader.read_exact(&mut id)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                log::debug!("failed to read enroll reply: {}", e);
                return Err(Error::EnrollTimeout);
            }
            Err(_) => return Err(Error::EnrollTimeout),
        }

        let id = u32::from_be_bytes(id);
        log::debug!("enrolled as {} ({}:{}, {})", id, info.ip, info.port, info.nat_type);
        self.id = Some(id);
        self.nat_type = info.nat_type;
        self.ttl = ttl;
        Ok(id)
    }

    pub async fn lookup_by_id(&mut self, peer_id: u32) -> Result<PeerInfo> {
        self.lookup(Request::GetPeerInfo(peer_id)).await
    }

    pub async fn lookup_by_meta(&mut self, meta: &[u8]) -> Result<PeerInfo> {
        self.lookup(Request::GetPeerInfoFromMeta(meta.to_vec())).await
    }

    /// Asks the server to forward our record to `peer_id`. No reply is read.
    pub async fn notify_peer(&mut self, peer_id: u32) -> Result<()> {
        log::debug!("notifying peer {}", peer_id);
        self.send(&Request::NotifyPeer(peer_id)).await
    }

    pub async fn notify_peer_by_meta(&mut self, meta: &[u8]) -> Result<()> {
        log::debug!("notifying peer {}", String::from_utf8_lossy(meta));
        self.send(&Request::NotifyPeerFromMeta(meta.to_vec())).await
    }

    /// Hands the read half over, typically to a notification listener.
    pub fn take_reader(&mut self) -> Result<OwnedReadHalf> {
        self.reader.take().ok_or(Error::ReaderTaken)
    }

    async fn lookup(&mut self, req: Request) -> Result<PeerInfo> {
        if self.reader.is_none() {
            return Err(Error::ReaderTaken);
        }
        self.send(&req).await?;

        let reader = self.reader.as_mut().ok_or(Error::ReaderTaken)?;
        match timeout(self.config.reply_timeout, read_peer_reply(reader)).await {
            Ok(Ok(PeerReply::Peer(info))) => Ok(info),
            Ok(Ok(PeerReply::Offline)) => Err(Error::PeerNotFound),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn send(&mut self, req: &Request) -> Result<()> {
        let r = self.write_req(req).await;
        self.scratch.clear();
        r
    }

    async fn write_req(&mut self, req: &Request) -> Result<()> {
        req.encode(&mut self.scratch)?;
        log::trace!(
            "sending {:?} to punch server: {}",
            req.message_type(),
            hex_dump(self.scratch.as_slice())
        );
        self.writer.write_all(self.scratch.as_slice()).await?;
        Ok(())
    }
}
