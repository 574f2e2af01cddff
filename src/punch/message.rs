use crate::codec::{WireBuf, WireRead, MAX_MESSAGE_LEN};
use crate::error::{Error, Result};
use crate::nat::NatType;
use bytes::Buf;
use std::borrow::Cow;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Width of the NUL padded textual ip field.
pub const IP_LEN: usize = 16;
pub const MAX_META_LEN: usize = u8::MAX as usize;
/// id + ip + port + nat type + meta length
pub const PEER_HEADER_LEN: usize = 4 + IP_LEN + 2 + 2 + 1;
/// A reply of exactly this single byte means the peer is gone.
pub const OFFLINE_SENTINEL: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Enroll = 0x01,
    GetPeerInfo = 0x02,
    NotifyPeer = 0x03,
    GetPeerInfoFromMeta = 0x04,
    NotifyPeerFromMeta = 0x05,
}

impl TryFrom<u16> for MessageType {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        Ok(match v {
            0x01 => MessageType::Enroll,
            0x02 => MessageType::GetPeerInfo,
            0x03 => MessageType::NotifyPeer,
            0x04 => MessageType::GetPeerInfoFromMeta,
            0x05 => MessageType::NotifyPeerFromMeta,
            v => return Err(Error::protocol(format!("illegal message type {}", v))),
        })
    }
}

/// A peer as the punch server knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Server assigned, zero until enrolled.
    pub id: u32,
    /// Dotted IPv4 text, at most 15 characters.
    pub ip: String,
    pub port: u16,
    pub nat_type: NatType,
    pub meta: Vec<u8>,
}

impl PeerInfo {
    pub fn new<S: Into<String>>(ip: S, port: u16, nat_type: NatType, meta: Vec<u8>) -> Self {
        Self {
            id: 0,
            ip: ip.into(),
            port,
            nat_type,
            meta,
        }
    }

    pub fn addr(&self) -> Result<SocketAddrV4> {
        let ip: Ipv4Addr = self
            .ip
            .parse()
            .map_err(|_| Error::protocol(format!("invalid peer ip {:?}", self.ip)))?;
        Ok(SocketAddrV4::new(ip, self.port))
    }

    pub fn meta_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.meta)
    }

    /// Full record: id, ip, port, nat type, length prefixed meta.
    pub fn encode(&self, buf: &mut WireBuf) -> Result<()> {
        buf.put_u32(self.id)?;
        self.encode_body(buf)
    }

    /// Everything but the id, as carried by `Enroll`.
    fn encode_body(&self, buf: &mut WireBuf) -> Result<()> {
        encode_ip(buf, &self.ip)?;
        buf.put_u16(self.port)?;
        buf.put_u16(self.nat_type.into())?;
        encode_meta(buf, &self.meta)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
        self.encode(&mut buf)?;
        Ok(buf.as_slice().to_vec())
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let (mut info, meta_len) = decode_header(buf)?;
        info.meta = buf.wire_bytes(meta_len)?;
        Ok(info)
    }
}

/// Decodes the fixed part of a record, returning the meta length still to read.
fn decode_header<B: Buf>(buf: &mut B) -> Result<(PeerInfo, usize)> {
    let id = buf.wire_u32()?;
    let ip = decode_ip(buf)?;
    let port = buf.wire_u16()?;
    let nat_type = NatType::try_from(buf.wire_u16()?)?;
    let meta_len = buf.wire_u8()? as usize;
    Ok((
        PeerInfo {
            id,
            ip,
            port,
            nat_type,
            meta: Vec::new(),
        },
        meta_len,
    ))
}

fn encode_ip(buf: &mut WireBuf, ip: &str) -> Result<()> {
    if ip.len() >= IP_LEN {
        return Err(Error::protocol(format!("ip text {:?} too long", ip)));
    }
    let mut field = [0u8; IP_LEN];
    field[..ip.len()].copy_from_slice(ip.as_bytes());
    buf.put_slice(&field)?;
    Ok(())
}

fn decode_ip<B: Buf>(buf: &mut B) -> Result<String> {
    let field = buf.wire_bytes(IP_LEN)?;
    let end = field.iter().position(|b| *b == 0).unwrap_or(IP_LEN);
    String::from_utf8(field[..end].to_vec()).map_err(|_| Error::protocol("ip field is not text"))
}

fn encode_meta(buf: &mut WireBuf, meta: &[u8]) -> Result<()> {
    let len = u8::try_from(meta.len()).map_err(|_| {
        Error::protocol(format!("meta of {} bytes exceeds {}", meta.len(), MAX_META_LEN))
    })?;
    buf.put_u8(len)?;
    buf.put_slice(meta)?;
    Ok(())
}

/// Client to server requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The id field of the record is not transmitted.
    Enroll(PeerInfo),
    GetPeerInfo(u32),
    NotifyPeer(u32),
    GetPeerInfoFromMeta(Vec<u8>),
    NotifyPeerFromMeta(Vec<u8>),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Enroll(_) => MessageType::Enroll,
            Request::GetPeerInfo(_) => MessageType::GetPeerInfo,
            Request::NotifyPeer(_) => MessageType::NotifyPeer,
            Request::GetPeerInfoFromMeta(_) => MessageType::GetPeerInfoFromMeta,
            Request::NotifyPeerFromMeta(_) => MessageType::NotifyPeerFromMeta,
        }
    }

    pub fn encode(&self, buf: &mut WireBuf) -> Result<()> {
        buf.put_u16(self.message_type() as u16)?;
        match self {
            Request::Enroll(info) => info.encode_body(buf),
            Request::GetPeerInfo(id) | Request::NotifyPeer(id) => buf.put_u32(*id).map(|_| ()),
            Request::GetPeerInfoFromMeta(meta) | Request::NotifyPeerFromMeta(meta) => {
                encode_meta(buf, meta)
            }
        }
    }

    /// Reads one request off a stream. EOF before the message type means the
    /// client went away, EOF anywhere later is an incomplete message.
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self> {
        let kind = match r.read_u16().await {
            Ok(kind) => kind,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::Disconnected)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match MessageType::try_from(kind)? {
            MessageType::Enroll => {
                let mut raw = [0u8; IP_LEN + 2 + 2];
                r.read_exact(&mut raw).await.map_err(Error::from_read)?;
                let mut b = &raw[..];
                let ip = decode_ip(&mut b)?;
                let port = b.wire_u16()?;
                let nat_type = NatType::try_from(b.wire_u16()?)?;
                let meta = read_meta(r).await?;
                Request::Enroll(PeerInfo::new(ip, port, nat_type, meta))
            }
            MessageType::GetPeerInfo => {
                Request::GetPeerInfo(r.read_u32().await.map_err(Error::from_read)?)
            }
            MessageType::NotifyPeer => {
                Request::NotifyPeer(r.read_u32().await.map_err(Error::from_read)?)
            }
            MessageType::GetPeerInfoFromMeta => Request::GetPeerInfoFromMeta(read_meta(r).await?),
            MessageType::NotifyPeerFromMeta => Request::NotifyPeerFromMeta(read_meta(r).await?),
        })
    }
}

async fn read_meta<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u8().await.map_err(Error::from_read)?;
    let mut meta = vec![0; len as usize];
    r.read_exact(&mut meta).await.map_err(Error::from_read)?;
    Ok(meta)
}

/// What the punch server sends on the peer info path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerReply {
    Peer(PeerInfo),
    Offline,
}

/// Reads a peer record: the fixed header first, then exactly `meta_len`
/// bytes in a second read.
///
/// A first read of exactly one byte is the offline sentinel. A first read of
/// zero bytes means the server hung up.
///
/// The sentinel is told apart only by the length of that single read. If it
/// arrives in the same segment as the record after it, the two are read as one
/// header and decode to garbage. The server never sends anything unasked, so a
/// session that waits for each reply before the next request never sees that.
pub async fn read_peer_reply<R: AsyncRead + Unpin>(r: &mut R) -> Result<PeerReply> {
    let mut head = [0u8; PEER_HEADER_LEN];
    let n = r.read(&mut head).await?;
    match n {
        0 => return Err(Error::Disconnected),
        1 => {
            log::debug!("it seems peer has gone offline");
            return Ok(PeerReply::Offline);
        }
        _ => {}
    }
    r.read_exact(&mut head[n..]).await.map_err(Error::from_read)?;

    let (mut info, meta_len) = decode_header(&mut &head[..])?;
    let mut meta = vec![0; meta_len];
    r.read_exact(&mut meta).await.map_err(Error::from_read)?;
    info.meta = meta;

    log::debug!(
        "peer info got, id: {}, ip: {}, port: {}, type: {}, meta: {}",
        info.id,
        info.ip,
        info.port,
        info.nat_type,
        info.meta_str()
    );
    Ok(PeerReply::Peer(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PeerInfo {
        PeerInfo {
            id: 42,
            ip: "203.0.113.5".into(),
            port: 51820,
            nat_type: NatType::SymmetricNat,
            meta: b"abc".to_vec(),
        }
    }

    #[test]
    fn test_peer_info_codec() {
        let cases = [
            sample(),
            PeerInfo {
                id: u32::MAX,
                ip: "255.255.255.255".into(),
                port: 0,
                nat_type: NatType::Blocked,
                meta: vec![0xff; MAX_META_LEN],
            },
            PeerInfo::new("", u16::MAX, NatType::Error, Vec::new()),
        ];
        for info in cases {
            let bytes = info.to_bytes().unwrap();
            assert_eq!(bytes.len(), PEER_HEADER_LEN + info.meta.len());
            let decoded = PeerInfo::decode(&mut &bytes[..]).unwrap();
            assert_eq!(decoded, info);
        }
    }

    #[test]
    fn test_enroll_layout() {
        let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
        Request::Enroll(sample()).encode(&mut buf).unwrap();

        let mut expected = vec![0x00, 0x01];
        expected.extend_from_slice(b"203.0.113.5\0\0\0\0\0");
        expected.extend_from_slice(&[0xca, 0x6c, 0x00, 0x05, 0x03]);
        expected.extend_from_slice(b"abc");
        assert_eq!(buf.as_slice(), &expected[..]);
    }

    #[tokio::test]
    async fn test_enroll_read_back() {
        let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
        Request::Enroll(sample()).encode(&mut buf).unwrap();

        let req = Request::read_from(&mut buf.as_slice()).await.unwrap();
        match req {
            Request::Enroll(info) => {
                assert_eq!(info.ip, "203.0.113.5");
                assert_eq!(info.port, 51820);
                assert_eq!(info.nat_type, NatType::SymmetricNat);
                assert_eq!(info.meta, b"abc");
            }
            r => panic!("unexpected {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_requests_read_back() {
        let reqs = [
            Request::GetPeerInfo(7),
            Request::NotifyPeer(0x0102_0304),
            Request::GetPeerInfoFromMeta(b"alice".to_vec()),
            Request::NotifyPeerFromMeta(Vec::new()),
        ];
        for req in reqs {
            let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
            req.encode(&mut buf).unwrap();
            assert_eq!(&buf.as_slice()[..2], &(req.message_type() as u16).to_be_bytes());
            let read = Request::read_from(&mut buf.as_slice()).await.unwrap();
            assert_eq!(read, req);
        }

        let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
        Request::NotifyPeer(9).encode(&mut buf).unwrap();
        assert_eq!(buf.as_slice(), &[0x00, 0x03, 0x00, 0x00, 0x00, 0x09]);
    }

    #[tokio::test]
    async fn test_request_errors() {
        let empty: &[u8] = &[];
        assert!(matches!(
            Request::read_from(&mut &empty[..]).await,
            Err(Error::Disconnected)
        ));
        let bad: &[u8] = &[0x00, 0x09];
        assert!(matches!(
            Request::read_from(&mut &bad[..]).await,
            Err(Error::Protocol(_))
        ));
        let short: &[u8] = &[0x00, 0x02, 0x00];
        assert!(matches!(
            Request::read_from(&mut &short[..]).await,
            Err(Error::IncompleteMessage)
        ));
    }

    #[test]
    fn test_encode_limits() {
        let mut buf = WireBuf::with_capacity(MAX_MESSAGE_LEN);
        let long_ip = PeerInfo::new("1234567890.123456", 1, NatType::FullCone, Vec::new());
        assert!(matches!(long_ip.encode(&mut buf), Err(Error::Protocol(_))));

        buf.clear();
        let long_meta = Request::GetPeerInfoFromMeta(vec![b'm'; MAX_META_LEN + 1]);
        assert!(matches!(long_meta.encode(&mut buf), Err(Error::Protocol(_))));

        let mut small = WireBuf::with_capacity(8);
        assert!(matches!(
            sample().encode(&mut small),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_reply_sentinel_and_eof() {
        let one: &[u8] = &[OFFLINE_SENTINEL];
        assert_eq!(read_peer_reply(&mut &one[..]).await.unwrap(), PeerReply::Offline);

        let none: &[u8] = &[];
        assert!(matches!(
            read_peer_reply(&mut &none[..]).await,
            Err(Error::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_reply_short_meta() {
        let bytes = sample().to_bytes().unwrap();
        let header_only = &bytes[..PEER_HEADER_LEN];
        assert!(matches!(
            read_peer_reply(&mut &header_only[..]).await,
            Err(Error::IncompleteMessage)
        ));

        let short_header = &bytes[..10];
        assert!(matches!(
            read_peer_reply(&mut &short_header[..]).await,
            Err(Error::IncompleteMessage)
        ));

        let whole = read_peer_reply(&mut &bytes[..]).await.unwrap();
        assert_eq!(whole, PeerReply::Peer(sample()));
    }

    #[test]
    fn test_peer_addr() {
        assert_eq!(sample().addr().unwrap(), "203.0.113.5:51820".parse().unwrap());
        let bad = PeerInfo::new("not an ip", 1, NatType::FullCone, Vec::new());
        assert!(bad.addr().is_err());
    }
}
