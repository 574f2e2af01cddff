//! Classic (RFC 3489) STUN binding messages.
//!
//! Only the pieces needed for NAT classification are understood: binding
//! request/response, CHANGE-REQUEST, MAPPED-ADDRESS and CHANGED-ADDRESS.
//! Other attributes are carried through undecoded.

use crate::codec::{WireBuf, WireRead, MAX_STUN_MESSAGE_LEN};
use crate::error::{Error, Result};
use bytes::Buf;
use std::net::{Ipv4Addr, SocketAddrV4};

pub const HEADER_LEN: usize = 20;

pub const BIND_REQUEST: u16 = 0x0001;
pub const BIND_RESPONSE: u16 = 0x0101;

pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_CHANGE_REQUEST: u16 = 0x0003;
pub const ATTR_CHANGED_ADDRESS: u16 = 0x0005;

pub const CHANGE_IP_FLAG: u32 = 0x04;
pub const CHANGE_PORT_FLAG: u32 = 0x02;

const IPV4_FAMILY: u8 = 0x01;
const IPV6_FAMILY: u8 = 0x02;
const IPV4_ATTR_LEN: usize = 8;
const IPV6_ATTR_LEN: usize = 20;

pub type TransactionId = [u8; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeRequest {
    pub change_ip: bool,
    pub change_port: bool,
}

impl ChangeRequest {
    pub const NONE: ChangeRequest = ChangeRequest {
        change_ip: false,
        change_port: false,
    };
    pub const IP_AND_PORT: ChangeRequest = ChangeRequest {
        change_ip: true,
        change_port: true,
    };
    pub const PORT: ChangeRequest = ChangeRequest {
        change_ip: false,
        change_port: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.change_ip && !self.change_port
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.change_ip {
            flags |= CHANGE_IP_FLAG;
        }
        if self.change_port {
            flags |= CHANGE_PORT_FLAG;
        }
        flags
    }

    fn from_flags(flags: u32) -> Self {
        Self {
            change_ip: flags & CHANGE_IP_FLAG != 0,
            change_port: flags & CHANGE_PORT_FLAG != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    MappedAddress(SocketAddrV4),
    ChangedAddress(SocketAddrV4),
    ChangeRequest(ChangeRequest),
    Other { kind: u16, value: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u16,
    pub transaction_id: TransactionId,
    pub attributes: Vec<Attribute>,
}

impl Message {
    /// A binding request with a fresh random transaction id. The
    /// CHANGE-REQUEST attribute is only present when a flag is set.
    pub fn bind_request(change: ChangeRequest) -> Self {
        let mut attributes = Vec::new();
        if !change.is_empty() {
            attributes.push(Attribute::ChangeRequest(change));
        }
        Self {
            kind: BIND_REQUEST,
            transaction_id: rand::random(),
            attributes,
        }
    }

    pub fn bind_response(
        transaction_id: TransactionId,
        mapped: Option<SocketAddrV4>,
        changed: Option<SocketAddrV4>,
    ) -> Self {
        let attributes = mapped
            .map(Attribute::MappedAddress)
            .into_iter()
            .chain(changed.map(Attribute::ChangedAddress))
            .collect();
        Self {
            kind: BIND_RESPONSE,
            transaction_id,
            attributes,
        }
    }

    pub fn mapped_address(&self) -> Option<SocketAddrV4> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::MappedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    pub fn changed_address(&self) -> Option<SocketAddrV4> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::ChangedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    pub fn change_request(&self) -> ChangeRequest {
        self.attributes
            .iter()
            .find_map(|a| match a {
                Attribute::ChangeRequest(c) => Some(*c),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn encode(&self, buf: &mut WireBuf) -> Result<()> {
        let start = buf.len();
        buf.put_u16(self.kind)?;
        buf.put_u16(0)?;
        buf.put_slice(&self.transaction_id)?;

        for attr in &self.attributes {
            match attr {
                Attribute::MappedAddress(addr) => encode_address(buf, ATTR_MAPPED_ADDRESS, addr)?,
                Attribute::ChangedAddress(addr) => {
                    encode_address(buf, ATTR_CHANGED_ADDRESS, addr)?
                }
                Attribute::ChangeRequest(change) => {
                    buf.put_u16(ATTR_CHANGE_REQUEST)?;
                    buf.put_u16(4)?;
                    buf.put_u32(change.flags())?;
                }
                Attribute::Other { kind, value } => {
                    let len = u16::try_from(value.len())
                        .map_err(|_| Error::protocol("stun attribute too long"))?;
                    buf.put_u16(*kind)?;
                    buf.put_u16(len)?;
                    buf.put_slice(value)?;
                    for _ in 0..padding(value.len()) {
                        buf.put_u8(0)?;
                    }
                }
            }
        }

        let body_len = buf.len() - start - HEADER_LEN;
        buf.patch_u16(start + 2, body_len as u16)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = WireBuf::with_capacity(MAX_STUN_MESSAGE_LEN);
        self.encode(&mut buf)?;
        Ok(buf.as_slice().to_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = data;
        let kind = r.wire_u16()?;
        let body_len = r.wire_u16()? as usize;
        let mut transaction_id = [0u8; 16];
        if r.remaining() < transaction_id.len() {
            return Err(Error::IncompleteMessage);
        }
        r.copy_to_slice(&mut transaction_id);

        if r.remaining() < body_len {
            return Err(Error::IncompleteMessage);
        }
        let mut body = &r[..body_len];

        let mut attributes = Vec::new();
        while body.has_remaining() {
            let attr_kind = body.wire_u16()?;
            let attr_len = body.wire_u16()? as usize;
            let padded = attr_len + padding(attr_len);
            if padded > body.remaining() {
                return Err(Error::protocol(format!(
                    "stun attribute {:#06x} overruns message",
                    attr_kind
                )));
            }
            let value = &body[..attr_len];
            let attr = match attr_kind {
                ATTR_MAPPED_ADDRESS => Attribute::MappedAddress(decode_address(value)?),
                ATTR_CHANGED_ADDRESS => Attribute::ChangedAddress(decode_address(value)?),
                ATTR_CHANGE_REQUEST => {
                    let mut v = value;
                    Attribute::ChangeRequest(ChangeRequest::from_flags(v.wire_u32()?))
                }
                kind => Attribute::Other {
                    kind,
                    value: value.to_vec(),
                },
            };
            attributes.push(attr);
            body.advance(padded);
        }

        Ok(Self {
            kind,
            transaction_id,
            attributes,
        })
    }
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn encode_address(buf: &mut WireBuf, kind: u16, addr: &SocketAddrV4) -> Result<()> {
    buf.put_u16(kind)?;
    buf.put_u16(IPV4_ATTR_LEN as u16)?;
    buf.put_u8(0)?;
    buf.put_u8(IPV4_FAMILY)?;
    buf.put_u16(addr.port())?;
    buf.put_slice(&addr.ip().octets())?;
    Ok(())
}

fn decode_address(mut value: &[u8]) -> Result<SocketAddrV4> {
    match value.len() {
        IPV4_ATTR_LEN => {}
        IPV6_ATTR_LEN => return Err(Error::Unsupported("ipv6 stun address")),
        n => return Err(Error::protocol(format!("bad stun address length {}", n))),
    }
    let _pad = value.wire_u8()?;
    let family = value.wire_u8()?;
    let port = value.wire_u16()?;
    match family {
        IPV4_FAMILY => Ok(SocketAddrV4::new(Ipv4Addr::from(value.wire_u32()?), port)),
        IPV6_FAMILY => Err(Error::Unsupported("ipv6 stun address")),
        f => Err(Error::protocol(format!("unknown address family {}", f))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_request_layout() {
        let req = Message::bind_request(ChangeRequest::IP_AND_PORT);
        let bytes = req.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(&bytes[..2], &[0x00, 0x01]);
        assert_eq!(&bytes[2..4], &[0x00, 0x08]);
        assert_eq!(&bytes[4..20], &req.transaction_id);
        assert_eq!(&bytes[20..], &[0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x06]);

        let plain = Message::bind_request(ChangeRequest::NONE).to_bytes().unwrap();
        assert_eq!(plain.len(), HEADER_LEN);
        assert_eq!(&plain[2..4], &[0, 0]);
    }

    #[test]
    fn test_response_addresses() {
        let mapped: SocketAddrV4 = "203.0.113.5:51820".parse().unwrap();
        let changed: SocketAddrV4 = "198.51.100.2:3479".parse().unwrap();
        let resp = Message::bind_response([7; 16], Some(mapped), Some(changed));
        let bytes = resp.to_bytes().unwrap();
        // mapped address attribute body
        assert_eq!(
            &bytes[20..32],
            &[0x00, 0x01, 0x00, 0x08, 0x00, 0x01, 0xca, 0x6c, 203, 0, 113, 5]
        );

        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.kind, BIND_RESPONSE);
        assert_eq!(decoded.transaction_id, [7; 16]);
        assert_eq!(decoded.mapped_address(), Some(mapped));
        assert_eq!(decoded.changed_address(), Some(changed));
    }

    #[test]
    fn test_change_request_decoded() {
        let req = Message::bind_request(ChangeRequest::PORT);
        let decoded = Message::decode(&req.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.change_request(), ChangeRequest::PORT);
        let plain = Message::bind_request(ChangeRequest::NONE);
        let decoded = Message::decode(&plain.to_bytes().unwrap()).unwrap();
        assert!(decoded.change_request().is_empty());
    }

    #[test]
    fn test_ipv6_rejected() {
        let mut bytes = vec![0x01, 0x01, 0x00, 24];
        bytes.extend_from_slice(&[0; 16]);
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 20, 0x00, 0x02, 0x0d, 0x96]);
        bytes.extend_from_slice(&[0; 16]);
        assert!(matches!(
            Message::decode(&bytes),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_unknown_attribute_skipped() {
        let mut resp = Message::bind_response([1; 16], None, None);
        resp.attributes.push(Attribute::Other {
            kind: 0x8022,
            value: b"abcde".to_vec(),
        });
        resp.attributes
            .push(Attribute::MappedAddress("10.0.0.1:1000".parse().unwrap()));
        let bytes = resp.to_bytes().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.mapped_address(), Some("10.0.0.1:1000".parse().unwrap()));
        assert_eq!(decoded, resp);
    }

    #[test]
    fn test_truncated() {
        let resp = Message::bind_response([1; 16], Some("10.0.0.1:1".parse().unwrap()), None);
        let bytes = resp.to_bytes().unwrap();
        assert!(matches!(
            Message::decode(&bytes[..bytes.len() - 2]),
            Err(Error::IncompleteMessage)
        ));
        assert!(matches!(
            Message::decode(&bytes[..10]),
            Err(Error::IncompleteMessage)
        ));
    }
}
