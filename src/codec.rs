//! Network byte order encode/decode primitives.
//!
//! [`WireBuf`] is a bounded write buffer: every `put_*` returns the advanced
//! write cursor, or [`Error::CapacityExceeded`] when the message would not fit.
//! [`WireRead`] adds checked reads on top of [`bytes::Buf`], reporting
//! [`Error::IncompleteMessage`] when the input runs short.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Largest punch server message we build or accept.
pub const MAX_MESSAGE_LEN: usize = 512;

/// Largest STUN datagram we build or accept.
pub const MAX_STUN_MESSAGE_LEN: usize = 512;

#[derive(Debug)]
pub struct WireBuf {
    buf: BytesMut,
    cap: usize,
}

impl WireBuf {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap),
            cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn reserve(&self, n: usize) -> Result<()> {
        let required = self.buf.len() + n;
        if required > self.cap {
            return Err(Error::CapacityExceeded {
                cap: self.cap,
                required,
            });
        }
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<usize> {
        self.reserve(1)?;
        self.buf.put_u8(v);
        Ok(self.buf.len())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<usize> {
        self.reserve(2)?;
        self.buf.put_u16(v);
        Ok(self.buf.len())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<usize> {
        self.reserve(4)?;
        self.buf.put_u32(v);
        Ok(self.buf.len())
    }

    pub fn put_slice(&mut self, v: &[u8]) -> Result<usize> {
        self.reserve(v.len())?;
        self.buf.put_slice(v);
        Ok(self.buf.len())
    }

    /// Overwrites a u16 already written at `pos`, used for length fields
    /// that are only known once the body is encoded.
    pub fn patch_u16(&mut self, pos: usize, v: u16) -> Result<()> {
        if pos + 2 > self.buf.len() {
            return Err(Error::CapacityExceeded {
                cap: self.buf.len(),
                required: pos + 2,
            });
        }
        self.buf[pos..pos + 2].copy_from_slice(&v.to_be_bytes());
        Ok(())
    }
}

/// Checked reads for any [`Buf`].
pub trait WireRead: Buf {
    fn wire_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(Error::IncompleteMessage);
        }
        Ok(self.get_u8())
    }

    fn wire_u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(Error::IncompleteMessage);
        }
        Ok(self.get_u16())
    }

    fn wire_u32(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(Error::IncompleteMessage);
        }
        Ok(self.get_u32())
    }

    fn wire_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.remaining() < n {
            return Err(Error::IncompleteMessage);
        }
        let mut v = vec![0; n];
        self.copy_to_slice(&mut v);
        Ok(v)
    }
}

impl<B: Buf + ?Sized> WireRead for B {}

/// Lowercase hex, space separated, for trace logging of wire traffic.
pub(crate) fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
