//! Frame layout: `nonce (24) || body length (2, LE) || sealed body`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{HEADER_SIZE, MAX_SEALED_BODY, NONCE_SIZE, ProtocolError, ProtocolResult};

/// Fixed-size header preceding every sealed body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Nonce the body was sealed with
    pub nonce: [u8; NONCE_SIZE],
    /// Length of the sealed body that follows
    pub body_len: u16,
}

impl FrameHeader {
    pub fn new(nonce: [u8; NONCE_SIZE], body_len: u16) -> Self {
        Self { nonce, body_len }
    }

    /// Build a header for a sealed body, rejecting bodies the length field cannot carry
    pub fn for_body(nonce: [u8; NONCE_SIZE], sealed: &[u8]) -> ProtocolResult<Self> {
        let body_len = u16::try_from(sealed.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: sealed.len(),
            max: MAX_SEALED_BODY,
        })?;
        Ok(Self::new(nonce, body_len))
    }

    /// Append the encoded header to `dst`
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.nonce);
        dst.put_u16_le(self.body_len);
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `src`
    pub fn decode(mut src: &[u8]) -> ProtocolResult<Self> {
        if src.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader {
                expected: HEADER_SIZE,
                actual: src.len(),
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        src.copy_to_slice(&mut nonce);
        let body_len = src.get_u16_le();

        Ok(Self { nonce, body_len })
    }

    /// Total frame size on the wire
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.body_len as usize
    }
}

/// Encode a complete frame into one contiguous buffer
///
/// The result is handed to the transport in a single write so the three
/// fields can never interleave with another frame.
pub fn encode_frame(nonce: [u8; NONCE_SIZE], sealed: &[u8]) -> ProtocolResult<Bytes> {
    let header = FrameHeader::for_body(nonce, sealed)?;

    let mut buf = BytesMut::with_capacity(header.frame_len());
    header.encode(&mut buf);
    buf.put_slice(sealed);

    Ok(buf.freeze())
}
