use bytes::BufMut;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid node tag: {0}")]
    InvalidTag(u8),
    #[error("invalid slot marker: {0}")]
    InvalidSlotMarker(u8),
    #[error("trailing bytes after decoding")]
    TrailingBytes,
    #[error("string payload is not valid utf-8")]
    InvalidUtf8,
}

/// Deterministic binary encoding. The bytes produced here are canonical:
/// they drive trie descent and feed the content hash, so two encodings of
/// equal values must be byte-identical.
pub trait Encode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Decoding counterpart of [`Encode`]. Consumes a prefix of the input and
/// returns the remainder.
pub trait Decode: Sized {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError>;

    /// Decodes a value that must span the whole input.
    fn decode_exact(buf: &[u8]) -> Result<Self, CodecError> {
        let (value, rest) = Self::decode(buf)?;
        if !rest.is_empty() {
            return Err(CodecError::TrailingBytes);
        }
        Ok(value)
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if buf.len() < N {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = buf.split_at(N);
        let mut value = [0u8; N];
        value.copy_from_slice(head);
        Ok((value, rest))
    }
}

// Byte strings carry a u32 big-endian length prefix so they stay
// self-delimiting inside a leaf encoding.
impl Encode for Vec<u8> {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self);
    }
}

impl Decode for Vec<u8> {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (len, rest) = u32::decode(buf)?;
        let len = len as usize;
        if rest.len() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let (payload, rest) = rest.split_at(len);
        Ok((payload.to_vec(), rest))
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (payload, rest) = Vec::<u8>::decode(buf)?;
        let value = String::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
        Ok((value, rest))
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (bytes, rest) = <[u8; 4]>::decode(buf)?;
        Ok((u32::from_be_bytes(bytes), rest))
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (bytes, rest) = <[u8; 8]>::decode(buf)?;
        Ok((u64::from_be_bytes(bytes), rest))
    }
}
