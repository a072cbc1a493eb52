use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::codec::{CodecError, Decode, Encode};

type Blake2b256 = Blake2b<U32>;

/// 32-byte Blake2b-256 digest used as a content address. Ordering is byte
/// lexicographic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blake2b256Hash([u8; 32]);

impl Blake2b256Hash {
    pub const LEN: usize = 32;

    /// Hashes the given bytes.
    pub fn new(bytes: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Blake2b256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake2b256Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Blake2b256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Encode for Blake2b256Hash {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Decode for Blake2b256Hash {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (bytes, rest) = <[u8; Blake2b256Hash::LEN]>::decode(buf)?;
        Ok((Self(bytes), rest))
    }
}
