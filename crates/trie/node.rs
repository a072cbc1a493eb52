use bytes::BufMut;

use crate::codec::{CodecError, Decode, Encode};
use crate::hash::Blake2b256Hash;
use crate::pointer_block::PointerBlock;

const TAG_LEAF: u8 = 0x00;
const TAG_NODE: u8 = 0x01;

/// A node of the radix trie. Internal nodes carry only a [`PointerBlock`];
/// leaves carry a full key so that a leaf may sit at any depth above `L`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trie<K, V> {
    Node(PointerBlock),
    Leaf { key: K, value: V },
}

impl<K: Encode, V: Encode> Trie<K, V> {
    /// Content address of the node: the hash of its canonical encoding.
    /// Structurally equal nodes therefore share a hash.
    pub fn hash(&self) -> Blake2b256Hash {
        Blake2b256Hash::new(&self.encode_to_vec())
    }
}

impl<K: Encode, V: Encode> Encode for Trie<K, V> {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            Trie::Leaf { key, value } => {
                buf.put_u8(TAG_LEAF);
                key.encode(buf);
                value.encode(buf);
            }
            Trie::Node(block) => {
                buf.put_u8(TAG_NODE);
                block.encode(buf);
            }
        }
    }
}

impl<K: Decode, V: Decode> Decode for Trie<K, V> {
    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (tag, rest) = match buf.split_first() {
            Some((tag, rest)) => (*tag, rest),
            None => return Err(CodecError::UnexpectedEof),
        };
        match tag {
            TAG_LEAF => {
                let (key, rest) = K::decode(rest)?;
                let (value, rest) = V::decode(rest)?;
                Ok((Trie::Leaf { key, value }, rest))
            }
            TAG_NODE => {
                let (block, rest) = PointerBlock::decode(rest)?;
                Ok((Trie::Node(block), rest))
            }
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}
