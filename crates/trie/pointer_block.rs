use std::fmt;

use bytes::BufMut;

use crate::codec::{CodecError, Decode, Encode};
use crate::hash::Blake2b256Hash;

const SLOTS: usize = 256;

const SLOT_ABSENT: u8 = 0x00;
const SLOT_PRESENT: u8 = 0x01;

/// The 256-slot child table of an internal node: one optional hash per
/// possible next key byte. All updates are functional.
#[derive(Clone, PartialEq, Eq)]
pub struct PointerBlock(Box<[Option<Blake2b256Hash>; SLOTS]>);

impl PointerBlock {
    /// Creates a block with every slot absent.
    pub fn new() -> Self {
        Self(Box::new([None; SLOTS]))
    }

    pub fn get(&self, index: u8) -> Option<Blake2b256Hash> {
        self.0[index as usize]
    }

    /// Returns a new block with the given slots replaced. All pairs are
    /// applied to `self`, not to intermediate copies, so the order of pairs
    /// with distinct indices does not matter.
    pub fn updated(&self, updates: &[(u8, Option<Blake2b256Hash>)]) -> Self {
        let mut next = self.clone();
        for (index, slot) in updates {
            next.0[*index as usize] = *slot;
        }
        next
    }

    /// Iterates over the occupied slots in index order.
    pub fn children(&self) -> impl Iterator<Item = (u8, Blake2b256Hash)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|hash| (index as u8, hash)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl Default for PointerBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PointerBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.children()).finish()
    }
}

impl Encode for PointerBlock {
    fn encode(&self, buf: &mut dyn BufMut) {
        for slot in self.0.iter() {
            match slot {
                Some(hash) => {
                    buf.put_u8(SLOT_PRESENT);
                    hash.encode(buf);
                }
                None => buf.put_u8(SLOT_ABSENT),
            }
        }
    }
}

impl Decode for PointerBlock {
    fn decode(mut buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let mut block = Self::new();
        for slot in block.0.iter_mut() {
            let (marker, rest) = match buf.split_first() {
                Some((marker, rest)) => (*marker, rest),
                None => return Err(CodecError::UnexpectedEof),
            };
            match marker {
                SLOT_ABSENT => buf = rest,
                SLOT_PRESENT => {
                    let (hash, rest) = Blake2b256Hash::decode(rest)?;
                    *slot = Some(hash);
                    buf = rest;
                }
                other => return Err(CodecError::InvalidSlotMarker(other)),
            }
        }
        Ok((block, buf))
    }
}
