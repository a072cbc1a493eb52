use thiserror::Error;

use crate::codec::CodecError;
use crate::hash::Blake2b256Hash;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("node with hash {0} is not present in the store")]
    NodeNotFound(Blake2b256Hash),
    #[error("key is already bound to a different value")]
    KeyAlreadyBound,
    #[error("corrupt trie: {0}")]
    Corrupt(&'static str),
    #[error("working root has not been initialized")]
    RootNotInitialized,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("database error: {0}")]
    Db(anyhow::Error),
    #[error("lock error: panicked while holding a lock")]
    LockError,
}
