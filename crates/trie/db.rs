use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};

use crate::codec::{Decode, Encode};
use crate::error::TrieError;
use crate::hash::Blake2b256Hash;
use crate::node::Trie;

/// A transactional content-addressed node store. Node writes are idempotent
/// (the hash is determined by the node bytes), so the only state needing
/// mutual exclusion is the working-root cell.
pub trait TrieStore<K, V>: Send + Sync {
    fn begin_read(&self) -> Result<Box<dyn TrieRoTxn<K, V> + '_>, TrieError>;
    fn begin_write(&self) -> Result<Box<dyn TrieRwTxn<K, V> + '_>, TrieError>;

    /// The cell holding the hash of the live root. Writers serialize on it;
    /// readers only snapshot its current value.
    fn working_root(&self) -> &RootCell;
}

pub trait TrieRoTxn<K, V> {
    fn get(&self, hash: &Blake2b256Hash) -> Result<Option<Trie<K, V>>, TrieError>;
}

pub trait TrieRwTxn<K, V>: TrieRoTxn<K, V> {
    fn put(&mut self, hash: Blake2b256Hash, node: &Trie<K, V>) -> Result<(), TrieError>;
    fn commit(self: Box<Self>) -> Result<(), TrieError>;

    fn abort(self: Box<Self>) {}
}

/// Runs `body` inside a read transaction.
pub fn with_read_txn<'s, K, V, S, R, F>(store: &'s S, body: F) -> Result<R, TrieError>
where
    S: TrieStore<K, V> + ?Sized,
    F: FnOnce(&(dyn TrieRoTxn<K, V> + 's)) -> Result<R, TrieError>,
{
    let txn = store.begin_read()?;
    body(txn.as_ref())
}

/// Runs `body` inside a write transaction, committing on success and
/// aborting on any error.
pub fn with_write_txn<'s, K, V, S, R, F>(store: &'s S, body: F) -> Result<R, TrieError>
where
    S: TrieStore<K, V> + ?Sized,
    F: FnOnce(&mut (dyn TrieRwTxn<K, V> + 's)) -> Result<R, TrieError>,
{
    let mut txn = store.begin_write()?;
    match body(txn.as_mut()) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            txn.abort();
            Err(err)
        }
    }
}

#[derive(Debug, Default)]
struct RootState {
    current: Option<Blake2b256Hash>,
    taken: bool,
}

/// Single-slot cell carrying the working root hash. `take` acquires the
/// writer slot (blocking while another writer holds it) and returns the
/// current root; `put` publishes a root and releases the slot. Every exit
/// path of a writer must `put` something back, or the store stays locked.
#[derive(Debug, Default)]
pub struct RootCell {
    state: Mutex<RootState>,
    on_release: Condvar,
}

impl RootCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last published root, read without touching the writer slot.
    pub fn current(&self) -> Result<Option<Blake2b256Hash>, TrieError> {
        Ok(self.state.lock().map_err(|_| TrieError::LockError)?.current)
    }

    pub fn take(&self) -> Result<Blake2b256Hash, TrieError> {
        let mut state = self.state.lock().map_err(|_| TrieError::LockError)?;
        while state.taken {
            state = self
                .on_release
                .wait(state)
                .map_err(|_| TrieError::LockError)?;
        }
        let current = state.current.ok_or(TrieError::RootNotInitialized)?;
        state.taken = true;
        Ok(current)
    }

    pub fn put(&self, hash: Blake2b256Hash) -> Result<(), TrieError> {
        let mut state = self.state.lock().map_err(|_| TrieError::LockError)?;
        state.current = Some(hash);
        state.taken = false;
        self.on_release.notify_one();
        Ok(())
    }
}

type NodeMap = HashMap<Blake2b256Hash, Vec<u8>>;

/// In-memory store over encoded nodes. Read transactions snapshot the map;
/// write transactions stage their puts and apply them on commit.
pub struct InMemoryTrieStore<K, V> {
    inner: Arc<Mutex<NodeMap>>,
    working_root: RootCell,
    phantom: PhantomData<(K, V)>,
}

impl<K, V> InMemoryTrieStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Default::default(),
            working_root: RootCell::new(),
            phantom: PhantomData,
        }
    }
}

impl<K, V> Default for InMemoryTrieStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryRoTxn {
    snapshot: NodeMap,
}

struct InMemoryRwTxn {
    inner: Arc<Mutex<NodeMap>>,
    staged: NodeMap,
}

fn decode_node<K: Decode, V: Decode>(
    bytes: Option<&Vec<u8>>,
) -> Result<Option<Trie<K, V>>, TrieError> {
    bytes
        .map(|bytes| Trie::decode_exact(bytes))
        .transpose()
        .map_err(TrieError::from)
}

impl<K: Decode, V: Decode> TrieRoTxn<K, V> for InMemoryRoTxn {
    fn get(&self, hash: &Blake2b256Hash) -> Result<Option<Trie<K, V>>, TrieError> {
        decode_node(self.snapshot.get(hash))
    }
}

impl<K: Decode, V: Decode> TrieRoTxn<K, V> for InMemoryRwTxn {
    fn get(&self, hash: &Blake2b256Hash) -> Result<Option<Trie<K, V>>, TrieError> {
        if self.staged.contains_key(hash) {
            return decode_node(self.staged.get(hash));
        }
        let inner = self.inner.lock().map_err(|_| TrieError::LockError)?;
        decode_node(inner.get(hash))
    }
}

impl<K: Encode + Decode, V: Encode + Decode> TrieRwTxn<K, V> for InMemoryRwTxn {
    fn put(&mut self, hash: Blake2b256Hash, node: &Trie<K, V>) -> Result<(), TrieError> {
        self.staged.insert(hash, node.encode_to_vec());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), TrieError> {
        let Self { inner, staged } = *self;
        let mut inner = inner.lock().map_err(|_| TrieError::LockError)?;
        inner.extend(staged);
        Ok(())
    }
}

impl<K, V> TrieStore<K, V> for InMemoryTrieStore<K, V>
where
    K: Encode + Decode + Send + Sync,
    V: Encode + Decode + Send + Sync,
{
    fn begin_read(&self) -> Result<Box<dyn TrieRoTxn<K, V> + '_>, TrieError> {
        let snapshot = self.inner.lock().map_err(|_| TrieError::LockError)?.clone();
        Ok(Box::new(InMemoryRoTxn { snapshot }))
    }

    fn begin_write(&self) -> Result<Box<dyn TrieRwTxn<K, V> + '_>, TrieError> {
        Ok(Box::new(InMemoryRwTxn {
            inner: self.inner.clone(),
            staged: HashMap::new(),
        }))
    }

    fn working_root(&self) -> &RootCell {
        &self.working_root
    }
}
