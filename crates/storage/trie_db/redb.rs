use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::error::StoreError;
use rspace_trie::{
    Blake2b256Hash, Decode, Encode, RootCell, Trie, TrieError, TrieRoTxn, TrieRwTxn, TrieStore,
};

const NODES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("trie_nodes");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("trie_meta");

const WORKING_ROOT_KEY: &str = "working_root";

/// Redb implementation of the trie store: one table mapping node hashes to
/// encoded nodes, one meta table carrying the persisted working root.
pub struct RedbTrieStore<K, V> {
    db: Arc<Database>,
    working_root: RootCell,
    phantom: PhantomData<(K, V)>,
}

impl<K, V> RedbTrieStore<K, V> {
    /// Opens (or creates) the database at `path`, creating the tables if
    /// missing and seeding the working-root cell from the persisted root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        {
            txn.open_table(NODES)?;
            txn.open_table(META)?;
        }
        txn.commit()?;

        let working_root = RootCell::new();
        let read = db.begin_read()?;
        let meta = read.open_table(META)?;
        if let Some(guard) = meta.get(WORKING_ROOT_KEY)? {
            let bytes: [u8; Blake2b256Hash::LEN] = guard
                .value()
                .try_into()
                .map_err(|_| StoreError::CorruptRoot)?;
            let root = Blake2b256Hash::from_bytes(bytes);
            working_root.put(root)?;
            debug!(%root, "loaded persisted working root");
        }
        info!(path = %path.as_ref().display(), "opened trie store");

        Ok(Self {
            db: Arc::new(db),
            working_root,
            phantom: PhantomData,
        })
    }

    /// Writes the cell's current root to the meta table. The core never
    /// persists the cell itself; callers pick the checkpoint cadence.
    pub fn persist_root(&self) -> Result<(), StoreError> {
        let Some(root) = self.working_root.current()? else {
            return Ok(());
        };
        let txn = self.db.begin_write()?;
        {
            let mut meta = txn.open_table(META)?;
            meta.insert(WORKING_ROOT_KEY, root.as_bytes().as_slice())?;
        }
        txn.commit()?;
        debug!(%root, "persisted working root");
        Ok(())
    }
}

struct RedbRoTxn {
    txn: redb::ReadTransaction,
}

struct RedbRwTxn {
    txn: redb::WriteTransaction,
}

impl<K: Decode, V: Decode> TrieRoTxn<K, V> for RedbRoTxn {
    fn get(&self, hash: &Blake2b256Hash) -> Result<Option<Trie<K, V>>, TrieError> {
        let table = self
            .txn
            .open_table(NODES)
            .map_err(|e| TrieError::Db(e.into()))?;
        let Some(guard) = table
            .get(hash.as_bytes().as_slice())
            .map_err(|e| TrieError::Db(e.into()))?
        else {
            return Ok(None);
        };
        Ok(Some(Trie::decode_exact(guard.value())?))
    }
}

impl<K: Decode, V: Decode> TrieRoTxn<K, V> for RedbRwTxn {
    fn get(&self, hash: &Blake2b256Hash) -> Result<Option<Trie<K, V>>, TrieError> {
        let table = self
            .txn
            .open_table(NODES)
            .map_err(|e| TrieError::Db(e.into()))?;
        let Some(guard) = table
            .get(hash.as_bytes().as_slice())
            .map_err(|e| TrieError::Db(e.into()))?
        else {
            return Ok(None);
        };
        Ok(Some(Trie::decode_exact(guard.value())?))
    }
}

impl<K: Encode + Decode, V: Encode + Decode> TrieRwTxn<K, V> for RedbRwTxn {
    fn put(&mut self, hash: Blake2b256Hash, node: &Trie<K, V>) -> Result<(), TrieError> {
        let mut table = self
            .txn
            .open_table(NODES)
            .map_err(|e| TrieError::Db(e.into()))?;
        table
            .insert(hash.as_bytes().as_slice(), node.encode_to_vec().as_slice())
            .map_err(|e| TrieError::Db(e.into()))?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), TrieError> {
        self.txn.commit().map_err(|e| TrieError::Db(e.into()))
    }

    fn abort(self: Box<Self>) {
        let _ = self.txn.abort();
    }
}

impl<K, V> TrieStore<K, V> for RedbTrieStore<K, V>
where
    K: Encode + Decode + Send + Sync,
    V: Encode + Decode + Send + Sync,
{
    fn begin_read(&self) -> Result<Box<dyn TrieRoTxn<K, V> + '_>, TrieError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| TrieError::Db(e.into()))?;
        Ok(Box::new(RedbRoTxn { txn }))
    }

    fn begin_write(&self) -> Result<Box<dyn TrieRwTxn<K, V> + '_>, TrieError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| TrieError::Db(e.into()))?;
        Ok(Box::new(RedbRwTxn { txn }))
    }

    fn working_root(&self) -> &RootCell {
        &self.working_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rspace_trie::{initialize, insert, lookup, validate};
    use tempfile::TempDir;

    type Store = RedbTrieStore<[u8; 4], String>;

    fn leaf(key: [u8; 4], value: &str) -> Trie<[u8; 4], String> {
        Trie::Leaf {
            key,
            value: value.to_string(),
        }
    }

    #[test]
    fn nodes_round_trip_through_the_tables() {
        let dir = TempDir::new().unwrap();
        let store: Store = RedbTrieStore::open(dir.path().join("nodes.redb")).unwrap();

        let node = leaf([1, 2, 3, 4], "v");
        let hash = node.hash();

        let mut txn = store.begin_write().unwrap();
        txn.put(hash, &node).unwrap();
        txn.commit().unwrap();

        let txn = store.begin_read().unwrap();
        assert_eq!(txn.get(&hash).unwrap(), Some(node));
    }

    #[test]
    fn aborted_transactions_leave_no_trace() {
        let dir = TempDir::new().unwrap();
        let store: Store = RedbTrieStore::open(dir.path().join("abort.redb")).unwrap();

        let node = leaf([9, 9, 9, 9], "gone");
        let hash = node.hash();

        let mut txn = store.begin_write().unwrap();
        txn.put(hash, &node).unwrap();
        txn.abort();

        let txn = store.begin_read().unwrap();
        assert_eq!(txn.get(&hash).unwrap(), None);
    }

    #[test]
    fn bindings_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trie.redb");

        {
            let store: Store = RedbTrieStore::open(&path).unwrap();
            initialize(&store).unwrap();
            insert(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a".to_string()).unwrap();
            insert(&store, [0xDE, 0xAD, 0xBE, 0x00], "b".to_string()).unwrap();
            store.persist_root().unwrap();
        }

        let store: Store = RedbTrieStore::open(&path).unwrap();
        assert_eq!(
            lookup(&store, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap(),
            Some("a".to_string())
        );
        assert_eq!(
            lookup(&store, &[0xDE, 0xAD, 0xBE, 0x00]).unwrap(),
            Some("b".to_string())
        );
        // Full closure of the persisted root resolves after reopen.
        assert_eq!(validate(&store).unwrap(), 6);
    }

    #[test]
    fn unpersisted_root_is_not_recovered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("volatile.redb");

        {
            let store: Store = RedbTrieStore::open(&path).unwrap();
            initialize(&store).unwrap();
            insert(&store, [1, 2, 3, 4], "a".to_string()).unwrap();
            // No persist_root: the cell is in-memory only.
        }

        let store: Store = RedbTrieStore::open(&path).unwrap();
        assert_eq!(store.working_root().current().unwrap(), None);
        assert_eq!(lookup(&store, &[1, 2, 3, 4]).unwrap(), None);
    }
}
