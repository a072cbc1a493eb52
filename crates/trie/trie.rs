//! Persistent, content-addressed radix trie used as the key-value index of
//! an RSpace tuple-space store. Every insertion produces a new immutable
//! root hash; the live root is tracked by a single-slot cell that also
//! serializes writers.

pub mod codec;
pub mod db;
pub mod error;
mod hash;
mod node;
mod pointer_block;

use std::cmp::Ordering;

pub use self::codec::{CodecError, Decode, Encode};
pub use self::db::{
    with_read_txn, with_write_txn, InMemoryTrieStore, RootCell, TrieRoTxn, TrieRwTxn, TrieStore,
};
pub use self::error::TrieError;
pub use self::hash::Blake2b256Hash;
pub use self::node::Trie;
pub use self::pointer_block::PointerBlock;

/// Parent chain collected during descent, child-first: each entry is the
/// slot index taken and the pointer block it was taken from.
type Parents = Vec<(u8, PointerBlock)>;

/// Writes an empty root node and publishes its hash as the working root.
/// On a store that already holds a trie this overwrites the working root.
pub fn initialize<K, V, S>(store: &S) -> Result<Blake2b256Hash, TrieError>
where
    K: Encode,
    V: Encode,
    S: TrieStore<K, V> + ?Sized,
{
    let root: Trie<K, V> = Trie::Node(PointerBlock::new());
    let hash = root.hash();
    with_write_txn(store, |txn| txn.put(hash, &root))?;
    store.working_root().put(hash)?;
    Ok(hash)
}

/// Looks up a key under the current working root. Readers never touch the
/// writer slot; they snapshot the published root and read through a read
/// transaction.
pub fn lookup<K, V, S>(store: &S, key: &K) -> Result<Option<V>, TrieError>
where
    K: Encode + PartialEq,
    S: TrieStore<K, V> + ?Sized,
{
    let Some(root_hash) = store.working_root().current()? else {
        return Ok(None);
    };
    let path = key.encode_to_vec();
    with_read_txn(store, |txn| {
        let Some(mut node) = txn.get(&root_hash)? else {
            return Ok(None);
        };
        let mut depth = 0;
        loop {
            match node {
                Trie::Leaf { key: stored, value } => {
                    return Ok((stored == *key).then_some(value));
                }
                Trie::Node(block) => {
                    let index = *path
                        .get(depth)
                        .ok_or(TrieError::Corrupt("descent ran past the end of the key"))?;
                    let Some(child) = block.get(index) else {
                        return Ok(None);
                    };
                    node = txn.get(&child)?.ok_or(TrieError::NodeNotFound(child))?;
                    depth += 1;
                }
            }
        }
    })
}

/// Inserts a binding and publishes the resulting root hash.
///
/// Takes the working-root cell for the whole operation, so concurrent
/// insertions are linearized; every exit path puts a root back into the
/// cell. Re-inserting an existing `(key, value)` is a no-op that republishes
/// the current root. Re-inserting an existing key with a *different* value
/// fails with [`TrieError::KeyAlreadyBound`].
pub fn insert<K, V, S>(store: &S, key: K, value: V) -> Result<Blake2b256Hash, TrieError>
where
    K: Encode,
    V: Encode,
    S: TrieStore<K, V> + ?Sized,
{
    let cell = store.working_root();
    let current_root = cell.take()?;
    let outcome = with_write_txn(store, |txn| insert_at_root(txn, current_root, key, value));
    match outcome {
        Ok(Some(new_root)) => {
            cell.put(new_root)?;
            Ok(new_root)
        }
        Ok(None) => {
            cell.put(current_root)?;
            Ok(current_root)
        }
        Err(err) => {
            // The cell must be restored on every failure path or the store
            // stays locked for all future writers.
            let _ = cell.put(current_root);
            Err(err)
        }
    }
}

/// Walks the closure of the current working root, resolving every child
/// hash, and returns the number of reachable nodes. A dangling reference
/// surfaces as [`TrieError::NodeNotFound`].
pub fn validate<K, V, S>(store: &S) -> Result<usize, TrieError>
where
    S: TrieStore<K, V> + ?Sized,
{
    let Some(root_hash) = store.working_root().current()? else {
        return Ok(0);
    };
    with_read_txn(store, |txn| {
        let mut pending = vec![root_hash];
        let mut visited = 0;
        while let Some(hash) = pending.pop() {
            let node = txn.get(&hash)?.ok_or(TrieError::NodeNotFound(hash))?;
            visited += 1;
            if let Trie::Node(block) = node {
                pending.extend(block.children().map(|(_, child)| child));
            }
        }
        Ok(visited)
    })
}

/// Insertion body, run inside one write transaction. Returns the new root
/// hash, or `None` when the binding was already present.
fn insert_at_root<K, V>(
    txn: &mut (dyn TrieRwTxn<K, V> + '_),
    root_hash: Blake2b256Hash,
    key: K,
    value: V,
) -> Result<Option<Blake2b256Hash>, TrieError>
where
    K: Encode,
    V: Encode,
{
    let root = txn
        .get(&root_hash)?
        .ok_or(TrieError::NodeNotFound(root_hash))?;

    let path = key.encode_to_vec();
    let leaf = Trie::Leaf { key, value };
    let leaf_hash = leaf.hash();
    txn.put(leaf_hash, &leaf)?;

    let (tip, parents) = get_parents(&*txn, &path, root)?;
    match &tip {
        Trie::Leaf { key: existing, .. } => {
            let tip_hash = tip.hash();
            if tip_hash == leaf_hash {
                // Same (key, value); the current root already encodes it.
                return Ok(None);
            }
            let existing_path = existing.encode_to_vec();
            let shared = common_prefix(&path, &existing_path);
            let divergent = match shared.len().cmp(&path.len()) {
                Ordering::Less => shared.len(),
                Ordering::Equal => return Err(TrieError::KeyAlreadyBound),
                Ordering::Greater => {
                    return Err(TrieError::Corrupt("shared prefix is longer than the key"))
                }
            };
            if divergent >= existing_path.len() {
                return Err(TrieError::Corrupt("key encodings do not share a fixed length"));
            }
            if parents.len() > shared.len() {
                return Err(TrieError::Corrupt(
                    "parent chain is longer than the shared prefix",
                ));
            }

            // Both leaves hang off a fresh node at the divergence depth.
            let head = Trie::Node(PointerBlock::new().updated(&[
                (path[divergent], Some(leaf_hash)),
                (existing_path[divergent], Some(tip_hash)),
            ]));

            // Shared-prefix bytes not yet covered by the traversed parents
            // become a chain of empty internals, deepest first, so the fold
            // in `rehash` threads the head hash up through them.
            let mut nodes: Parents = shared[parents.len()..]
                .iter()
                .rev()
                .map(|&byte| (byte, PointerBlock::new()))
                .collect();
            nodes.extend(parents);

            commit_chain(txn, head, nodes).map(Some)
        }
        Trie::Node(block) => {
            // Descent stopped on an empty slot of an internal node.
            let index = *path
                .get(parents.len())
                .ok_or(TrieError::Corrupt("descent ran past the end of the key"))?;
            let head = Trie::Node(block.updated(&[(index, Some(leaf_hash))]));
            commit_chain(txn, head, parents).map(Some)
        }
    }
}

/// Descends along `path` from `root`, collecting each traversed internal
/// node with the slot index taken, child-first. Stops on a leaf or on an
/// empty slot; the terminal node is returned as the tip.
fn get_parents<K, V, T>(
    txn: &T,
    path: &[u8],
    root: Trie<K, V>,
) -> Result<(Trie<K, V>, Parents), TrieError>
where
    T: TrieRoTxn<K, V> + ?Sized,
{
    let mut parents = Parents::new();
    let mut current = root;
    loop {
        match current {
            leaf @ Trie::Leaf { .. } => {
                parents.reverse();
                return Ok((leaf, parents));
            }
            Trie::Node(block) => {
                let index = *path
                    .get(parents.len())
                    .ok_or(TrieError::Corrupt("descent ran past the end of the key"))?;
                match block.get(index) {
                    None => {
                        parents.reverse();
                        return Ok((Trie::Node(block), parents));
                    }
                    Some(child) => {
                        let node = txn.get(&child)?.ok_or(TrieError::NodeNotFound(child))?;
                        parents.push((index, block));
                        current = node;
                    }
                }
            }
        }
    }
}

fn common_prefix<'a>(a: &'a [u8], b: &[u8]) -> &'a [u8] {
    let len = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    &a[..len]
}

/// Folds child-first over `nodes`, rewriting each parent's slot to point at
/// the hash produced one step below. The returned chain starts at `head`
/// and ends with the new root.
fn rehash<K, V>(head: Trie<K, V>, nodes: Parents) -> Vec<(Blake2b256Hash, Trie<K, V>)>
where
    K: Encode,
    V: Encode,
{
    let mut chain = Vec::with_capacity(nodes.len() + 1);
    let mut last = head.hash();
    chain.push((last, head));
    for (index, block) in nodes {
        let node = Trie::Node(block.updated(&[(index, Some(last))]));
        last = node.hash();
        chain.push((last, node));
    }
    chain
}

fn insert_tries<K, V>(
    txn: &mut (dyn TrieRwTxn<K, V> + '_),
    chain: &[(Blake2b256Hash, Trie<K, V>)],
) -> Result<(), TrieError> {
    for (hash, node) in chain {
        txn.put(*hash, node)?;
    }
    Ok(())
}

fn commit_chain<K, V>(
    txn: &mut (dyn TrieRwTxn<K, V> + '_),
    head: Trie<K, V>,
    nodes: Parents,
) -> Result<Blake2b256Hash, TrieError>
where
    K: Encode,
    V: Encode,
{
    let chain = rehash(head, nodes);
    insert_tries(txn, &chain)?;
    let (new_root, _) = chain
        .last()
        .ok_or(TrieError::Corrupt("empty rehash chain"))?;
    Ok(*new_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Store = InMemoryTrieStore<[u8; 4], String>;
    type TestTrie = Trie<[u8; 4], String>;

    fn initialized() -> Store {
        let store = Store::new();
        initialize(&store).unwrap();
        store
    }

    fn put(store: &Store, key: [u8; 4], value: &str) -> Blake2b256Hash {
        insert(store, key, value.to_string()).unwrap()
    }

    fn get(store: &Store, key: [u8; 4]) -> Option<String> {
        lookup(store, &key).unwrap()
    }

    fn fetch(store: &Store, hash: Blake2b256Hash) -> TestTrie {
        let txn = store.begin_read().unwrap();
        txn.get(&hash).unwrap().unwrap()
    }

    fn child_of(store: &Store, node: &TestTrie, index: u8) -> TestTrie {
        let TestTrie::Node(block) = node else {
            panic!("expected an internal node");
        };
        fetch(store, block.get(index).unwrap())
    }

    #[test]
    fn lookup_on_empty_trie_returns_none() {
        let store = initialized();
        assert_eq!(get(&store, [0, 0, 0, 0]), None);
    }

    #[test]
    fn lookup_before_initialize_returns_none() {
        let store = Store::new();
        assert_eq!(get(&store, [0, 0, 0, 0]), None);
    }

    #[test]
    fn insert_before_initialize_fails() {
        let store = Store::new();
        let result = insert(&store, [1, 2, 3, 4], "a".to_string());
        assert!(matches!(result, Err(TrieError::RootNotInitialized)));
    }

    #[test]
    fn inserted_key_is_found() {
        let store = initialized();
        put(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a");
        assert_eq!(get(&store, [0xDE, 0xAD, 0xBE, 0xEF]), Some("a".to_string()));
        // Shares all but the last byte with the stored key.
        assert_eq!(get(&store, [0xDE, 0xAD, 0xBE, 0xF0]), None);
    }

    #[test]
    fn reinserting_the_same_binding_keeps_the_root() {
        let store = initialized();
        let first = put(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a");
        let second = put(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a");
        assert_eq!(first, second);
        assert_eq!(store.working_root().current().unwrap(), Some(first));
    }

    #[test]
    fn divergence_at_the_last_byte_splits_at_depth_three() {
        let store = initialized();
        put(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a");
        let root_hash = put(&store, [0xDE, 0xAD, 0xBE, 0x00], "b");

        assert_eq!(get(&store, [0xDE, 0xAD, 0xBE, 0xEF]), Some("a".to_string()));
        assert_eq!(get(&store, [0xDE, 0xAD, 0xBE, 0x00]), Some("b".to_string()));

        // The shared prefix 0xDE 0xAD 0xBE materializes as a chain of
        // internals ending in a single split node holding both leaves.
        let root = fetch(&store, root_hash);
        let depth1 = child_of(&store, &root, 0xDE);
        let depth2 = child_of(&store, &depth1, 0xAD);
        let split = child_of(&store, &depth2, 0xBE);
        let TestTrie::Node(block) = &split else {
            panic!("expected the split node to be internal");
        };
        assert_eq!(block.children().count(), 2);
        assert!(matches!(child_of(&store, &split, 0xEF), TestTrie::Leaf { .. }));
        assert!(matches!(child_of(&store, &split, 0x00), TestTrie::Leaf { .. }));

        // root + three internals + two leaves
        assert_eq!(validate(&store).unwrap(), 6);
    }

    #[test]
    fn divergence_at_the_first_byte_splits_at_the_root() {
        let store = initialized();
        put(&store, [0x00, 0x00, 0x00, 0x01], "a");
        let root_hash = put(&store, [0xFF, 0x00, 0x00, 0x01], "b");

        let root = fetch(&store, root_hash);
        let TestTrie::Node(block) = &root else {
            panic!("expected an internal root");
        };
        assert_eq!(block.children().count(), 2);
        assert!(matches!(child_of(&store, &root, 0x00), TestTrie::Leaf { .. }));
        assert!(matches!(child_of(&store, &root, 0xFF), TestTrie::Leaf { .. }));

        assert_eq!(get(&store, [0x00, 0x00, 0x00, 0x01]), Some("a".to_string()));
        assert_eq!(get(&store, [0xFF, 0x00, 0x00, 0x01]), Some("b".to_string()));
        assert_eq!(validate(&store).unwrap(), 3);
    }

    #[test]
    fn rebinding_a_key_fails_and_restores_the_root() {
        let store = initialized();
        let first = put(&store, [0xDE, 0xAD, 0xBE, 0xEF], "a");

        let result = insert(&store, [0xDE, 0xAD, 0xBE, 0xEF], "b".to_string());
        assert!(matches!(result, Err(TrieError::KeyAlreadyBound)));
        assert_eq!(store.working_root().current().unwrap(), Some(first));
        assert_eq!(get(&store, [0xDE, 0xAD, 0xBE, 0xEF]), Some("a".to_string()));

        // The cell was restored, so the next writer is not locked out.
        put(&store, [0x01, 0x02, 0x03, 0x04], "c");
        assert_eq!(get(&store, [0x01, 0x02, 0x03, 0x04]), Some("c".to_string()));
    }

    #[test]
    fn insertion_order_does_not_change_the_root() {
        let pairs = [
            ([0xDE, 0xAD, 0xBE, 0xEF], "a"),
            ([0xDE, 0xAD, 0xBE, 0x00], "b"),
            ([0xDE, 0xAD, 0x00, 0x00], "c"),
            ([0x00, 0x00, 0x00, 0x01], "d"),
            ([0xFF, 0x00, 0x00, 0x01], "e"),
        ];

        let forward = initialized();
        for (key, value) in pairs {
            put(&forward, key, value);
        }

        let backward = initialized();
        for (key, value) in pairs.iter().rev() {
            put(&backward, *key, value);
        }

        assert_eq!(
            forward.working_root().current().unwrap(),
            backward.working_root().current().unwrap()
        );
    }

    #[test]
    fn earlier_roots_remain_readable_through_the_store() {
        let store = initialized();
        let first_root = put(&store, [0xAA, 0xBB, 0xCC, 0xDD], "a");
        put(&store, [0xAA, 0xBB, 0xCC, 0x00], "b");

        // Nodes are immutable once stored, so the superseded root still
        // resolves to its full closure.
        let old_root = fetch(&store, first_root);
        assert!(matches!(
            child_of(&store, &old_root, 0xAA),
            TestTrie::Leaf { .. }
        ));
    }
}
