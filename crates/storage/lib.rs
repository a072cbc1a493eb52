mod trie_db;

pub mod error;

pub use error::StoreError;
pub use trie_db::redb::RedbTrieStore;
