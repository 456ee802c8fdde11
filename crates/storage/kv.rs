//! The flat key-value store seam. Every persisted concern of the engine
//! (trie nodes, the canonical index, contract code, the pivot snapshot)
//! writes through this one trait; what actually backs it is out of scope.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use snapsync_trie::{TrieDB, TrieError};

use crate::error::StorageError;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError>;
    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Every stored key starting with `prefix`, in ascending order. Used to
    /// rebuild progress sets on startup by scanning persisted trie nodes and
    /// the pivot snapshot.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// In-memory `KvStore`, the reference backend used by tests and as the
/// target a production KV engine's trait impl mirrors.
#[derive(Default, Clone)]
pub struct InMemoryKvStore {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().map_err(|_| StorageError::LockError)?.get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError> {
        self.inner.lock().map_err(|_| StorageError::LockError)?.insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StorageError> {
        let mut db = self.inner.lock().map_err(|_| StorageError::LockError)?;
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.lock().map_err(|_| StorageError::LockError)?.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let db = self.inner.lock().map_err(|_| StorageError::LockError)?;
        Ok(db
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Adapts any `KvStore` into the trie crate's `TrieDB` seam, namespacing
/// every node blob under the `S·` prefix.
pub struct KvTrieDB<S> {
    store: Arc<S>,
}

impl<S: KvStore> KvTrieDB<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: KvStore> TrieDB for KvTrieDB<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        self.store
            .get(&crate::keys::trie_node(&ethereum_types::H256::from_slice(key)))
            .map_err(|e| TrieError::DbError(e.to_string()))
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.store
            .put(crate::keys::trie_node(&ethereum_types::H256::from_slice(&key)), value)
            .map_err(|e| TrieError::DbError(e.to_string()))
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let namespaced = key_values
            .into_iter()
            .map(|(k, v)| (crate::keys::trie_node(&ethereum_types::H256::from_slice(&k)), v))
            .collect();
        self.store.put_batch(namespaced).map_err(|e| TrieError::DbError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let store = InMemoryKvStore::new();
        store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn scan_prefix_filters_and_stays_sorted() {
        let store = InMemoryKvStore::new();
        store.put(b"Sa".to_vec(), b"1".to_vec()).unwrap();
        store.put(b"Sb".to_vec(), b"2".to_vec()).unwrap();
        store.put(b"Ta".to_vec(), b"3".to_vec()).unwrap();

        let found = store.scan_prefix(b"S").unwrap();
        assert_eq!(found, vec![(b"Sa".to_vec(), b"1".to_vec()), (b"Sb".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn kv_trie_db_namespaces_under_the_trie_node_prefix() {
        let store = Arc::new(InMemoryKvStore::new());
        let trie_db = KvTrieDB::new(store.clone());
        let hash = ethereum_types::H256::repeat_byte(0x42);
        trie_db.put(hash.as_bytes().to_vec(), b"blob".to_vec()).unwrap();
        assert_eq!(trie_db.get(hash.as_bytes()).unwrap(), Some(b"blob".to_vec()));
        assert_eq!(store.get(&crate::keys::trie_node(&hash)).unwrap(), Some(b"blob".to_vec()));
    }
}
