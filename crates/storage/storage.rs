//! # snapsync-storage
//!
//! The persisted key-value layer: a flat byte-key/byte-value
//! store with the prefix scheme the engine relies on (`S·` trie nodes, `T·`
//! canonical block index, `C·` contract bytecode, `P` pivot snapshot), plus
//! an in-memory backend used for tests and as the reference implementation.
//! The underlying engine (mdbx/rocksdb/whatever backs a production node) is
//! assumed correct and out of scope; only this trait boundary is specified.

pub mod error;
pub mod keys;
pub mod kv;
pub mod pivot_snapshot;

pub use error::StorageError;
pub use kv::{InMemoryKvStore, KvStore};
pub use pivot_snapshot::PivotSnapshot;
