//! # snapsync-crypto
//!
//! Hash primitives consumed by the trie and wire layers. The engine only
//! needs Keccak-256: account/storage keys, trie node hashes and bytecode
//! hashes are all keccak digests.
//!
//! ## Quick start
//!
//! ```rust
//! use snapsync_crypto::keccak::{keccak_hash, Keccak256};
//!
//! let hash = keccak_hash(b"hello");
//! let hash2 = Keccak256::new().update(b"hello").finalize();
//! assert_eq!(hash, hash2);
//! ```

pub mod keccak;

pub use keccak::{keccak, keccak_hash};
