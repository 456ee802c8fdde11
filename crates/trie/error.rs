use ethereum_types::H256;
use snapsync_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("trie node verification failed: {0}")]
    Verify(String),
    #[error("node with hash {0:#x} not found in the store")]
    NodeNotFound(H256),
    #[error("decoded bytes at {0:#x} are not a well-formed trie node")]
    DecodeError(H256),
    #[error("cycle detected while walking the trie (loop through extension nodes)")]
    TrieLoopAlert,
    #[error("lock poisoned while accessing trie state")]
    LockError,
    #[error("database error: {0}")]
    DbError(String),
}
