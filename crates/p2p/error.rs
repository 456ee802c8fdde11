//! Stable error-kind taxonomy. Every operation that can fail
//! returns one of these, tagged — never an exception, never a bare string
//! where a variant already exists. Panics stay reserved for invariants a bug
//! would have to violate (lease accounting, in particular).

use ethereum_types::H256;
use snapsync_trie::{Nibbles, TrieError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("peer {0} timed out")]
    WireTimeout(String),
    #[error("peer {0} disconnected")]
    WireDisconnect(String),
    #[error("peer returned an unverifiable proof for root {0:#x}")]
    BadProof(H256),
    #[error("reconstructed root {got:#x} does not match requested root {want:#x}")]
    RootHashMismatch { want: H256, got: H256 },
    #[error("right boundary proof failed for root {0:#x}")]
    RightBoundaryProofFailed(H256),
    #[error(transparent)]
    DecodeError(#[from] TrieError),
    #[error("trie range under perusal by another inspection")]
    TrieIsLockedForPerusal,
    #[error("cycle detected while walking the trie")]
    TrieLoopAlert,
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("reply for {0:?} was consistent but referenced a missing child")]
    ImportError(Nibbles),
}

impl EngineError {
    /// True for error kinds classed as "peer misbehaved" — these drive a
    /// buddy's error counter toward a ban, as opposed to transient kinds
    /// like `TrieIsLockedForPerusal` which the caller simply retries.
    pub fn counts_against_peer(&self) -> bool {
        matches!(
            self,
            EngineError::WireTimeout(_)
                | EngineError::WireDisconnect(_)
                | EngineError::BadProof(_)
                | EngineError::RootHashMismatch { .. }
                | EngineError::RightBoundaryProofFailed(_)
                | EngineError::DecodeError(_)
        )
    }
}
