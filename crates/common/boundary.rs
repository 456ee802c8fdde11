//! The JSON-RPC/CORS/JWT surface is an external collaborator: this crate
//! only names the read-only hooks the healing engine calls into it through.
//! No implementation lives here.

use async_trait::async_trait;
use ethereum_types::H256;

use crate::header::{Block, Header};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerView {
    pub state_root: H256,
}

/// Read-only view of chain state the engine consumes; implemented by the
/// JSON-RPC/storage layer that owns canonical-chain bookkeeping.
#[async_trait]
pub trait ChainView: Send + Sync {
    async fn latest_header(&self) -> Header;
    async fn header_by_number(&self, number: u64) -> Option<Header>;
    async fn block_by_hash(&self, hash: H256) -> Option<Block>;
    async fn state_ready(&self, header: &Header) -> bool;
    async fn ledger(&self, state_root: H256) -> Option<LedgerView>;
}
