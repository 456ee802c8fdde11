//! Wire message shapes for the four snap/1 requests the engine issues
//! (compatible with eth/66+ and snap/1). These are plain data —
//! encoding lives in [`super::codec`], verification in [`super::client`].

use bytes::Bytes;
use ethereum_types::{H256, U256};

use snapsync_common::AccountState;

/// `GetAccountRange`: request every account in `[starting_hash, limit_hash]`
/// under `root_hash`, capped at `response_bytes`.
#[derive(Debug, Clone)]
pub struct GetAccountRange {
    pub id: u64,
    pub root_hash: H256,
    pub starting_hash: H256,
    pub limit_hash: H256,
    pub response_bytes: u64,
}

/// A single entry in an `AccountRange` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRangeUnit {
    pub hash: H256,
    pub account: AccountState,
}

/// Reply to `GetAccountRange`: a sorted run of accounts plus the Merkle
/// proof bracketing it (empty `proof` asserts the reply is the entire trie).
#[derive(Debug, Clone)]
pub struct AccountRange {
    pub id: u64,
    pub accounts: Vec<AccountRangeUnit>,
    pub proof: Vec<Bytes>,
}

/// `GetStorageRanges`: request `[starting_hash, limit_hash]` of each
/// account's storage trie under `root_hash`.
#[derive(Debug, Clone)]
pub struct GetStorageRanges {
    pub id: u64,
    pub root_hash: H256,
    pub account_hashes: Vec<H256>,
    pub starting_hash: H256,
    pub limit_hash: H256,
    pub response_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    pub hash: H256,
    pub data: U256,
}

/// Reply to `GetStorageRanges`: one slot list per requested account, in
/// order. Only the last list may be truncated, in which case `proof` proves
/// its boundary; earlier lists are complete and re-hashed against each
/// account's own `storageRoot`.
#[derive(Debug, Clone)]
pub struct StorageRanges {
    pub id: u64,
    pub slots: Vec<Vec<StorageSlot>>,
    pub proof: Vec<Bytes>,
}

/// `GetByteCodes`: request contract bytecode by keccak hash.
#[derive(Debug, Clone)]
pub struct GetByteCodes {
    pub id: u64,
    pub hashes: Vec<H256>,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ByteCodes {
    pub id: u64,
    pub codes: Vec<Bytes>,
}

/// `GetTrieNodes`: request individual trie nodes by path. Each inner `Vec`
/// is either `[account_path]` (a node in the accounts trie) or
/// `[account_path, slot_path]` (a node in that account's storage trie).
#[derive(Debug, Clone)]
pub struct GetTrieNodes {
    pub id: u64,
    pub root_hash: H256,
    pub paths: Vec<Vec<Bytes>>,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct TrieNodes {
    pub id: u64,
    pub nodes: Vec<Bytes>,
}
