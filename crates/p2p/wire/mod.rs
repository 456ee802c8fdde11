//! Wire client adapters. Message shapes, their
//! RLP+snappy codec, and the verified request/response adapters the rest of
//! the engine calls instead of touching peers directly.

pub mod client;
pub mod codec;
pub mod messages;

pub use client::{Transport, WireClient};
pub use codec::{codes, SnapMessage};
pub use messages::{
    AccountRange, AccountRangeUnit, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges,
    GetTrieNodes, StorageRanges, StorageSlot, TrieNodes,
};
