//! Thin stand-ins for block header/body types. The healing engine only
//! needs to name these types at its boundary with the (out-of-scope)
//! JSON-RPC surface — it never constructs, hashes or validates them itself.

use ethereum_types::{H256, U256};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
    pub parent_hash: H256,
    pub state_root: H256,
    pub difficulty: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transaction_count: usize,
}
