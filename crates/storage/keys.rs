//! The persisted key-prefix layout: every key in the flat store
//! starts with one of these tags so unrelated concerns never collide in the
//! same keyspace.

use ethereum_types::H256;

const TRIE_NODE: u8 = b'S';
const CANONICAL_INDEX: u8 = b'T';
const CONTRACT_CODE: u8 = b'C';
const PIVOT_SNAPSHOT: u8 = b'P';

pub fn trie_node(node_key: &H256) -> Vec<u8> {
    prefixed(TRIE_NODE, node_key.as_bytes())
}

pub fn canonical_index(block_number: u64) -> Vec<u8> {
    prefixed(CANONICAL_INDEX, &block_number.to_be_bytes())
}

pub fn contract_code(code_hash: &H256) -> Vec<u8> {
    prefixed(CONTRACT_CODE, code_hash.as_bytes())
}

pub fn pivot_snapshot() -> Vec<u8> {
    vec![PIVOT_SNAPSHOT]
}

fn prefixed(tag: u8, rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + rest.len());
    key.push(tag);
    key.extend_from_slice(rest);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_dont_collide_across_tags() {
        let hash = H256::repeat_byte(0x11);
        assert_ne!(trie_node(&hash)[0], contract_code(&hash)[0]);
        assert_eq!(trie_node(&hash)[0], b'S');
        assert_eq!(contract_code(&hash)[0], b'C');
    }
}
