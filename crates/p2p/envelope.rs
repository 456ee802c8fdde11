//! Node envelopes: the range of NodeTags reachable under a
//! partial trie path, and `Decompose`, the function that turns "what's
//! missing from `processed`" into a concrete work list of trie positions.

use ethereum_types::H256;
use snapsync_trie::{Nibbles, Node, NodeRef, Trie, TrieError};

use crate::range_set::{NodeTagRange, NodeTagRangeSet};

/// `{ partialPath, nodeKey, data? }`. `data.is_some()` means the
/// node already resolves locally; `None` means it's a dangling reference
/// that must be fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSpecs {
    pub partial_path: Nibbles,
    pub node_key: H256,
    pub data: Option<Vec<u8>>,
}

/// The NodeTagRange of every key whose 64-nibble path starts with `path`.
pub fn envelope(path: &Nibbles) -> NodeTagRange {
    let mut min = path.as_slice().to_vec();
    min.resize(64, 0x0);
    let mut max = path.as_slice().to_vec();
    max.resize(64, 0xf);
    NodeTagRange::new(Nibbles::from_hex(min).to_fixed_bytes().into(), Nibbles::from_hex(max).to_fixed_bytes().into())
}

/// The intersection of `set` with `node`'s envelope, as its own range set.
pub fn envelope_touched_by(path: &Nibbles, set: &NodeTagRangeSet) -> NodeTagRangeSet {
    let env = envelope(path);
    let mut out = NodeTagRangeSet::new();
    for iv in set.iter() {
        if let Some(cut) = iv.intersection(&env) {
            out.merge(cut);
        }
    }
    out
}

/// Minimal list of `NodeSpecs` whose envelopes are pairwise disjoint, each
/// disjoint from `processed`, whose union is exactly the complement of
/// `processed` restricted to the allocated content of the trie rooted at
/// `root`. This is both the range-fetch work list and the healing seed.
pub fn decompose(trie: &Trie, root: &NodeRef, processed: &NodeTagRangeSet) -> Result<Vec<NodeSpecs>, TrieError> {
    visit(trie, root, Nibbles::empty(), processed)
}

fn visit(trie: &Trie, node_ref: &NodeRef, path: Nibbles, processed: &NodeTagRangeSet) -> Result<Vec<NodeSpecs>, TrieError> {
    let env = envelope(&path);
    if processed.covered(&env) == env.len() {
        return Ok(Vec::new());
    }

    let Some(node) = trie.get_node(node_ref)? else {
        let Some(node_key) = node_ref.as_hash() else { return Ok(Vec::new()) };
        return Ok(vec![NodeSpecs { partial_path: path, node_key, data: None }]);
    };

    match node {
        Node::Leaf(leaf) => {
            let full_path = path.append(&leaf.partial);
            let point = envelope(&full_path);
            if processed.covered(&point) == point.len() {
                Ok(Vec::new())
            } else {
                let resolved = Node::Leaf(leaf.clone());
                Ok(vec![NodeSpecs { partial_path: full_path, node_key: resolved.hash(), data: Some(leaf.value) }])
            }
        }
        Node::Extension(ext) => visit(trie, &ext.child, path.append(&ext.prefix), processed),
        Node::Branch(branch) => {
            let mut out = Vec::new();
            for (nibble, child) in branch.children.iter().enumerate() {
                if child.is_empty() {
                    continue;
                }
                out.extend(visit(trie, child, path.push(nibble as u8), processed)?);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use snapsync_trie::InMemoryTrieDB;

    fn key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn envelope_of_empty_path_is_the_whole_keyspace() {
        let env = envelope(&Nibbles::empty());
        assert_eq!(env, NodeTagRange::full());
    }

    #[test]
    fn envelope_of_one_nibble_is_one_sixteenth_of_the_keyspace() {
        let env = envelope(&Nibbles::from_hex(vec![0]));
        assert_eq!(env.start, H256::zero());
        assert_eq!(env.end.as_bytes()[0], 0x0f);
    }

    #[test]
    fn decompose_of_empty_trie_with_nothing_processed_reports_nothing_allocated() {
        let trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        let processed = NodeTagRangeSet::new();
        let root = NodeRef::empty();
        let missing = decompose(&trie, &root, &processed).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn decompose_reports_every_leaf_until_marked_processed() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        trie.insert(key(1), vec![1]).unwrap();
        trie.insert(key(2), vec![2]).unwrap();
        let root = trie.root_ref().unwrap().clone();

        let empty_processed = NodeTagRangeSet::new();
        let missing = decompose(&trie, &root, &empty_processed).unwrap();
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().all(|m| m.data.is_some()));

        let mut processed = NodeTagRangeSet::new();
        processed.merge(NodeTagRange::full());
        let missing = decompose(&trie, &root, &processed).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn decompose_reports_dangling_children_without_descending() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db.clone());
        trie.insert(key(1), vec![1]).unwrap();
        let root_hash = trie.hash();

        // Re-open the same root against a fresh, empty store: every node is dangling.
        let detached = Trie::open(Arc::new(InMemoryTrieDB::new()), root_hash);
        let processed = NodeTagRangeSet::new();
        let missing = decompose(&detached, detached.root_ref().unwrap(), &processed).unwrap();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].data.is_none());
        assert_eq!(missing[0].node_key, root_hash);
    }
}
