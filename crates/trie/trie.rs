//! # snapsync-trie
//!
//! A hexary Merkle-Patricia trie over 32-byte keys (account hashes, storage
//! slot hashes) — the data structure every component of the sync engine
//! reads, writes or walks. Nodes persist under their Keccak hash
//! (`S·<nodeKey>` in the key-value store); `keccak(data) == nodeKey` is an
//! invariant of everything this crate writes.
//!
//! This crate only supports inserting and reading; snap sync never deletes
//! trie nodes, it only ever fills gaps toward a known target root.

pub mod db;
pub mod error;
pub mod nibbles;
pub mod node;
pub mod verify_range;

use std::sync::Arc;

use ethereum_types::H256;
use snapsync_rlp::decode::RLPDecode;

pub use db::{InMemoryTrieDB, TrieDB};
pub use error::TrieError;
pub use nibbles::Nibbles;
pub use node::{BranchNode, ExtensionNode, LeafNode, Node, NodeRef};
pub use verify_range::verify_range;

use snapsync_crypto::keccak;

/// Keccak hash of the RLP encoding of the empty string (`0x80`) — the root
/// hash of a trie with no entries.
pub fn empty_trie_hash() -> H256 {
    keccak([0x80u8])
}

/// A Merkle-Patricia trie backed by a [`TrieDB`].
#[derive(Clone)]
pub struct Trie {
    root: Option<NodeRef>,
    db: Arc<dyn TrieDB>,
}

impl Trie {
    /// A fresh, empty trie over `db`.
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self { root: None, db }
    }

    /// Opens a trie at an already-known root. The root node need not be
    /// present in `db` yet — callers (range-fetch, healing) populate nodes
    /// incrementally toward this target.
    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Self {
        if root == empty_trie_hash() {
            Self::new(db)
        } else {
            Self { root: Some(NodeRef::Hash(root)), db }
        }
    }

    pub fn db(&self) -> &Arc<dyn TrieDB> {
        &self.db
    }

    pub fn root_ref(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    /// The trie's current root hash (`empty_trie_hash()` if it has no entries).
    pub fn hash(&self) -> H256 {
        match &self.root {
            None => empty_trie_hash(),
            Some(NodeRef::Hash(h)) => *h,
            Some(NodeRef::Embedded(bytes)) => keccak(bytes),
        }
    }

    /// Resolves a `NodeRef` to its `Node`, reading through the store for
    /// hashed references. Returns `Ok(None)` only for an empty reference
    /// (there is no node there, not a dangling one).
    pub fn get_node(&self, node_ref: &NodeRef) -> Result<Option<Node>, TrieError> {
        match node_ref {
            NodeRef::Embedded(bytes) if bytes.is_empty() => Ok(None),
            NodeRef::Embedded(bytes) => Ok(Some(Node::decode(bytes)?)),
            NodeRef::Hash(hash) => match self.db.get(hash.as_bytes())? {
                Some(bytes) => {
                    if keccak(&bytes) != *hash {
                        return Err(TrieError::DecodeError(*hash));
                    }
                    Ok(Some(Node::decode(&bytes)?))
                }
                // not an error: the caller (inspector/healer) is precisely
                // the code that distinguishes "absent" from "resolved".
                None => Ok(None),
            },
        }
    }

    /// True if `node_ref` is a hash reference whose target is not in the store.
    pub fn is_dangling(&self, node_ref: &NodeRef) -> Result<bool, TrieError> {
        match node_ref {
            NodeRef::Embedded(_) => Ok(false),
            NodeRef::Hash(hash) => Ok(self.db.get(hash.as_bytes())?.is_none()),
        }
    }

    fn persist(&self, node: &Node) -> Result<NodeRef, TrieError> {
        let encoded = node.encode_raw();
        if encoded.len() < 32 {
            return Ok(NodeRef::Embedded(encoded));
        }
        let hash = keccak(&encoded);
        self.db.put(hash.as_bytes().to_vec(), encoded)?;
        Ok(NodeRef::Hash(hash))
    }

    pub fn get(&self, key: &H256) -> Result<Option<Vec<u8>>, TrieError> {
        let path = Nibbles::from_bytes(key.as_bytes());
        match &self.root {
            None => Ok(None),
            Some(root) => self.get_at(root, &path),
        }
    }

    fn get_at(&self, node_ref: &NodeRef, path: &Nibbles) -> Result<Option<Vec<u8>>, TrieError> {
        let Some(node) = self.get_node(node_ref)? else {
            return Ok(None);
        };
        match node {
            Node::Leaf(leaf) => Ok((leaf.partial == *path).then_some(leaf.value)),
            Node::Extension(ext) => {
                if path.starts_with(&ext.prefix) {
                    self.get_at(&ext.child, &path.skip_prefix(ext.prefix.len()))
                } else {
                    Ok(None)
                }
            }
            Node::Branch(branch) => {
                if path.is_empty() {
                    Ok((!branch.value.is_empty()).then_some(branch.value))
                } else {
                    let nibble = path.at(0) as usize;
                    self.get_at(&branch.children[nibble], &path.skip_prefix(1))
                }
            }
        }
    }

    /// Inserts `value` at `key`, persisting every newly-created node and
    /// updating the root. Existing nodes on the untouched part of the trie
    /// are left alone (and, if they were only hash references, never read).
    pub fn insert(&mut self, key: H256, value: Vec<u8>) -> Result<(), TrieError> {
        let path = Nibbles::from_bytes(key.as_bytes());
        let new_root = match self.root.take() {
            None => self.insert_at(None, &path, value)?,
            Some(root) => self.insert_at(Some(root), &path, value)?,
        };
        self.root = Some(new_root);
        Ok(())
    }

    fn insert_at(
        &self,
        node_ref: Option<NodeRef>,
        path: &Nibbles,
        value: Vec<u8>,
    ) -> Result<NodeRef, TrieError> {
        let node = match &node_ref {
            Some(r) => self.get_node(r)?,
            None => None,
        };
        match node {
            None => self.persist(&Node::Leaf(LeafNode { partial: path.clone(), value })),
            Some(Node::Leaf(leaf)) => self.insert_into_leaf(leaf, path, value),
            Some(Node::Extension(ext)) => self.insert_into_extension(ext, path, value),
            Some(Node::Branch(branch)) => self.insert_into_branch(*branch, path, value),
        }
    }

    fn insert_into_leaf(&self, leaf: LeafNode, path: &Nibbles, value: Vec<u8>) -> Result<NodeRef, TrieError> {
        if leaf.partial == *path {
            return self.persist(&Node::Leaf(LeafNode { partial: path.clone(), value }));
        }
        let common = leaf.partial.count_prefix(path);
        let common_prefix = path.take_prefix(common);
        let left_rest = leaf.partial.skip_prefix(common);
        let right_rest = path.skip_prefix(common);

        let mut children: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::empty());
        let mut branch_value = Vec::new();
        self.place_leaf(&mut children, &mut branch_value, &left_rest, leaf.value)?;
        self.place_leaf(&mut children, &mut branch_value, &right_rest, value)?;

        let branch_ref = self.persist(&Node::Branch(Box::new(BranchNode { children, value: branch_value })))?;
        self.maybe_wrap_extension(common_prefix, branch_ref)
    }

    fn insert_into_extension(
        &self,
        ext: ExtensionNode,
        path: &Nibbles,
        value: Vec<u8>,
    ) -> Result<NodeRef, TrieError> {
        let common = ext.prefix.count_prefix(path);
        if common == ext.prefix.len() {
            let new_child = self.insert_at(Some(ext.child), &path.skip_prefix(common), value)?;
            return self.persist(&Node::Extension(ExtensionNode { prefix: ext.prefix, child: new_child }));
        }
        let common_prefix = path.take_prefix(common);
        let left_rest = ext.prefix.skip_prefix(common);
        let right_rest = path.skip_prefix(common);

        let mut children: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::empty());
        let mut branch_value = Vec::new();
        self.place_child(&mut children, &left_rest, ext.child)?;
        self.place_leaf(&mut children, &mut branch_value, &right_rest, value)?;

        let branch_ref = self.persist(&Node::Branch(Box::new(BranchNode { children, value: branch_value })))?;
        self.maybe_wrap_extension(common_prefix, branch_ref)
    }

    fn insert_into_branch(&self, mut branch: BranchNode, path: &Nibbles, value: Vec<u8>) -> Result<NodeRef, TrieError> {
        if path.is_empty() {
            branch.value = value;
        } else {
            let nibble = path.at(0) as usize;
            let child = std::mem::replace(&mut branch.children[nibble], NodeRef::empty());
            branch.children[nibble] = self.insert_at(
                (!child.is_empty()).then_some(child),
                &path.skip_prefix(1),
                value,
            )?;
        }
        self.persist(&Node::Branch(Box::new(branch)))
    }

    /// Places a brand-new leaf holding `value` into `children`/`branch_value`
    /// at the slot named by `rest`'s first nibble (or directly into
    /// `branch_value` if `rest` is empty, meaning this entry terminates at
    /// the branch itself).
    fn place_leaf(
        &self,
        children: &mut [NodeRef; 16],
        branch_value: &mut Vec<u8>,
        rest: &Nibbles,
        value: Vec<u8>,
    ) -> Result<(), TrieError> {
        if rest.is_empty() {
            *branch_value = value;
            return Ok(());
        }
        let nibble = rest.at(0) as usize;
        let leaf_ref = self.persist(&Node::Leaf(LeafNode { partial: rest.skip_prefix(1), value }))?;
        children[nibble] = leaf_ref;
        Ok(())
    }

    /// Places an already-existing child reference (the far side of a split
    /// extension) into `children`, re-wrapping it in a shorter extension if
    /// more than one nibble of the original prefix remains.
    fn place_child(&self, children: &mut [NodeRef; 16], rest: &Nibbles, child: NodeRef) -> Result<(), TrieError> {
        let nibble = rest.at(0) as usize;
        children[nibble] = if rest.len() == 1 {
            child
        } else {
            self.persist(&Node::Extension(ExtensionNode { prefix: rest.skip_prefix(1), child }))?
        };
        Ok(())
    }

    fn maybe_wrap_extension(&self, prefix: Nibbles, child: NodeRef) -> Result<NodeRef, TrieError> {
        if prefix.is_empty() {
            Ok(child)
        } else {
            self.persist(&Node::Extension(ExtensionNode { prefix, child }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn empty_trie_has_the_well_known_hash() {
        let trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        assert_eq!(trie.hash(), empty_trie_hash());
    }

    #[test]
    fn insert_then_get_single_key() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        trie.insert(key(1), vec![1, 2, 3]).unwrap();
        assert_eq!(trie.get(&key(1)).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(trie.get(&key(2)).unwrap(), None);
    }

    #[test]
    fn insert_many_keys_and_read_back() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        for i in 0u8..40 {
            trie.insert(H256::repeat_byte(i), vec![i; 4]).unwrap();
        }
        for i in 0u8..40 {
            assert_eq!(trie.get(&H256::repeat_byte(i)).unwrap(), Some(vec![i; 4]));
        }
    }

    #[test]
    fn overwrite_existing_key() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        trie.insert(key(5), vec![1]).unwrap();
        trie.insert(key(5), vec![2]).unwrap();
        assert_eq!(trie.get(&key(5)).unwrap(), Some(vec![2]));
    }

    #[test]
    fn root_hash_is_order_independent() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut a = Trie::new(db.clone());
        a.insert(key(1), vec![1]).unwrap();
        a.insert(key(2), vec![2]).unwrap();

        let mut b = Trie::new(db);
        b.insert(key(2), vec![2]).unwrap();
        b.insert(key(1), vec![1]).unwrap();

        assert_eq!(a.hash(), b.hash());
    }
}
