//! Trie node representation and its RLP codec.
//!
//! Nodes are a small tagged variant, exactly as the wire protocol and the
//! persisted format require: a 16-way `Branch` (plus an optional value for
//! keys that terminate there), an `Extension` that shares a nibble prefix
//! with a single child, and a `Leaf` holding the remaining path and a value.
//! Child references are inlined when their RLP encoding is under 32 bytes,
//! or carried as a Keccak hash otherwise — this is what `NodeRef` models.

use ethereum_types::H256;
use snapsync_crypto::keccak;
use snapsync_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::Encoder,
};

use crate::nibbles::Nibbles;

/// A reference to a child node: either hashed (the common case once a trie
/// has any real size) or embedded directly when its RLP body is < 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Hash(H256),
    Embedded(Vec<u8>),
}

impl NodeRef {
    pub fn as_hash(&self) -> Option<H256> {
        match self {
            NodeRef::Hash(h) => Some(*h),
            NodeRef::Embedded(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Embedded(b) if b.is_empty())
    }

    pub fn empty() -> Self {
        NodeRef::Embedded(Vec::new())
    }

    fn from_encoded(encoded: Vec<u8>) -> Self {
        if encoded.len() < 32 {
            NodeRef::Embedded(encoded)
        } else {
            NodeRef::Hash(keccak(&encoded))
        }
    }
}

impl RLPEncode for NodeRef {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            NodeRef::Hash(h) => h.encode(buf),
            NodeRef::Embedded(b) => {
                // an embedded node's RLP is already a complete item (list or string);
                // splice it in directly rather than wrapping it as a byte string.
                use bytes::BufMut;
                buf.put_slice(b);
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            NodeRef::Hash(h) => h.length(),
            NodeRef::Embedded(b) => b.len(),
        }
    }
}

impl RLPDecode for NodeRef {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (item, rest) = snapsync_rlp::decode::get_item_with_prefix(rlp)?;
        if item.is_empty() {
            return Ok((NodeRef::empty(), rest));
        }
        if item.len() == 33 && item[0] == 0xa0 {
            let (hash, _) = H256::decode_unfinished(item)?;
            return Ok((NodeRef::Hash(hash), rest));
        }
        Ok((NodeRef::Embedded(item.to_vec()), rest))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub children: [NodeRef; 16],
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl Node {
    /// Returns the node's RLP encoding (the bytes actually hashed, or
    /// embedded, to produce a `NodeRef`).
    pub fn encode_raw(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// The `NodeRef` an encoder one level up would store for this node.
    pub fn as_ref(&self) -> NodeRef {
        NodeRef::from_encoded(self.encode_raw())
    }

    /// `Some(hash)` if this node's encoding is large enough to be hashed
    /// rather than embedded (true for every node actually persisted under
    /// `S·<nodeKey>`).
    pub fn hash(&self) -> H256 {
        keccak(self.encode_raw())
    }
}

impl RLPEncode for Node {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            Node::Branch(branch) => {
                let mut enc = Encoder::new(buf);
                for child in &branch.children {
                    enc = enc.encode_field(child);
                }
                enc.encode_field(&branch.value).finish();
            }
            Node::Extension(ext) => {
                Encoder::new(buf)
                    .encode_field(&ext.prefix.encode_compact(false))
                    .encode_field(&ext.child)
                    .finish();
            }
            Node::Leaf(leaf) => {
                Encoder::new(buf)
                    .encode_field(&leaf.partial.encode_compact(true))
                    .encode_field(&leaf.value)
                    .finish();
            }
        }
    }
}

impl RLPDecode for Node {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = snapsync_rlp::decode::decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::unexpected_string());
        }
        // Branch nodes are 17-item lists (16 children + value); leaf/extension
        // nodes are 2-item lists (compact path + value-or-child). Split the
        // payload into top-level items first so the dispatch is by count,
        // not by a parse that could silently mis-interpret the other shape.
        let mut items = Vec::new();
        let mut cursor = payload;
        while !cursor.is_empty() {
            let (item, next) = snapsync_rlp::decode::get_item_with_prefix(cursor)?;
            items.push(item);
            cursor = next;
        }

        match items.len() {
            17 => {
                let mut children: Vec<NodeRef> = Vec::with_capacity(16);
                for item in &items[..16] {
                    children.push(NodeRef::decode(item)?);
                }
                let value = Vec::<u8>::decode(items[16])?;
                let children: [NodeRef; 16] = children
                    .try_into()
                    .map_err(|_| RLPDecodeError::malformed_data())?;
                Ok((Node::Branch(Box::new(BranchNode { children, value })), rest))
            }
            2 => {
                let raw_path = Vec::<u8>::decode(items[0])?;
                let (nibbles, is_leaf) = Nibbles::decode_compact(&raw_path);
                if is_leaf {
                    let value = Vec::<u8>::decode(items[1])?;
                    Ok((Node::Leaf(LeafNode { partial: nibbles, value }), rest))
                } else {
                    let child = NodeRef::decode(items[1])?;
                    Ok((Node::Extension(ExtensionNode { prefix: nibbles, child }), rest))
                }
            }
            _ => Err(RLPDecodeError::malformed_data()),
        }
    }
}
