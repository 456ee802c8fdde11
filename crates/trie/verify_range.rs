//! Verification of the range proofs carried in `AccountRange` / `StorageRanges`
//! replies: given a claimed state root, a contiguous run of (key, value)
//! pairs and the Merkle proof nodes bracketing that run, confirm the pairs
//! really are everything between the left boundary and the last key, and
//! nothing else, under that root.
//!
//! The proof is seeded into a throwaway store and the claimed entries are
//! replayed into a trie opened at `root`; the two only reconcile to the same
//! root hash if the peer's reply was both complete and correct.

use std::sync::Arc;

use ethereum_types::H256;

use crate::{db::InMemoryTrieDB, Nibbles, Node, NodeRef, TrieDB, TrieError, Trie};

/// The outcome of verifying a range reply: whether the reconstructed partial
/// trie's root matched, and — if it did — the partial paths of any child
/// references inside the claimed range that the proof left unresolved. A
/// non-empty `gaps` with `root_matches: true` means the reply was internally
/// consistent but skipped over trie content it should have included.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerifiedRange {
    pub root_matches: bool,
    pub gaps: Vec<Nibbles>,
}

/// Verifies that `keys`/`values` is exactly the range of a trie rooted at
/// `root` starting at (or after) `first_key`, using `proof` as the edge
/// proof nodes. An empty `proof` asserts the range is the *entire* trie.
pub fn verify_range(
    root: H256,
    first_key: H256,
    keys: &[H256],
    values: &[Vec<u8>],
    proof: &[Vec<u8>],
) -> Result<VerifiedRange, TrieError> {
    if keys.len() != values.len() {
        return Err(TrieError::Verify("key/value count mismatch".into()));
    }
    if keys.is_empty() {
        return Err(TrieError::Verify("empty range".into()));
    }
    if values.iter().any(Vec::is_empty) {
        return Err(TrieError::Verify("range entry with empty value".into()));
    }
    if keys[0] < first_key {
        return Err(TrieError::Verify("first key precedes the claimed lower bound".into()));
    }
    if keys.windows(2).any(|w| w[0] >= w[1]) {
        return Err(TrieError::Verify("range keys are not strictly increasing".into()));
    }

    let mut trie = if proof.is_empty() {
        Trie::new(Arc::new(InMemoryTrieDB::new()))
    } else {
        seed_from_proof(root, proof)?
    };

    for (key, value) in keys.iter().zip(values.iter()) {
        trie.insert(*key, value.clone())?;
    }

    if trie.hash() != root {
        return Ok(VerifiedRange { root_matches: false, gaps: Vec::new() });
    }

    let last_key = *keys.last().expect("checked non-empty above");
    let gaps = find_gaps(&trie, first_key, last_key)?;
    Ok(VerifiedRange { root_matches: true, gaps })
}

/// Walks the reconstructed partial trie looking for child references inside
/// `[lo, hi]` that don't resolve locally — a proof that was honest about its
/// two boundaries can still skip an account strictly between them, and a
/// skipped leaf leaves exactly this kind of dangling hash reference behind,
/// since the branch node above it still carries the hash unchanged.
fn find_gaps(trie: &Trie, lo: H256, hi: H256) -> Result<Vec<Nibbles>, TrieError> {
    let mut gaps = Vec::new();
    let Some(root) = trie.root_ref().cloned() else { return Ok(gaps) };
    let mut stack = vec![(root, Nibbles::empty())];
    while let Some((node_ref, path)) = stack.pop() {
        let (min, max) = envelope_bounds(&path);
        if max < lo || min > hi {
            continue;
        }
        match trie.get_node(&node_ref)? {
            None => {
                if node_ref.as_hash().is_some() {
                    gaps.push(path);
                }
            }
            Some(Node::Leaf(_)) => {}
            Some(Node::Extension(ext)) => stack.push((ext.child, path.append(&ext.prefix))),
            Some(Node::Branch(branch)) => {
                for (nibble, child) in branch.children.iter().enumerate() {
                    if !child.is_empty() {
                        stack.push((child.clone(), path.push(nibble as u8)));
                    }
                }
            }
        }
    }
    Ok(gaps)
}

/// The `[min, max]` of keys reachable under `path` — the same hierarchy the
/// healer's envelope algebra uses, computed locally here so this crate
/// doesn't need to depend on the engine crate that owns `NodeTagRange`.
fn envelope_bounds(path: &Nibbles) -> (H256, H256) {
    let mut min = path.as_slice().to_vec();
    min.resize(64, 0x0);
    let mut max = path.as_slice().to_vec();
    max.resize(64, 0xf);
    (Nibbles::from_hex(min).to_fixed_bytes().into(), Nibbles::from_hex(max).to_fixed_bytes().into())
}

/// Loads every proof node into a fresh store keyed by its own hash, then
/// opens a trie at `root` against that store. Nodes outside the claimed
/// range stay as unresolved hash references — exactly as they should, since
/// nothing in the range touches them.
fn seed_from_proof(root: H256, proof: &[Vec<u8>]) -> Result<Trie, TrieError> {
    let db = InMemoryTrieDB::new();
    for node in proof {
        let hash = snapsync_crypto::keccak(node);
        db.put(hash.as_bytes().to_vec(), node.clone())?;
    }
    Ok(Trie::open(Arc::new(db), root))
}
