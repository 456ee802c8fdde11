//! Swap-In: when a pivot rolls over, recognize
//! that a sub-trie at some partial path is identical between the new pivot
//! and an older, archived one (same node, same hash) and credit whatever
//! progress the archived pivot already made there, instead of re-fetching
//! it from the network.

use ethereum_types::{H256, U256};

use snapsync_trie::{Nibbles, Node, NodeRef, Trie, TrieError};

use crate::envelope::{decompose, envelope_touched_by};
use crate::pivot::Pivot;

/// An archived pivot paired with the trie it resolves against — the engine
/// keeps both behind a state root key; `NodeTagRangeSet` bookkeeping on its
/// own isn't enough to decide whether two pivots genuinely share a subtrie.
pub struct ArchivedPivot<'a> {
    pub trie: &'a Trie,
    pub pivot: &'a mut Pivot,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwapInReport {
    pub laps: usize,
    pub bytes_credited: U256,
    pub storage_items_transferred: usize,
}

/// Runs Swap-In for `new_pivot` against every pivot in `archived`, looping
/// until a pass adds nothing or `max_laps` is reached. Only ever
/// adds to `new_pivot.fetch_accounts.processed`, so it is safe to call
/// speculatively and safe to run concurrently with range-fetch.
pub fn swap_in(
    new_trie: &Trie,
    new_pivot: &mut Pivot,
    archived: &mut [ArchivedPivot<'_>],
    max_laps: usize,
) -> Result<SwapInReport, TrieError> {
    let mut report = SwapInReport::default();

    for _ in 0..max_laps.max(1) {
        let root = new_trie.root_ref().cloned().unwrap_or_else(NodeRef::empty);
        let missing = decompose(new_trie, &root, &new_pivot.fetch_accounts.processed)?;
        if missing.is_empty() {
            break;
        }

        let mut added_this_lap = U256::zero();
        for spec in &missing {
            for archived_pivot in archived.iter_mut() {
                if !archived_pivot.pivot.archived {
                    continue;
                }
                let Some(old_key) = resolve_node_key_at(archived_pivot.trie, &spec.partial_path)? else {
                    continue;
                };
                if old_key != spec.node_key {
                    continue;
                }

                let credited = envelope_touched_by(&spec.partial_path, &archived_pivot.pivot.fetch_accounts.processed);
                for iv in credited.iter() {
                    let added = new_pivot.fetch_accounts.processed.merge(iv);
                    if added.is_zero() {
                        continue;
                    }
                    new_pivot.fetch_accounts.unprocessed_primary.reduce(iv);
                    new_pivot.fetch_accounts.unprocessed_secondary.reduce(iv);
                    added_this_lap += added;

                    for item in archived_pivot.pivot.drain_storage_in_range(iv) {
                        new_pivot.absorb_storage_item(item);
                        report.storage_items_transferred += 1;
                    }
                }
                break;
            }
        }

        report.laps += 1;
        report.bytes_credited += added_this_lap;
        if added_this_lap.is_zero() {
            break;
        }
    }

    Ok(report)
}

/// Walks `path` from `trie`'s root the same way `Decompose` does, returning
/// the hash of whatever node (resolved or not) occupies exactly that
/// position — `None` if `path` doesn't land on a node boundary in this trie
/// (it ends inside a leaf or partway through an extension's shared prefix).
fn resolve_node_key_at(trie: &Trie, path: &Nibbles) -> Result<Option<H256>, TrieError> {
    resolve_at(trie, trie.root_ref().cloned().unwrap_or_else(NodeRef::empty), path)
}

fn resolve_at(trie: &Trie, node_ref: NodeRef, path: &Nibbles) -> Result<Option<H256>, TrieError> {
    if path.is_empty() {
        return Ok(node_ref.as_hash());
    }
    let Some(node) = trie.get_node(&node_ref)? else { return Ok(None) };
    match node {
        Node::Leaf(_) => Ok(None),
        Node::Extension(ext) => {
            if path.starts_with(&ext.prefix) {
                resolve_at(trie, ext.child, &path.skip_prefix(ext.prefix.len()))
            } else {
                Ok(None)
            }
        }
        Node::Branch(branch) => {
            let nibble = path.at(0) as usize;
            resolve_at(trie, branch.children[nibble].clone(), &path.skip_prefix(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use snapsync_common::Header;
    use snapsync_trie::InMemoryTrieDB;

    use crate::range_set::NodeTagRangeSet;

    fn key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    fn header() -> Header {
        Header { number: 1, parent_hash: H256::zero(), state_root: H256::zero(), difficulty: U256::zero() }
    }

    #[test]
    fn swap_in_credits_progress_for_a_shared_subtrie() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db);
        trie.insert(key(1), vec![1]).unwrap();
        trie.insert(key(2), vec![2]).unwrap();
        let root_hash = trie.hash();

        let mut old_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        old_pivot.archived = true;
        old_pivot.fetch_accounts.processed = NodeTagRangeSet::full();
        old_pivot.fetch_accounts.unprocessed_primary = NodeTagRangeSet::new();

        let mut new_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        assert!(new_pivot.fetch_accounts.processed.is_empty());

        let mut archived = [ArchivedPivot { trie: &trie, pivot: &mut old_pivot }];
        let report = swap_in(&trie, &mut new_pivot, &mut archived, 8).unwrap();

        assert!(report.bytes_credited > U256::zero());
        assert!(new_pivot.fetch_accounts.processed.total() > U256::zero());
    }

    #[test]
    fn swap_in_twice_with_no_intervening_mutation_is_a_no_op() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db);
        trie.insert(key(5), vec![5]).unwrap();
        trie.insert(key(9), vec![9]).unwrap();
        let root_hash = trie.hash();

        let mut old_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        old_pivot.archived = true;
        old_pivot.fetch_accounts.processed = NodeTagRangeSet::full();
        old_pivot.fetch_accounts.unprocessed_primary = NodeTagRangeSet::new();

        let mut new_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());

        {
            let mut archived = [ArchivedPivot { trie: &trie, pivot: &mut old_pivot }];
            swap_in(&trie, &mut new_pivot, &mut archived, 8).unwrap();
        }
        let processed_after_first = new_pivot.fetch_accounts.processed.clone();

        let mut archived = [ArchivedPivot { trie: &trie, pivot: &mut old_pivot }];
        let second = swap_in(&trie, &mut new_pivot, &mut archived, 8).unwrap();

        assert_eq!(second.bytes_credited, U256::zero());
        assert_eq!(new_pivot.fetch_accounts.processed, processed_after_first);
    }

    #[test]
    fn swap_in_ignores_an_unarchived_pivot() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db);
        trie.insert(key(1), vec![1]).unwrap();
        let root_hash = trie.hash();

        let mut live_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        live_pivot.fetch_accounts.processed = NodeTagRangeSet::full();

        let mut new_pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        let mut archived = [ArchivedPivot { trie: &trie, pivot: &mut live_pivot }];
        let report = swap_in(&trie, &mut new_pivot, &mut archived, 8).unwrap();

        assert_eq!(report.bytes_credited, U256::zero());
        assert!(new_pivot.fetch_accounts.processed.is_empty());
    }

    #[test]
    fn resolve_node_key_at_finds_the_branch_child_at_a_path() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db);
        trie.insert(key(0x10), vec![1]).unwrap();
        trie.insert(key(0x20), vec![2]).unwrap();

        let root = trie.root_ref().cloned().unwrap();
        let root_path = Nibbles::empty();
        assert_eq!(resolve_node_key_at(&trie, &root_path).unwrap(), root.as_hash());
    }
}
