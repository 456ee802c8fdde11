//! The healer: closes gaps left by bulk range-fetch by requesting individual
//! trie nodes, one trie at a time, one round at a time.

use std::collections::HashSet;

use ethereum_types::H256;
use snapsync_common::AccountState;
use snapsync_rlp::decode::RLPDecode;
use snapsync_rlp::encode::RLPEncode;
use snapsync_trie::{Nibbles, Node, NodeRef, Trie, TrieError};

use crate::config::Config;
use crate::envelope::{decompose, NodeSpecs};
use crate::error::EngineError;
use crate::inspector::{inspect_trie, ResumeCtx};
use crate::range_set::{NodeTagRange, NodeTagRangeSet};

/// A leaf discovered mid-heal whose storage root (if non-trivial) needs its
/// own queue entry — the caller (range-fetch/engine) owns the storage queue
/// and decides what to do with this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAccount {
    pub acc_key: H256,
    pub storage_root: H256,
}

/// Everything one `heal_round` call changed, for the caller to fold back
/// into the pivot's `SnapRangeBatch` and storage queue.
#[derive(Debug, Default)]
pub struct HealOutcome {
    /// Intervals to merge into `processed` (and remove from `unprocessed`).
    pub newly_processed: Vec<NodeTagRange>,
    /// Account leaves discovered this round with storage left to fetch.
    pub discovered_accounts: Vec<DiscoveredAccount>,
    /// Nodes fetched and persisted this round.
    pub nodes_fetched: usize,
    /// True if `missing` was empty going in: the trie is complete.
    pub complete: bool,
}

/// Asks a peer for up to `limit` trie nodes and returns whichever were
/// retrieved and verified; the healer only needs the seam, not the wire
/// details, which live in `wire::client`.
pub trait TrieNodeSource {
    fn get_trie_nodes(&mut self, root_hash: H256, specs: Vec<NodeSpecs>) -> Result<Vec<NodeSpecs>, EngineError>;
}

/// Runs one healing round against `trie`/`processed` for the root
/// `root_hash`, spending up to `config.heal_accounts_batch_max` worth of
/// node fetches. `ignore` accumulates partial paths this peer failed to
/// resolve, so the caller doesn't re-ask the same peer for them this round.
pub fn heal_round(
    trie: &mut Trie,
    root_hash: H256,
    processed: &NodeTagRangeSet,
    source: &mut impl TrieNodeSource,
    config: &Config,
    ignore: &mut HashSet<Nibbles>,
) -> Result<HealOutcome, EngineError> {
    let root = trie.root_ref().cloned().unwrap_or_else(NodeRef::empty);
    let mut missing = decompose(trie, &root, processed).map_err(trie_loop_aware)?;

    if missing.is_empty() {
        return Ok(HealOutcome { complete: true, ..Default::default() });
    }

    // Step 3: drop candidates that already resolve locally — allocated but
    // not yet marked processed, which range arithmetic will fix on its own.
    missing.retain(|m| m.data.is_none() && trie.is_dangling(&NodeRef::Hash(m.node_key)).unwrap_or(true));
    missing.retain(|m| !ignore.contains(&m.partial_path));

    if missing.is_empty() {
        // Plan B: inspect below what's already allocated for dangling links
        // that Decompose alone can't see (it stops descending at any node
        // whose envelope is already fully processed).
        let seed_paths: Vec<Nibbles> = Vec::new();
        let outcome = inspect_trie(trie, &root, &seed_paths, None::<ResumeCtx>, config.inspector_batch_limit, config.inspector_max_dangling)
            .map_err(trie_loop_aware)?;
        missing = outcome.dangling;
    }

    if missing.is_empty() {
        return Ok(HealOutcome { complete: true, ..Default::default() });
    }

    missing.truncate(config.fetch_request_trie_nodes_max.min(config.heal_accounts_batch_max));
    let resolved = source.get_trie_nodes(root_hash, missing)?;

    let mut outcome = HealOutcome::default();
    for spec in resolved {
        let Some(data) = &spec.data else {
            ignore.insert(spec.partial_path);
            continue;
        };
        trie.db().put(spec.node_key.as_bytes().to_vec(), data.clone()).map_err(|e| EngineError::DatabaseError(e.to_string()))?;
        outcome.nodes_fetched += 1;

        match Node::decode(data) {
            Ok(Node::Leaf(leaf)) => {
                let full_path = spec.partial_path.append(&leaf.partial);
                if full_path.len() == 64 {
                    let key = H256(full_path.to_fixed_bytes());
                    let inflated = inflate_leaf_range(key);
                    outcome.newly_processed.push(inflated);
                    if let Ok(account) = AccountState::decode(&leaf.value) {
                        if account.has_storage() {
                            outcome.discovered_accounts.push(DiscoveredAccount { acc_key: key, storage_root: account.storage_root });
                        }
                    }
                }
            }
            Ok(Node::Branch(_)) | Ok(Node::Extension(_)) => {}
            Err(_) => {
                ignore.insert(spec.partial_path);
            }
        }
    }

    Ok(outcome)
}

/// A cycle in the trie is a structural fault, not a peer offense — it means
/// the local reconstruction looped, so the right response is to abort this
/// inspection and switch pivot, never to count it against whichever buddy
/// happened to be running the round. Every other `TrieError` still becomes
/// `EngineError::DecodeError` through the blanket conversion.
fn trie_loop_aware(err: TrieError) -> EngineError {
    match err {
        TrieError::TrieLoopAlert => EngineError::TrieLoopAlert,
        other => EngineError::from(other),
    }
}

/// `HexaryRangeInflate`: a freshly-discovered leaf at
/// `key` is processed as a single-point interval; the caller's subsequent
/// `mark_processed` merges are what actually extend coverage to touch
/// already-processed neighbors, since `NodeTagRangeSet::merge` coalesces
/// adjacent intervals automatically.
fn inflate_leaf_range(key: H256) -> NodeTagRange {
    NodeTagRange::new(key, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use snapsync_trie::InMemoryTrieDB;

    struct FakeSource {
        trie: Trie,
    }

    impl TrieNodeSource for FakeSource {
        fn get_trie_nodes(&mut self, _root_hash: H256, specs: Vec<NodeSpecs>) -> Result<Vec<NodeSpecs>, EngineError> {
            specs
                .into_iter()
                .map(|mut spec| {
                    let data = self.trie.db().get(spec.node_key.as_bytes()).map_err(EngineError::from)?;
                    spec.data = data;
                    Ok(spec)
                })
                .collect()
        }
    }

    fn key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn heal_round_reports_complete_when_nothing_is_missing() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        trie.insert(key(1), vec![1]).unwrap();
        let root_hash = trie.hash();
        let mut processed = NodeTagRangeSet::new();
        processed.merge(NodeTagRange::full());

        let mut source = FakeSource { trie: trie.clone() };
        let outcome = heal_round(&mut trie, root_hash, &processed, &mut source, &Config::default(), &mut HashSet::new()).unwrap();
        assert!(outcome.complete);
    }

    #[test]
    fn heal_round_fetches_a_dangling_root_and_marks_it_processed() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut reference = Trie::new(db);
        let account = AccountState { nonce: 1, ..AccountState::empty() };
        reference.insert(key(9), account.encode_to_vec()).unwrap();
        let root_hash = reference.hash();

        let mut detached = Trie::open(Arc::new(InMemoryTrieDB::new()), root_hash);
        let processed = NodeTagRangeSet::new();

        let mut source = FakeSource { trie: reference };
        let outcome = heal_round(&mut detached, root_hash, &processed, &mut source, &Config::default(), &mut HashSet::new()).unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.nodes_fetched, 1);
        assert_eq!(outcome.newly_processed.len(), 1);
        assert_eq!(outcome.newly_processed[0], NodeTagRange::new(key(9), key(9)));
    }

    #[test]
    fn trie_loop_alert_is_structural_not_a_peer_fault() {
        let mapped = trie_loop_aware(TrieError::TrieLoopAlert);
        assert!(matches!(mapped, EngineError::TrieLoopAlert));
        assert!(!mapped.counts_against_peer());
    }

    #[test]
    fn other_trie_errors_still_take_the_blanket_conversion() {
        let mapped = trie_loop_aware(TrieError::LockError);
        assert!(matches!(mapped, EngineError::DecodeError(_)));
        assert!(mapped.counts_against_peer());
    }
}
