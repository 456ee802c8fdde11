//! Per-pivot progress: the mutable state a single pivot's
//! buddies all share — which account-range bytes are processed versus still
//! owed to the network, plus the storage and bytecode queues that account
//! leaves feed as they're discovered.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;

use ethereum_types::{H256, U256};
use lru::LruCache;

use snapsync_common::Header;

use crate::error::EngineError;
use crate::range_set::{NodeTagRange, NodeTagRangeSet};

/// `processed`/`unprocessed` progress over one trie's keyspace, `unprocessed`
/// split into two priority tiers. The gap between `processed`, `unprocessed`
/// and the full `2^256` keyspace is exactly the ranges currently leased out
/// to buddies (`processed + unprocessed + inFlight == 2^256` always holds).
#[derive(Clone, Debug)]
pub struct SnapRangeBatch {
    pub processed: NodeTagRangeSet,
    pub unprocessed_primary: NodeTagRangeSet,
    pub unprocessed_secondary: NodeTagRangeSet,
    lock_trie_perusal: bool,
}

impl SnapRangeBatch {
    pub fn new() -> Self {
        Self {
            processed: NodeTagRangeSet::new(),
            unprocessed_primary: NodeTagRangeSet::full(),
            unprocessed_secondary: NodeTagRangeSet::new(),
            lock_trie_perusal: false,
        }
    }

    /// An empty batch with nothing allocated yet — used for a storage trie
    /// discovered fresh during healing, whose `processed` starts empty but
    /// which has no bulk range-fetch work of its own.
    pub fn new_unallocated() -> Self {
        Self {
            processed: NodeTagRangeSet::new(),
            unprocessed_primary: NodeTagRangeSet::new(),
            unprocessed_secondary: NodeTagRangeSet::new(),
            lock_trie_perusal: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.processed.is_full()
    }

    /// Pops the next range of size `<= max_len` from the unprocessed tiers,
    /// primary first. The caller becomes responsible for eventually
    /// returning or marking processed whatever comes back: a lease must
    /// never simply be dropped.
    pub fn check_out_range(&mut self, max_len: U256) -> Option<NodeTagRange> {
        self.unprocessed_primary
            .fetch(max_len)
            .or_else(|| self.unprocessed_secondary.fetch(max_len))
    }

    /// Re-merges an unfinished range back into `unprocessed`.
    pub fn return_range(&mut self, iv: NodeTagRange) {
        self.unprocessed_primary.merge(iv);
    }

    /// Moves `iv` from the in-flight gap into `processed`. `iv` must not
    /// intersect the existing `processed` set — that would mean the same
    /// bytes being recorded twice, a lease-accounting bug in the caller.
    pub fn mark_processed(&mut self, iv: NodeTagRange) {
        debug_assert!(
            self.processed.covered(&iv).is_zero(),
            "mark_processed on a range already in processed"
        );
        self.processed.merge(iv);
    }

    /// Checks out a range and hands it to `f`. If `f` errors, the range is
    /// re-merged into `unprocessed` before the error propagates, so a buddy
    /// that bails out of a round through `?` can never silently drop a
    /// lease. On success `f` is responsible for its
    /// own bookkeeping — `mark_processed` the covered sub-range,
    /// `return_range` anything left over.
    pub fn with_leased_range<T, E>(
        &mut self,
        max_len: U256,
        f: impl FnOnce(&mut Self, NodeTagRange) -> Result<T, E>,
    ) -> Option<Result<T, E>> {
        let iv = self.check_out_range(max_len)?;
        Some(f(self, iv).inspect_err(|_| self.return_range(iv)))
    }

    /// Sets the `lockTriePerusal` flag, refusing a second concurrent
    /// inspection of this batch rather than queuing behind it.
    pub fn lock_trie_perusal(&mut self) -> Result<(), EngineError> {
        if self.lock_trie_perusal {
            return Err(EngineError::TrieIsLockedForPerusal);
        }
        self.lock_trie_perusal = true;
        Ok(())
    }

    pub fn unlock_trie_perusal(&mut self) {
        self.lock_trie_perusal = false;
    }
}

impl Default for SnapRangeBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies a per-account storage sub-trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSlotsHeader {
    pub acc_key: H256,
    pub storage_root: H256,
    pub sub_range: Option<NodeTagRange>,
}

/// Lives in exactly one of `fetch_storage_full` (no progress yet) or
/// `fetch_storage_part` (partial progress, `slots` populated) — an accKey is
/// in at most one of {Full, Part, Parked} at any time.
#[derive(Clone, Debug)]
pub struct StorageQueueItem {
    pub header: AccountSlotsHeader,
    pub slots: Option<SnapRangeBatch>,
}

/// What probing a candidate's storage root against the local store found;
/// drives `Pivot::fetch_storage_full_batch`'s classification.
pub enum StorageRootState {
    /// Not present locally at all: request the full range.
    Absent,
    /// Already fully built: nothing to do.
    Complete,
    /// Partially built under a previous pivot or a prior partial reply.
    Partial(SnapRangeBatch),
}

/// `{ stateHeader, stateRoot, fetchAccounts, fetchStorageFull,
/// fetchStoragePart, parkedStorage, fetchContracts, nAccounts, nSlotLists,
/// nContracts, archived }`. One pivot per state root the engine is
/// reconstructing toward or has reconstructed and kept around for swap-in.
pub struct Pivot {
    pub state_header: Header,
    pub state_root: H256,
    pub fetch_accounts: SnapRangeBatch,
    fetch_storage_full: VecDeque<StorageQueueItem>,
    fetch_storage_part: VecDeque<StorageQueueItem>,
    pub parked_storage: HashSet<H256>,
    pub fetch_contracts: LruCache<H256, H256>,
    pub n_accounts: u64,
    pub n_slot_lists: u64,
    pub n_contracts: u64,
    /// "Mothballed, don't write more to it, may read for swap-in."
    pub archived: bool,
}

impl Pivot {
    pub fn new(state_header: Header, state_root: H256, contracts_cache_cap: NonZeroUsize) -> Self {
        Self {
            state_header,
            state_root,
            fetch_accounts: SnapRangeBatch::new(),
            fetch_storage_full: VecDeque::new(),
            fetch_storage_part: VecDeque::new(),
            parked_storage: HashSet::new(),
            fetch_contracts: LruCache::new(contracts_cache_cap),
            n_accounts: 0,
            n_slot_lists: 0,
            n_contracts: 0,
            archived: false,
        }
    }

    pub fn append_storage_full(&mut self, header: AccountSlotsHeader) {
        self.fetch_storage_full.push_back(StorageQueueItem { header, slots: None });
    }

    /// Refills `item`'s partial slot range to half of its first remaining
    /// range, then re-queues it — used when a reply only delivers the head
    /// of an account's slots, or a bad proof forces a smaller re-request
    /// (the "bisect" policy — accepted as-is rather than tuned further).
    pub fn append_storage_partial_bisect(&mut self, mut item: StorageQueueItem) {
        let slots = item.slots.get_or_insert_with(SnapRangeBatch::new_unallocated);
        if let Some(first) = slots.unprocessed_primary.iter().next() {
            let half = bisect_len(first.len());
            if let Some(taken) = slots.unprocessed_primary.fetch(half) {
                slots.unprocessed_primary.merge(taken);
            }
        }
        self.fetch_storage_part.push_back(item);
    }

    pub fn pop_storage_partial(&mut self) -> Option<StorageQueueItem> {
        self.fetch_storage_part.pop_front()
    }

    pub fn storage_full_len(&self) -> usize {
        self.fetch_storage_full.len()
    }

    pub fn storage_part_len(&self) -> usize {
        self.fetch_storage_part.len()
    }

    /// For up to `n` queued full-storage candidates, probes whether each is
    /// absent (kept for fetch), already complete (dropped), or partial
    /// (moved to the partial queue). Returns `(items to fetch,
    /// nCompleteFastPath, nMovedToPartial)`.
    pub fn fetch_storage_full_batch(
        &mut self,
        n: usize,
        mut probe: impl FnMut(&AccountSlotsHeader) -> StorageRootState,
    ) -> (Vec<AccountSlotsHeader>, usize, usize) {
        let mut items = Vec::new();
        let mut complete = 0;
        let mut moved = 0;
        for _ in 0..n {
            let Some(candidate) = self.fetch_storage_full.pop_front() else { break };
            match probe(&candidate.header) {
                StorageRootState::Absent => items.push(candidate.header),
                StorageRootState::Complete => complete += 1,
                StorageRootState::Partial(slots) => {
                    self.fetch_storage_part
                        .push_back(StorageQueueItem { header: candidate.header, slots: Some(slots) });
                    moved += 1;
                }
            }
        }
        (items, complete, moved)
    }

    /// Parks `acc_key` while a network request for its storage is
    /// outstanding, pulling it out of whichever queue currently holds it.
    /// Returns the parked item, if any was found.
    pub fn park_storage(&mut self, acc_key: H256) -> Option<StorageQueueItem> {
        let found = take_matching(&mut self.fetch_storage_full, acc_key)
            .or_else(|| take_matching(&mut self.fetch_storage_part, acc_key));
        if found.is_some() {
            self.parked_storage.insert(acc_key);
        }
        found
    }

    /// Returns a previously parked item to its appropriate queue.
    pub fn unpark_storage(&mut self, item: StorageQueueItem) {
        self.parked_storage.remove(&item.header.acc_key);
        if item.slots.is_some() {
            self.fetch_storage_part.push_back(item);
        } else {
            self.fetch_storage_full.push_back(item);
        }
    }

    /// True if `acc_key` already has a queue entry in either tier, or is
    /// parked — the invariant Swap-In's transfer must preserve (an
    /// accKey lives in at most one of {Full, Part, Parked}).
    pub fn has_storage_item(&self, acc_key: H256) -> bool {
        self.parked_storage.contains(&acc_key)
            || self.fetch_storage_full.iter().any(|item| item.header.acc_key == acc_key)
            || self.fetch_storage_part.iter().any(|item| item.header.acc_key == acc_key)
    }

    /// Pulls every queued storage item (either tier) whose account key falls
    /// within `range`, for Swap-In to hand off to a newer pivot.
    pub fn drain_storage_in_range(&mut self, range: NodeTagRange) -> Vec<StorageQueueItem> {
        let mut out = Vec::new();
        self.fetch_storage_full.retain(|item| {
            let keep = !range.contains(item.header.acc_key);
            if !keep {
                out.push(item.clone());
            }
            keep
        });
        self.fetch_storage_part.retain(|item| {
            let keep = !range.contains(item.header.acc_key);
            if !keep {
                out.push(item.clone());
            }
            keep
        });
        out
    }

    /// Adopts a storage item salvaged from an archived pivot, unless this
    /// pivot already has one for the same account — Swap-In only ever adds.
    pub fn absorb_storage_item(&mut self, item: StorageQueueItem) {
        if self.has_storage_item(item.header.acc_key) {
            return;
        }
        if item.slots.is_some() {
            self.fetch_storage_part.push_back(item);
        } else {
            self.fetch_storage_full.push_back(item);
        }
    }
}

fn take_matching(queue: &mut VecDeque<StorageQueueItem>, acc_key: H256) -> Option<StorageQueueItem> {
    let pos = queue.iter().position(|item| item.header.acc_key == acc_key)?;
    queue.remove(pos)
}

fn bisect_len(len: U256) -> U256 {
    let half = len / 2;
    if half.is_zero() {
        U256::from(1)
    } else {
        half
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header { number: 1, parent_hash: H256::zero(), state_root: H256::zero(), difficulty: U256::zero() }
    }

    #[test]
    fn fresh_batch_has_nothing_processed_and_everything_unprocessed() {
        let batch = SnapRangeBatch::new();
        assert!(batch.processed.is_empty());
        assert!(batch.unprocessed_primary.is_full());
    }

    #[test]
    fn checkout_then_return_leaves_unprocessed_unchanged() {
        let mut batch = SnapRangeBatch::new();
        let before = batch.unprocessed_primary.total();
        let iv = batch.check_out_range(U256::from(1000)).unwrap();
        assert!(batch.unprocessed_primary.total() < before);
        batch.return_range(iv);
        assert_eq!(batch.unprocessed_primary.total(), before);
    }

    #[test]
    fn checkout_then_mark_processed_advances_coverage() {
        let mut batch = SnapRangeBatch::new();
        let iv = batch.check_out_range(U256::from(1000)).unwrap();
        batch.mark_processed(iv);
        assert_eq!(batch.processed.total(), U256::from(1000));
    }

    #[test]
    fn with_leased_range_returns_the_lease_on_error() {
        let mut batch = SnapRangeBatch::new();
        let before = batch.unprocessed_primary.total();
        let result = batch.with_leased_range(U256::from(1000), |_batch, _iv| Err::<(), &str>("wire timeout"));
        assert_eq!(result, Some(Err("wire timeout")));
        assert_eq!(batch.unprocessed_primary.total(), before);
    }

    #[test]
    fn with_leased_range_leaves_the_lease_consumed_on_success() {
        let mut batch = SnapRangeBatch::new();
        let result = batch.with_leased_range(U256::from(1000), |batch, iv| {
            batch.mark_processed(iv);
            Ok::<(), &str>(())
        });
        assert_eq!(result, Some(Ok(())));
        assert_eq!(batch.processed.total(), U256::from(1000));
    }

    #[test]
    fn second_lock_trie_perusal_is_rejected() {
        let mut batch = SnapRangeBatch::new();
        batch.lock_trie_perusal().unwrap();
        assert!(matches!(batch.lock_trie_perusal(), Err(EngineError::TrieIsLockedForPerusal)));
        batch.unlock_trie_perusal();
        assert!(batch.lock_trie_perusal().is_ok());
    }

    #[test]
    fn storage_full_batch_classifies_into_three_outcomes() {
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        for i in 0u8..3 {
            pivot.append_storage_full(AccountSlotsHeader {
                acc_key: H256::repeat_byte(i),
                storage_root: H256::repeat_byte(i),
                sub_range: None,
            });
        }
        let mut calls = 0u8;
        let (items, complete, moved) = pivot.fetch_storage_full_batch(3, |_| {
            calls += 1;
            match calls {
                1 => StorageRootState::Absent,
                2 => StorageRootState::Complete,
                _ => StorageRootState::Partial(SnapRangeBatch::new_unallocated()),
            }
        });
        assert_eq!(items.len(), 1);
        assert_eq!(complete, 1);
        assert_eq!(moved, 1);
        assert_eq!(pivot.storage_part_len(), 1);
    }

    #[test]
    fn parking_and_unparking_a_storage_item_round_trips() {
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        let key = H256::repeat_byte(7);
        pivot.append_storage_full(AccountSlotsHeader { acc_key: key, storage_root: key, sub_range: None });

        let parked = pivot.park_storage(key).unwrap();
        assert!(pivot.parked_storage.contains(&key));
        assert_eq!(pivot.storage_full_len(), 0);

        pivot.unpark_storage(parked);
        assert!(!pivot.parked_storage.contains(&key));
        assert_eq!(pivot.storage_full_len(), 1);
    }

    #[test]
    fn drain_storage_in_range_moves_matching_items_out_of_both_tiers() {
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        pivot.append_storage_full(AccountSlotsHeader {
            acc_key: H256::repeat_byte(1),
            storage_root: H256::repeat_byte(1),
            sub_range: None,
        });
        pivot.append_storage_partial_bisect(StorageQueueItem {
            header: AccountSlotsHeader { acc_key: H256::repeat_byte(2), storage_root: H256::repeat_byte(2), sub_range: None },
            slots: None,
        });
        pivot.append_storage_full(AccountSlotsHeader {
            acc_key: H256::repeat_byte(0xff),
            storage_root: H256::repeat_byte(0xff),
            sub_range: None,
        });

        let range = NodeTagRange::new(H256::zero(), H256::repeat_byte(0x0f));
        let drained = pivot.drain_storage_in_range(range);
        assert_eq!(drained.len(), 2);
        assert_eq!(pivot.storage_full_len(), 1);
        assert_eq!(pivot.storage_part_len(), 0);
    }

    #[test]
    fn absorb_storage_item_is_a_no_op_if_the_account_is_already_queued() {
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        let key = H256::repeat_byte(3);
        pivot.append_storage_full(AccountSlotsHeader { acc_key: key, storage_root: key, sub_range: None });

        pivot.absorb_storage_item(StorageQueueItem {
            header: AccountSlotsHeader { acc_key: key, storage_root: key, sub_range: None },
            slots: None,
        });
        assert_eq!(pivot.storage_full_len(), 1);
        assert_eq!(pivot.storage_part_len(), 0);
    }
}
