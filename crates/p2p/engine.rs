//! The engine: ties the range-set, wire, pivot and healer machinery into one
//! control flow. Owns the pivot table (one [`Pivot`] + its account [`Trie`]
//! per state root the engine has ever targeted), the process-wide
//! [`CoveredAccounts`] set, and the storage tries every account's slots get
//! imported into.
//!
//! A buddy's round is: check out a range from the current pivot,
//! fetch and verify it over the wire, fold the result back into the
//! pivot, and — when bulk progress saturates or the account reply
//! left a dangling link behind — run healing. Swap-in runs
//! whenever the current pivot's account coverage changes, crediting whatever
//! an archived pivot already proved about the same sub-trie.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use ethereum_types::H256;

use snapsync_common::Header;
use snapsync_storage::KvStore;
use snapsync_trie::{Nibbles, Trie, TrieDB};

use crate::config::Config;
use crate::error::EngineError;
use crate::healer::{heal_round, HealOutcome, TrieNodeSource};
use crate::pivot::{AccountSlotsHeader, Pivot};
use crate::range_fetch::{
    account_fetch_round, contract_fetch_round, should_pause_account_fetch, storage_full_fetch_round,
    storage_partial_fetch_round, AccountFetchOutcome, ContractFetchOutcome, StorageFetchOutcome, StorageTrieStore,
};
use crate::range_set::NodeTagRangeSet;
use crate::swap_in::{swap_in, ArchivedPivot, SwapInReport};
use crate::wire::client::{Transport, WireClient};

const DEFAULT_CONTRACTS_CACHE_CAP: usize = 16_384;
const SWAP_IN_MAX_LAPS: usize = 8;
const ARCHIVED_PIVOT_CAP: usize = 4;

/// One pivot's progress plus the account trie it's being reconstructed into.
/// Kept together because Swap-In needs both at once — the trie to
/// probe a candidate path's node key, the pivot to read/credit `processed`.
pub struct PivotHandle {
    pub pivot: Pivot,
    pub trie: Trie,
}

/// `CoveredAccounts`: process-wide union of account-range coverage
/// across every pivot the engine has ever run, used only for progress
/// reporting. Rolls over to empty on reaching 100% so repeated full passes
/// (across pivot rollovers) don't sit pinned at a meaningless "done".
#[derive(Default)]
pub struct CoveredAccounts(NodeTagRangeSet);

impl CoveredAccounts {
    pub fn merge(&mut self, iv: crate::range_set::NodeTagRange) {
        self.0.merge(iv);
        if self.0.is_full() {
            self.0 = NodeTagRangeSet::new();
        }
    }

    /// Folds every interval of `set` (typically a pivot's `fetch_accounts.
    /// processed`) into the union. Idempotent: re-merging bytes already
    /// counted is a no-op.
    pub fn merge_set(&mut self, set: &NodeTagRangeSet) {
        for iv in set.iter() {
            self.merge(iv);
        }
    }

    pub fn full_factor(&self) -> f64 {
        self.0.full_factor()
    }
}

/// Adapts a shared trie-node store into [`StorageTrieStore`], opening one
/// [`Trie`] per account lazily at that account's own `storage_root` — nodes
/// are content-addressed, so storage tries for the same account across
/// different pivots share the exact same persisted bytes.
pub struct EngineStorageTries {
    db: Arc<dyn TrieDB>,
    open: HashMap<H256, Trie>,
}

impl EngineStorageTries {
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self { db, open: HashMap::new() }
    }
}

impl StorageTrieStore for EngineStorageTries {
    fn trie_for(&mut self, header: &AccountSlotsHeader) -> &mut Trie {
        self.open
            .entry(header.acc_key)
            .and_modify(|trie| {
                if trie.hash() != header.storage_root {
                    *trie = Trie::open(self.db.clone(), header.storage_root);
                }
            })
            .or_insert_with(|| Trie::open(self.db.clone(), header.storage_root))
    }
}

/// Everything one `heal_storage_round` call changed for a single account's
/// storage trie.
pub type StorageHealOutcome = HealOutcome;

/// Ties the range-set, envelope, inspector, pivot, wire, range-fetch and
/// healer machinery together and owns every piece of mutable state a pivot
/// rollover needs to see: the pivot table, the account tries, and the
/// shared storage-trie cache. `S` is the backing key-value store; trie nodes
/// and contract code both write through it (the `S`/`C`/`T`/`P` key-prefix layout).
pub struct Engine<S: KvStore> {
    store: Arc<S>,
    trie_db: Arc<dyn TrieDB>,
    config: Config,
    pivots: BTreeMap<H256, PivotHandle>,
    current_root: Option<H256>,
    covered_accounts: CoveredAccounts,
    storage_tries: EngineStorageTries,
}

impl<S: KvStore> Engine<S> {
    pub fn new(store: Arc<S>, trie_db: Arc<dyn TrieDB>, config: Config) -> Self {
        let storage_tries = EngineStorageTries::new(trie_db.clone());
        Self {
            store,
            trie_db,
            config,
            pivots: BTreeMap::new(),
            current_root: None,
            covered_accounts: CoveredAccounts::default(),
            storage_tries,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_state_root(&self) -> Option<H256> {
        self.current_root
    }

    pub fn current(&self) -> Option<&PivotHandle> {
        self.current_root.and_then(|root| self.pivots.get(&root))
    }

    pub fn current_mut(&mut self) -> Option<&mut PivotHandle> {
        let root = self.current_root?;
        self.pivots.get_mut(&root)
    }

    pub fn covered_accounts(&self) -> &CoveredAccounts {
        &self.covered_accounts
    }

    /// Advances the pivot: archives whatever pivot is current ("archived
    /// when superseded by a newer pivot") and, if
    /// `state_root` isn't already known, creates a fresh one. Returns
    /// whether a new pivot was created (as opposed to re-selecting one
    /// already in the table, e.g. after a reorg back to a recent root).
    pub fn set_pivot(&mut self, header: Header) -> bool {
        let state_root = header.state_root;
        if let Some(current_root) = self.current_root {
            if let Some(handle) = self.pivots.get_mut(&current_root) {
                handle.pivot.archived = true;
            }
        }

        let created = !self.pivots.contains_key(&state_root);
        if created {
            let cap = NonZeroUsize::new(DEFAULT_CONTRACTS_CACHE_CAP).expect("nonzero constant");
            let pivot = Pivot::new(header, state_root, cap);
            let trie = Trie::open(self.trie_db.clone(), state_root);
            self.pivots.insert(state_root, PivotHandle { pivot, trie });
        } else if let Some(handle) = self.pivots.get_mut(&state_root) {
            handle.pivot.archived = false;
        }
        self.current_root = Some(state_root);
        self.prune_archived();
        created
    }

    /// Drops archived pivots beyond `ARCHIVED_PIVOT_CAP`, oldest first —
    /// a pivot is "destroyed when no other pivot can benefit
    /// from swap-in"; capping the table is the practical proxy for that,
    /// since an arbitrarily old pivot's account trie has ever-shrinking
    /// overlap with the current one.
    fn prune_archived(&mut self) {
        let current = self.current_root;
        let mut archived_roots: Vec<H256> = self
            .pivots
            .iter()
            .filter(|(root, handle)| Some(**root) != current && handle.pivot.archived)
            .map(|(root, _)| *root)
            .collect();
        while archived_roots.len() > ARCHIVED_PIVOT_CAP {
            let oldest = archived_roots.remove(0);
            self.pivots.remove(&oldest);
        }
    }

    /// True when the current pivot's account coverage is total and no
    /// storage or bytecode work remains queued: the pivot's processed set
    /// covers [0, 2^256) and every queued storage/bytecode item is resolved.
    pub fn is_complete(&self) -> bool {
        let Some(handle) = self.current() else { return false };
        handle.pivot.fetch_accounts.is_full()
            && handle.pivot.storage_full_len() == 0
            && handle.pivot.storage_part_len() == 0
            && handle.pivot.fetch_contracts.len() == 0
    }

    /// Runs one buddy's account-range round against the current pivot,
    /// folding newly-covered bytes into `covered_accounts` and running
    /// Swap-In afterward.
    pub async fn account_round<T: Transport>(
        &mut self,
        wire: &WireClient<T>,
        peer_id: &str,
    ) -> Result<AccountFetchOutcome, EngineError> {
        let Some(root) = self.current_root else {
            return Ok(AccountFetchOutcome::default());
        };
        if should_pause_account_fetch(&self.pivots[&root].pivot, &self.config) {
            return Ok(AccountFetchOutcome::default());
        }
        let max_len = crate::range_set::NodeTagRange::full().len() >> (self.config.checkout_span_shift() as usize);
        let outcome = {
            let handle = self.pivots.get_mut(&root).expect("current root always present");
            account_fetch_round(&mut handle.pivot, &mut handle.trie, wire, peer_id, max_len, &self.config).await?
        };
        if outcome.accounts_imported > 0 {
            let processed = self.pivots[&root].pivot.fetch_accounts.processed.clone();
            self.covered_accounts.merge_set(&processed);
            self.run_swap_in()?;
        }
        Ok(outcome)
    }

    pub async fn storage_full_round<T: Transport>(
        &mut self,
        wire: &WireClient<T>,
        peer_id: &str,
    ) -> Result<StorageFetchOutcome, EngineError> {
        let Some(root) = self.current_root else {
            return Ok(StorageFetchOutcome::default());
        };
        let handle = self.pivots.get_mut(&root).expect("current root always present");
        storage_full_fetch_round(&mut handle.pivot, &mut self.storage_tries, wire, peer_id, &self.config).await
    }

    pub async fn storage_partial_round<T: Transport>(
        &mut self,
        wire: &WireClient<T>,
        peer_id: &str,
    ) -> Result<StorageFetchOutcome, EngineError> {
        let Some(root) = self.current_root else {
            return Ok(StorageFetchOutcome::default());
        };
        let handle = self.pivots.get_mut(&root).expect("current root always present");
        storage_partial_fetch_round(&mut handle.pivot, &mut self.storage_tries, wire, peer_id, &self.config).await
    }

    pub async fn contract_round<T: Transport>(
        &mut self,
        wire: &WireClient<T>,
        peer_id: &str,
        ignore: &mut HashSet<H256>,
    ) -> Result<ContractFetchOutcome, EngineError> {
        let Some(root) = self.current_root else {
            return Ok(ContractFetchOutcome::default());
        };
        let handle = self.pivots.get_mut(&root).expect("current root always present");
        contract_fetch_round(&mut handle.pivot, self.store.as_ref(), wire, peer_id, ignore, &self.config).await
    }

    /// Runs one healing round against the current pivot's account
    /// trie, folding newly-discovered coverage back into `fetch_accounts`
    /// and queuing any discovered account's storage root for range-fetch.
    pub fn heal_accounts_round(
        &mut self,
        source: &mut impl TrieNodeSource,
        ignore: &mut HashSet<Nibbles>,
    ) -> Result<HealOutcome, EngineError> {
        let Some(root) = self.current_root else {
            return Ok(HealOutcome { complete: true, ..Default::default() });
        };
        let handle = self.pivots.get_mut(&root).expect("current root always present");
        let outcome = heal_round(
            &mut handle.trie,
            root,
            &handle.pivot.fetch_accounts.processed,
            source,
            &self.config,
            ignore,
        )?;
        for iv in &outcome.newly_processed {
            handle.pivot.fetch_accounts.mark_processed(*iv);
            handle.pivot.fetch_accounts.unprocessed_primary.reduce(*iv);
            handle.pivot.fetch_accounts.unprocessed_secondary.reduce(*iv);
        }
        for discovered in &outcome.discovered_accounts {
            if !handle.pivot.has_storage_item(discovered.acc_key) {
                handle.pivot.append_storage_full(AccountSlotsHeader {
                    acc_key: discovered.acc_key,
                    storage_root: discovered.storage_root,
                    sub_range: None,
                });
            }
        }
        if !outcome.newly_processed.is_empty() {
            self.run_swap_in()?;
        }
        Ok(outcome)
    }

    /// Heals one account's storage trie in place (storage-slot
    /// healing mirrors accounts healing per account).
    pub fn heal_storage_round(
        &mut self,
        header: &AccountSlotsHeader,
        processed: &NodeTagRangeSet,
        source: &mut impl TrieNodeSource,
        ignore: &mut HashSet<Nibbles>,
    ) -> Result<HealOutcome, EngineError> {
        let trie = self.storage_tries.trie_for(header);
        heal_round(trie, header.storage_root, processed, source, &self.config, ignore)
    }

    /// Runs Swap-In for the current pivot against every archived one
    /// in the table.
    pub fn run_swap_in(&mut self) -> Result<SwapInReport, EngineError> {
        let Some(current_root) = self.current_root else {
            return Ok(SwapInReport::default());
        };
        let Some(mut current) = self.pivots.remove(&current_root) else {
            return Ok(SwapInReport::default());
        };

        let mut archived: Vec<ArchivedPivot<'_>> = self
            .pivots
            .values_mut()
            .filter(|handle| handle.pivot.archived)
            .map(|handle| {
                let PivotHandle { trie, pivot } = handle;
                ArchivedPivot { trie, pivot }
            })
            .collect();

        let result = swap_in(&current.trie, &mut current.pivot, &mut archived, SWAP_IN_MAX_LAPS)
            .map_err(EngineError::DecodeError);

        self.pivots.insert(current_root, current);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::U256;

    use snapsync_storage::InMemoryKvStore;
    use snapsync_trie::InMemoryTrieDB;

    fn header(state_root: H256) -> Header {
        Header { number: 1, parent_hash: H256::zero(), state_root, difficulty: U256::zero() }
    }

    fn make_engine() -> Engine<InMemoryKvStore> {
        let store = Arc::new(InMemoryKvStore::new());
        let trie_db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        Engine::new(store, trie_db, Config::default())
    }

    #[test]
    fn set_pivot_creates_then_archives_on_rollover() {
        let mut engine = make_engine();
        let root_a = H256::repeat_byte(1);
        let root_b = H256::repeat_byte(2);

        assert!(engine.set_pivot(header(root_a)));
        assert_eq!(engine.current_state_root(), Some(root_a));

        assert!(engine.set_pivot(header(root_b)));
        assert_eq!(engine.current_state_root(), Some(root_b));
        assert!(engine.pivots[&root_a].pivot.archived);
        assert!(!engine.pivots[&root_b].pivot.archived);
    }

    #[test]
    fn reselecting_an_existing_pivot_does_not_recreate_it() {
        let mut engine = make_engine();
        let root = H256::repeat_byte(7);
        assert!(engine.set_pivot(header(root)));
        engine.pivots.get_mut(&root).unwrap().pivot.n_accounts = 42;

        assert!(!engine.set_pivot(header(root)));
        assert_eq!(engine.pivots[&root].pivot.n_accounts, 42);
    }

    #[test]
    fn a_fresh_pivot_is_not_complete() {
        let mut engine = make_engine();
        let root = H256::repeat_byte(3);
        engine.set_pivot(header(root));
        assert!(!engine.is_complete());
    }

    #[test]
    fn an_empty_pivot_with_nothing_to_process_reports_complete() {
        let mut engine = make_engine();
        let root = H256::zero();
        engine.set_pivot(header(root));
        let handle = engine.current_mut().unwrap();
        handle.pivot.fetch_accounts.processed = NodeTagRangeSet::full();
        handle.pivot.fetch_accounts.unprocessed_primary = NodeTagRangeSet::new();
        handle.pivot.fetch_accounts.unprocessed_secondary = NodeTagRangeSet::new();
        assert!(engine.is_complete());
    }

    #[test]
    fn run_swap_in_with_no_archived_pivots_is_a_no_op() {
        let mut engine = make_engine();
        let root = H256::repeat_byte(4);
        engine.set_pivot(header(root));
        let report = engine.run_swap_in().unwrap();
        assert_eq!(report.bytes_credited, U256::zero());
    }

    #[test]
    fn swap_in_credits_the_current_pivot_from_an_archived_one_sharing_a_root() {
        let mut engine = make_engine();
        let root_a = H256::repeat_byte(5);

        engine.set_pivot(header(root_a));
        {
            let handle = engine.current_mut().unwrap();
            handle.trie.insert(H256::repeat_byte(0x11), vec![1]).unwrap();
            handle.pivot.fetch_accounts.processed = NodeTagRangeSet::full();
            handle.pivot.fetch_accounts.unprocessed_primary = NodeTagRangeSet::new();
        }

        // Roll over to a pivot at the *same* root (simulating the common case
        // where a reorg briefly bounces back): the archived copy's progress
        // should be creditable to the reselected one.
        engine.set_pivot(header(root_a));
        let handle = engine.current_mut().unwrap();
        assert!(handle.pivot.fetch_accounts.is_full());
    }

    #[test]
    fn prune_archived_keeps_the_table_bounded() {
        let mut engine = make_engine();
        for i in 0u8..10 {
            engine.set_pivot(header(H256::repeat_byte(i)));
        }
        let archived_count = engine.pivots.values().filter(|h| h.pivot.archived).count();
        assert!(archived_count <= ARCHIVED_PIVOT_CAP);
    }
}
