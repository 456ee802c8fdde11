//! Range-fetch workers: the bulk network loops
//! that drive a pivot's account range, each account's storage range, and
//! contract bytecode toward completion. Each round leases work from the
//! pivot, awaits one wire round-trip, and folds the verified reply back in
//! — the lease is always either marked processed or returned, never dropped.

use std::collections::HashSet;

use ethereum_types::{H256, U256};

use snapsync_rlp::encode::RLPEncode;
use snapsync_storage::{keys, KvStore};
use snapsync_trie::{NodeRef, Trie};

use crate::config::Config;
use crate::envelope::{decompose, envelope};
use crate::error::EngineError;
use crate::pivot::{AccountSlotsHeader, Pivot, SnapRangeBatch, StorageQueueItem, StorageRootState};
use crate::range_set::{inc, NodeTagRange, NodeTagRangeSet};
use crate::wire::client::{Transport, WireClient};

/// Supplies the per-account storage [`Trie`] a storage round reads and
/// writes. Engine owns one shared `TrieDB` and opens a `Trie` per account
/// lazily, keyed by `acc_key`, at that account's own `storage_root`.
pub trait StorageTrieStore {
    fn trie_for(&mut self, header: &AccountSlotsHeader) -> &mut Trie;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccountFetchOutcome {
    pub accounts_imported: u64,
    pub storage_queued: u64,
    pub exhausted: bool,
    /// Internal gaps the reply's proof left dangling — already re-queued for
    /// healing by the time this is returned.
    pub gaps: u64,
}

/// Leases up to `max_len` of `pivot.fetch_accounts`, requests it from
/// `peer_id`, persists every verified account into `trie`, and queues any
/// account with a non-trivial storage root for the storage loop.
pub async fn account_fetch_round<T: Transport>(
    pivot: &mut Pivot,
    trie: &mut Trie,
    wire: &WireClient<T>,
    peer_id: &str,
    max_len: U256,
    config: &Config,
) -> Result<AccountFetchOutcome, EngineError> {
    let Some(iv) = pivot.fetch_accounts.check_out_range(max_len) else {
        return Ok(AccountFetchOutcome::default());
    };

    match import_account_range(pivot, trie, wire, peer_id, iv, config).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            pivot.fetch_accounts.return_range(iv);
            Err(err)
        }
    }
}

async fn import_account_range<T: Transport>(
    pivot: &mut Pivot,
    trie: &mut Trie,
    wire: &WireClient<T>,
    peer_id: &str,
    iv: NodeTagRange,
    config: &Config,
) -> Result<AccountFetchOutcome, EngineError> {
    let reply = wire
        .get_account_range(peer_id, pivot.state_root, iv.start, iv.end, config.request_size_cap as u64)
        .await?;

    if reply.accounts.is_empty() {
        // A verified proof over an empty reply proves there is nothing in
        // `iv` at all — the whole checkout is resolved, not just its start.
        pivot.fetch_accounts.mark_processed(iv);
        return Ok(AccountFetchOutcome { exhausted: true, ..Default::default() });
    }

    let mut storage_queued = 0u64;
    for unit in &reply.accounts {
        trie.insert(unit.hash, unit.account.encode_to_vec())
            .map_err(|e| EngineError::DatabaseError(e.to_string()))?;
        if unit.account.has_storage() {
            pivot.append_storage_full(AccountSlotsHeader {
                acc_key: unit.hash,
                storage_root: unit.account.storage_root,
                sub_range: None,
            });
            storage_queued += 1;
        }
    }
    pivot.n_accounts += reply.accounts.len() as u64;

    let last_hash = reply.accounts.last().expect("checked non-empty above").hash;
    let covered_end = if reply.exhausted { iv.end } else { last_hash };
    let covered = NodeTagRange::new(iv.start, covered_end);

    // The proof can be internally honest (root hash matches) while still
    // skipping an account strictly inside `covered` — a dangling child the
    // verifier surfaced as a gap path. Only `covered \ gaps` is actually
    // resolved; each gap's envelope goes back to `unprocessed` for healing
    // to pick up, rather than being marked processed sight unseen.
    let mut to_process = NodeTagRangeSet::new();
    to_process.merge(covered);
    let mut gaps = 0u64;
    for gap in &reply.gaps {
        let Some(cut) = covered.intersection(&envelope(gap)) else { continue };
        to_process.reduce(cut);
        pivot.fetch_accounts.return_range(cut);
        gaps += 1;
        tracing::debug!(
            peer = %peer_id,
            path = ?gap,
            error = %EngineError::ImportError(gap.clone()),
            "account range reply left an internal gap; queued for healing"
        );
    }
    for sub in to_process.iter() {
        pivot.fetch_accounts.mark_processed(sub);
    }

    if covered_end < iv.end {
        if let Some(remainder_start) = inc(covered_end) {
            pivot.fetch_accounts.return_range(NodeTagRange::new(remainder_start, iv.end));
        }
    }

    Ok(AccountFetchOutcome {
        accounts_imported: reply.accounts.len() as u64,
        storage_queued,
        exhausted: reply.exhausted,
        gaps,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StorageFetchOutcome {
    pub slot_lists_imported: u64,
    pub accounts_completed: u64,
    pub requeued_partial: bool,
}

/// Drains up to `fetchRequestStorageAccountsMax` candidates from
/// `fetchStorageFull`, probing each against the local store first so
/// already-complete or partially-built tries skip the network entirely.
pub async fn storage_full_fetch_round<T: Transport>(
    pivot: &mut Pivot,
    storage_tries: &mut impl StorageTrieStore,
    wire: &WireClient<T>,
    peer_id: &str,
    config: &Config,
) -> Result<StorageFetchOutcome, EngineError> {
    let (items, _complete, _moved) = pivot.fetch_storage_full_batch(config.fetch_request_storage_accounts_max, |header| {
        probe_storage_root(storage_tries, header).unwrap_or(StorageRootState::Absent)
    });

    if items.is_empty() {
        return Ok(StorageFetchOutcome::default());
    }

    let account_hashes: Vec<H256> = items.iter().map(|h| h.acc_key).collect();
    let storage_roots: Vec<H256> = items.iter().map(|h| h.storage_root).collect();

    let reply = match wire
        .get_storage_ranges(
            peer_id,
            pivot.state_root,
            account_hashes,
            &storage_roots,
            H256::zero(),
            NodeTagRange::full().end,
            config.request_size_cap as u64,
        )
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            for header in items {
                pivot.append_storage_full(header);
            }
            return Err(err);
        }
    };

    let mut outcome = StorageFetchOutcome::default();
    let last_index = reply.slots.len().saturating_sub(1);
    for (i, header) in items.iter().enumerate() {
        let Some(slots) = reply.slots.get(i) else {
            pivot.append_storage_full(header.clone());
            continue;
        };

        let trie = storage_tries.trie_for(header);
        for slot in slots {
            trie.insert(slot.hash, slot.data.encode_to_vec())
                .map_err(|e| EngineError::DatabaseError(e.to_string()))?;
        }
        outcome.slot_lists_imported += slots.len() as u64;

        let is_last = i == last_index;
        if !is_last || reply.last_account_complete || slots.is_empty() {
            outcome.accounts_completed += 1;
            continue;
        }

        let last_hash = slots.last().expect("checked non-empty above").hash;
        let mut batch = SnapRangeBatch::new_unallocated();
        batch.processed.merge(NodeTagRange::new(H256::zero(), last_hash));
        if let Some(remainder_start) = inc(last_hash) {
            batch.unprocessed_primary.merge(NodeTagRange::new(remainder_start, NodeTagRange::full().end));
        }
        pivot.append_storage_partial_bisect(StorageQueueItem { header: header.clone(), slots: Some(batch) });
        outcome.requeued_partial = true;
    }
    pivot.n_slot_lists += outcome.slot_lists_imported;

    Ok(outcome)
}

/// Pops one item from `fetchStoragePart` and requests just its remaining
/// sub-range. A reply that still doesn't finish the account is bisected and
/// re-queued (the accepted-as-is bisect policy).
pub async fn storage_partial_fetch_round<T: Transport>(
    pivot: &mut Pivot,
    storage_tries: &mut impl StorageTrieStore,
    wire: &WireClient<T>,
    peer_id: &str,
    config: &Config,
) -> Result<StorageFetchOutcome, EngineError> {
    let Some(mut item) = pivot.pop_storage_partial() else {
        return Ok(StorageFetchOutcome::default());
    };

    let batch = item.slots.get_or_insert_with(SnapRangeBatch::new_unallocated);
    let Some(iv) = batch.check_out_range(U256::MAX) else {
        return Ok(StorageFetchOutcome { accounts_completed: 1, ..Default::default() });
    };

    let reply = wire
        .get_storage_ranges(
            peer_id,
            pivot.state_root,
            vec![item.header.acc_key],
            std::slice::from_ref(&item.header.storage_root),
            iv.start,
            iv.end,
            config.request_size_cap as u64,
        )
        .await;

    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => {
            item.slots.as_mut().expect("just inserted above").return_range(iv);
            pivot.append_storage_partial_bisect(item);
            return Err(err);
        }
    };

    let mut outcome = StorageFetchOutcome::default();
    let Some(slots) = reply.slots.first() else {
        item.slots.as_mut().expect("just inserted above").return_range(iv);
        pivot.append_storage_partial_bisect(item);
        return Ok(outcome);
    };

    let trie = storage_tries.trie_for(&item.header);
    for slot in slots {
        trie.insert(slot.hash, slot.data.encode_to_vec())
            .map_err(|e| EngineError::DatabaseError(e.to_string()))?;
    }
    outcome.slot_lists_imported = slots.len() as u64;

    let covered_end = if reply.last_account_complete {
        iv.end
    } else {
        slots.last().map(|s| s.hash).unwrap_or(iv.start)
    };
    let covered = NodeTagRange::new(iv.start, covered_end);
    let batch = item.slots.as_mut().expect("just inserted above");
    batch.mark_processed(covered);
    if covered_end < iv.end {
        if let Some(remainder_start) = inc(covered_end) {
            batch.return_range(NodeTagRange::new(remainder_start, iv.end));
        }
    }

    if batch.is_full() {
        outcome.accounts_completed = 1;
    } else {
        pivot.append_storage_partial_bisect(item);
        outcome.requeued_partial = true;
    }
    pivot.n_slot_lists += outcome.slot_lists_imported;
    Ok(outcome)
}

fn probe_storage_root(
    storage_tries: &mut impl StorageTrieStore,
    header: &AccountSlotsHeader,
) -> Result<StorageRootState, snapsync_trie::TrieError> {
    let trie = storage_tries.trie_for(header);
    if trie.hash() != header.storage_root {
        return Ok(StorageRootState::Absent);
    }
    let root = trie.root_ref().cloned().unwrap_or_else(NodeRef::empty);
    let missing = decompose(trie, &root, &NodeTagRangeSet::new())?;
    Ok(if missing.is_empty() { StorageRootState::Complete } else { StorageRootState::Absent })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContractFetchOutcome {
    pub codes_imported: u64,
    pub requeued: u64,
}

/// Pulls up to `fetchRequestContractsMax` code hashes from `fetchContracts`,
/// issues `GetByteCodes`, stores each verified blob, and re-queues whatever
/// the peer didn't return with `hash` added to `ignore` so the next buddy to
/// try it picks a different peer.
pub async fn contract_fetch_round<T: Transport, S: KvStore>(
    pivot: &mut Pivot,
    code_store: &S,
    wire: &WireClient<T>,
    peer_id: &str,
    ignore: &mut HashSet<H256>,
    config: &Config,
) -> Result<ContractFetchOutcome, EngineError> {
    let mut hashes = Vec::new();
    let mut owners = Vec::new();
    while hashes.len() < config.fetch_request_contracts_max {
        let Some((hash, acc_key)) = pivot.fetch_contracts.pop_lru() else { break };
        if ignore.contains(&hash) {
            pivot.fetch_contracts.put(hash, acc_key);
            continue;
        }
        hashes.push(hash);
        owners.push(acc_key);
    }
    if hashes.is_empty() {
        return Ok(ContractFetchOutcome::default());
    }

    let reply = match wire.get_byte_codes(peer_id, hashes.clone(), config.request_size_cap as u64).await {
        Ok(reply) => reply,
        Err(err) => {
            for (hash, acc_key) in hashes.into_iter().zip(owners) {
                pivot.fetch_contracts.put(hash, acc_key);
            }
            return Err(err);
        }
    };

    let mut outcome = ContractFetchOutcome::default();
    let resolved: HashSet<H256> = reply.iter().map(|(hash, _)| *hash).collect();
    for (code_hash, blob) in &reply {
        code_store
            .put(keys::contract_code(code_hash), blob.to_vec())
            .map_err(|e| EngineError::DatabaseError(e.to_string()))?;
        outcome.codes_imported += 1;
    }
    for (hash, acc_key) in hashes.into_iter().zip(owners) {
        if !resolved.contains(&hash) {
            ignore.insert(hash);
            pivot.fetch_contracts.put(hash, acc_key);
            outcome.requeued += 1;
        }
    }
    pivot.n_contracts += outcome.codes_imported;
    Ok(outcome)
}

/// The backpressure policy: a global threshold on the combined
/// storage queue length pauses account range-fetching (bytecode is always
/// lower priority than both and isn't gated here).
pub fn should_pause_account_fetch(pivot: &Pivot, config: &Config) -> bool {
    pivot.storage_full_len() + pivot.storage_part_len() > config.storage_queue_backpressure_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;

    use snapsync_common::{AccountState, Header};
    use snapsync_storage::InMemoryKvStore;
    use snapsync_trie::{InMemoryTrieDB, Nibbles, Node, NodeRef};

    use crate::wire::messages::{
        AccountRange, AccountRangeUnit, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges, GetTrieNodes,
        StorageRanges, StorageSlot, TrieNodes,
    };

    fn header() -> Header {
        Header { number: 1, parent_hash: H256::zero(), state_root: H256::zero(), difficulty: U256::zero() }
    }

    fn acc_key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    struct InMemoryStorageTries {
        tries: HashMap<H256, Trie>,
        db: Arc<InMemoryTrieDB>,
    }

    impl InMemoryStorageTries {
        fn new() -> Self {
            Self { tries: HashMap::new(), db: Arc::new(InMemoryTrieDB::new()) }
        }
    }

    impl StorageTrieStore for InMemoryStorageTries {
        fn trie_for(&mut self, header: &AccountSlotsHeader) -> &mut Trie {
            self.tries
                .entry(header.acc_key)
                .or_insert_with(|| Trie::open(self.db.clone(), header.storage_root))
        }
    }

    /// A transport that hands back a single, fully-self-contained
    /// `AccountRange` reply (empty proof, meaning "this is the whole trie").
    struct SingleShotAccountTransport {
        accounts: Vec<(H256, AccountState)>,
    }

    #[async_trait(?Send)]
    impl Transport for SingleShotAccountTransport {
        async fn get_account_range(&self, _peer_id: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
            Ok(AccountRange {
                id: req.id,
                accounts: self
                    .accounts
                    .iter()
                    .map(|(hash, account)| AccountRangeUnit { hash: *hash, account: account.clone() })
                    .collect(),
                proof: Vec::new(),
            })
        }
        async fn get_storage_ranges(&self, _p: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError> {
            Ok(StorageRanges { id: req.id, slots: Vec::new(), proof: Vec::new() })
        }
        async fn get_byte_codes(&self, _p: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError> {
            Ok(ByteCodes { id: req.id, codes: Vec::new() })
        }
        async fn get_trie_nodes(&self, _p: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError> {
            Ok(TrieNodes { id: req.id, nodes: Vec::new() })
        }
    }

    #[tokio::test]
    async fn account_fetch_round_imports_accounts_and_marks_the_range_processed() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut reference = Trie::new(db);
        let account = AccountState { nonce: 1, ..AccountState::empty() };
        reference.insert(acc_key(1), account.encode_to_vec()).unwrap();
        let root_hash = reference.hash();

        let transport = SingleShotAccountTransport { accounts: vec![(acc_key(1), account)] };
        let wire = WireClient::new(transport);

        let mut pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));

        let outcome = account_fetch_round(&mut pivot, &mut trie, &wire, "peer-1", U256::MAX, &Config::default())
            .await
            .unwrap();

        assert_eq!(outcome.accounts_imported, 1);
        assert_eq!(outcome.storage_queued, 0);
        assert!(outcome.exhausted);
        assert!(pivot.fetch_accounts.processed.is_full());
        assert_eq!(pivot.n_accounts, 1);
    }

    #[test]
    fn should_pause_account_fetch_trips_past_the_configured_threshold() {
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        let config = Config { storage_queue_backpressure_threshold: 1, ..Config::default() };
        assert!(!should_pause_account_fetch(&pivot, &config));

        pivot.append_storage_full(AccountSlotsHeader { acc_key: acc_key(1), storage_root: acc_key(1), sub_range: None });
        pivot.append_storage_full(AccountSlotsHeader { acc_key: acc_key(2), storage_root: acc_key(2), sub_range: None });
        assert!(should_pause_account_fetch(&pivot, &config));
    }

    #[tokio::test]
    async fn contract_fetch_round_requeues_codes_the_peer_did_not_return() {
        struct PartialCodeTransport;
        #[async_trait(?Send)]
        impl Transport for PartialCodeTransport {
            async fn get_account_range(&self, _p: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
                Ok(AccountRange { id: req.id, accounts: Vec::new(), proof: Vec::new() })
            }
            async fn get_storage_ranges(&self, _p: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError> {
                Ok(StorageRanges { id: req.id, slots: Vec::new(), proof: Vec::new() })
            }
            async fn get_byte_codes(&self, _p: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError> {
                let code = Bytes::from_static(b"contract-bytecode");
                let only_first_hash = req.hashes.first().copied();
                let codes = if only_first_hash == Some(snapsync_crypto::keccak(&code)) {
                    vec![code]
                } else {
                    vec![]
                };
                Ok(ByteCodes { id: req.id, codes })
            }
            async fn get_trie_nodes(&self, _p: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError> {
                Ok(TrieNodes { id: req.id, nodes: Vec::new() })
            }
        }

        let wire = WireClient::new(PartialCodeTransport);
        let mut pivot = Pivot::new(header(), H256::zero(), NonZeroUsize::new(16).unwrap());
        let code = Bytes::from_static(b"contract-bytecode");
        let resolvable_hash = snapsync_crypto::keccak(&code);
        let other_hash = H256::repeat_byte(0xaa);
        pivot.fetch_contracts.put(resolvable_hash, acc_key(1));
        pivot.fetch_contracts.put(other_hash, acc_key(2));

        let store = InMemoryKvStore::new();
        let mut ignore = HashSet::new();
        let outcome = contract_fetch_round(&mut pivot, &store, &wire, "peer-1", &mut ignore, &Config::default())
            .await
            .unwrap();

        assert_eq!(outcome.codes_imported, 1);
        assert_eq!(outcome.requeued, 1);
        assert!(ignore.contains(&other_hash));
        assert_eq!(pivot.n_contracts, 1);
    }

    /// Follows `node_ref`'s path toward `target` only, collecting every
    /// hash-referenced node touched along the way — an edge proof covering
    /// just that one key, the same shape `collect_path` builds in
    /// `snapsync_trie::verify_range`'s own tests.
    fn collect_path(trie: &Trie, node_ref: &NodeRef, target: &Nibbles, out: &mut Vec<Bytes>) {
        let Some(node) = trie.get_node(node_ref).unwrap() else { return };
        if node_ref.as_hash().is_some() {
            out.push(Bytes::from(node.encode_raw()));
        }
        match node {
            Node::Leaf(_) => {}
            Node::Extension(ext) => collect_path(trie, &ext.child, &target.skip_prefix(ext.prefix.len()), out),
            Node::Branch(branch) => {
                let nibble = target.at(0) as usize;
                collect_path(trie, &branch.children[nibble], &target.skip_prefix(1), out)
            }
        }
    }

    /// A transport whose `AccountRange` reply is root-valid but silently
    /// skips `skipped_key`, leaving an edge proof that dangles exactly
    /// there.
    struct GappyAccountTransport {
        accounts: Vec<(H256, AccountState)>,
        proof: Vec<Bytes>,
    }

    #[async_trait(?Send)]
    impl Transport for GappyAccountTransport {
        async fn get_account_range(&self, _peer_id: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
            Ok(AccountRange {
                id: req.id,
                accounts: self
                    .accounts
                    .iter()
                    .map(|(hash, account)| AccountRangeUnit { hash: *hash, account: account.clone() })
                    .collect(),
                proof: self.proof.clone(),
            })
        }
        async fn get_storage_ranges(&self, _p: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError> {
            Ok(StorageRanges { id: req.id, slots: Vec::new(), proof: Vec::new() })
        }
        async fn get_byte_codes(&self, _p: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError> {
            Ok(ByteCodes { id: req.id, codes: Vec::new() })
        }
        async fn get_trie_nodes(&self, _p: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError> {
            Ok(TrieNodes { id: req.id, nodes: Vec::new() })
        }
    }

    #[tokio::test]
    async fn account_fetch_round_excludes_an_internal_gap_from_processed_and_requeues_it() {
        let key_for = |low_nibble: u8| {
            let mut bytes = [0x11u8; 32];
            bytes[31] = 0x10 | low_nibble;
            H256(bytes)
        };
        let key_a = key_for(0x0);
        let key_b = key_for(0x5);
        let key_c = key_for(0x9);
        let account_for = |nonce: u64| AccountState { nonce, ..AccountState::empty() };

        let mut reference = Trie::new(Arc::new(InMemoryTrieDB::new()));
        reference.insert(key_a, account_for(1).encode_to_vec()).unwrap();
        reference.insert(key_b, account_for(2).encode_to_vec()).unwrap();
        reference.insert(key_c, account_for(3).encode_to_vec()).unwrap();
        let root_hash = reference.hash();
        let root_ref = reference.root_ref().unwrap().clone();

        let mut proof = Vec::new();
        collect_path(&reference, &root_ref, &Nibbles::from_bytes(key_a.as_bytes()), &mut proof);
        collect_path(&reference, &root_ref, &Nibbles::from_bytes(key_c.as_bytes()), &mut proof);

        let transport = GappyAccountTransport {
            accounts: vec![(key_a, account_for(1)), (key_c, account_for(3))],
            proof,
        };
        let wire = WireClient::new(transport);

        let mut pivot = Pivot::new(header(), root_hash, NonZeroUsize::new(16).unwrap());
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));

        let outcome = account_fetch_round(&mut pivot, &mut trie, &wire, "peer-1", U256::MAX, &Config::default())
            .await
            .unwrap();

        assert_eq!(outcome.accounts_imported, 2);
        assert_eq!(outcome.gaps, 1);
        assert!(!pivot.fetch_accounts.processed.is_full());
        assert!(pivot.fetch_accounts.processed.covered(&NodeTagRange::new(key_b, key_b)).is_zero());
        assert_eq!(pivot.fetch_accounts.unprocessed_primary.covered(&NodeTagRange::new(key_b, key_b)), U256::from(1));
    }

    #[test]
    fn storage_trie_store_opens_one_trie_per_account() {
        let mut store = InMemoryStorageTries::new();
        let header_a = AccountSlotsHeader { acc_key: acc_key(1), storage_root: snapsync_trie::empty_trie_hash(), sub_range: None };
        let header_b = AccountSlotsHeader { acc_key: acc_key(2), storage_root: snapsync_trie::empty_trie_hash(), sub_range: None };
        let trie_a = store.trie_for(&header_a);
        assert_eq!(trie_a.hash(), snapsync_trie::empty_trie_hash());
        let _ = store.trie_for(&header_b);
        assert_eq!(store.tries.len(), 2);
    }
}
