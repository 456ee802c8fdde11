//! A self-contained network fixture standing in for the rlpx/peer-discovery
//! layer (out of scope per the engine's design — see DESIGN.md). It plays
//! the role of a single remote peer serving a synthetic state trie, so the
//! binary has something real to sync against without a live node.
//!
//! Grounded the same way `tests/scenarios.rs` builds its peer doubles: a
//! reference account trie plus per-account storage tries, all backed by one
//! shared [`TrieDB`] (nodes are content-addressed, so account and storage
//! node blobs coexist in a single store exactly like `EngineStorageTries`
//! does in the real engine).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{H256, U256};

use snapsync_common::{AccountState, Header};
use snapsync_crypto::keccak;
use snapsync_p2p::envelope::NodeSpecs;
use snapsync_p2p::healer::TrieNodeSource;
use snapsync_p2p::wire::{
    AccountRange, AccountRangeUnit, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges, GetTrieNodes,
    StorageRanges, StorageSlot, Transport, TrieNodes,
};
use snapsync_p2p::EngineError;
use snapsync_rlp::encode::RLPEncode;
use snapsync_trie::{InMemoryTrieDB, Node, NodeRef, Trie, TrieDB};

/// Every node reachable from `trie`'s root, keyed by its own hash — generous
/// enough that a verifier can reconstruct the whole trie regardless of which
/// sub-range it actually claimed (mirrors `whole_trie_proof`/`collect` in
/// `tests/scenarios.rs`).
fn whole_trie_proof(trie: &Trie) -> Vec<Bytes> {
    let mut out = Vec::new();
    if let Some(root) = trie.root_ref() {
        collect(trie, root, &mut out);
    }
    out
}

fn collect(trie: &Trie, node_ref: &NodeRef, out: &mut Vec<Bytes>) {
    let Some(node) = trie.get_node(node_ref).expect("demo world trie is well-formed") else { return };
    if matches!(node_ref, NodeRef::Hash(_)) {
        out.push(Bytes::from(node.encode_raw()));
    }
    match node {
        Node::Leaf(_) => {}
        Node::Extension(ext) => collect(trie, &ext.child, out),
        Node::Branch(branch) => {
            for child in branch.children.iter() {
                if !child.is_empty() {
                    collect(trie, child, out);
                }
            }
        }
    }
}

/// The synthetic remote peer. Always answers with its entire reference
/// state and a generous proof — there is no byte-cap truncation to
/// simulate, so every round-trip behaves like talking to a single
/// cooperative, fully-synced peer.
pub struct DemoPeer {
    db: Arc<dyn TrieDB>,
    account_root: H256,
    accounts: Vec<(H256, AccountState)>,
    storage_slots: HashMap<H256, Vec<(H256, U256)>>,
    codes: HashMap<H256, Bytes>,
}

#[async_trait(?Send)]
impl Transport for DemoPeer {
    async fn get_account_range(&self, _peer_id: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
        let accounts = self
            .accounts
            .iter()
            .filter(|(hash, _)| *hash >= req.starting_hash && *hash <= req.limit_hash)
            .map(|(hash, account)| AccountRangeUnit { hash: *hash, account: account.clone() })
            .collect();
        let trie = Trie::open(self.db.clone(), self.account_root);
        Ok(AccountRange { id: req.id, accounts, proof: whole_trie_proof(&trie) })
    }

    async fn get_storage_ranges(&self, _peer_id: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError> {
        let mut slots = Vec::with_capacity(req.account_hashes.len());
        let mut last_storage_root = None;
        for acc_hash in &req.account_hashes {
            let Some((_, account)) = self.accounts.iter().find(|(hash, _)| hash == acc_hash) else {
                slots.push(Vec::new());
                continue;
            };
            let filtered = self
                .storage_slots
                .get(acc_hash)
                .into_iter()
                .flatten()
                .filter(|(hash, _)| *hash >= req.starting_hash && *hash <= req.limit_hash)
                .map(|(hash, data)| StorageSlot { hash: *hash, data: *data })
                .collect();
            last_storage_root = Some(account.storage_root);
            slots.push(filtered);
        }
        let proof = match last_storage_root {
            Some(root) => whole_trie_proof(&Trie::open(self.db.clone(), root)),
            None => Vec::new(),
        };
        Ok(StorageRanges { id: req.id, slots, proof })
    }

    async fn get_byte_codes(&self, _peer_id: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError> {
        let mut codes = Vec::new();
        for hash in &req.hashes {
            let Some(code) = self.codes.get(hash) else { break };
            codes.push(code.clone());
        }
        Ok(ByteCodes { id: req.id, codes })
    }

    /// Never actually called: the engine's healer talks to a peer through
    /// the synchronous [`TrieNodeSource`] seam below, not through
    /// `WireClient::get_trie_nodes`. Kept faithful to the trait rather than
    /// left out, the same way the test doubles in this workspace stub it.
    async fn get_trie_nodes(&self, _peer_id: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError> {
        Ok(TrieNodes { id: req.id, nodes: Vec::new() })
    }
}

/// Serves healing's node-by-node requests directly out of the shared
/// content-addressed store — works for both the account trie and every
/// storage trie, since a node's key is its own hash regardless of which
/// logical trie it belongs to.
pub struct DemoTrieSource {
    db: Arc<dyn TrieDB>,
}

impl TrieNodeSource for DemoTrieSource {
    fn get_trie_nodes(&mut self, _root_hash: H256, specs: Vec<NodeSpecs>) -> Result<Vec<NodeSpecs>, EngineError> {
        specs
            .into_iter()
            .map(|mut spec| {
                spec.data = self.db.get(spec.node_key.as_bytes()).map_err(EngineError::from)?;
                Ok(spec)
            })
            .collect()
    }
}

pub struct DemoWorld {
    pub header: Header,
    pub peer: DemoPeer,
    pub heal_source: DemoTrieSource,
}

/// Builds a synthetic state: `n_accounts` accounts, roughly a third holding
/// a small storage trie and a quarter holding bytecode, deterministic in
/// content (so repeated runs against the same `--demo-accounts` are
/// reproducible) but spread across the keyspace the way keccak-addressed
/// accounts actually are.
pub fn build_demo_world(n_accounts: usize) -> DemoWorld {
    let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
    let mut account_trie = Trie::new(db.clone());

    let mut accounts = Vec::with_capacity(n_accounts);
    let mut storage_slots = HashMap::new();
    let mut codes = HashMap::new();

    for i in 0..n_accounts {
        let acc_key = keccak(format!("snapsync-demo-account-{i}").as_bytes());
        let mut account = AccountState { nonce: i as u64, balance: U256::from(i as u64 + 1), ..AccountState::empty() };

        if i % 3 == 0 {
            let mut storage_trie = Trie::new(db.clone());
            let mut slots = Vec::new();
            for s in 0..(2 + i % 5) {
                let slot_key = keccak(format!("snapsync-demo-slot-{i}-{s}").as_bytes());
                let value = U256::from(s as u64 + 1);
                storage_trie
                    .insert(slot_key, value.encode_to_vec())
                    .expect("insert into demo storage trie");
                slots.push((slot_key, value));
            }
            slots.sort_by_key(|(hash, _)| *hash);
            account.storage_root = storage_trie.hash();
            storage_slots.insert(acc_key, slots);
        }

        if i % 4 == 1 {
            let code = Bytes::from(format!("snapsync-demo-bytecode-{i}").into_bytes());
            account.code_hash = keccak(&code);
            codes.insert(account.code_hash, code);
        }

        account_trie
            .insert(acc_key, account.encode_to_vec())
            .expect("insert into demo account trie");
        accounts.push((acc_key, account));
    }
    accounts.sort_by_key(|(hash, _)| *hash);

    let account_root = account_trie.hash();
    let header = Header { number: 1, parent_hash: H256::zero(), state_root: account_root, difficulty: U256::zero() };

    DemoWorld {
        header,
        peer: DemoPeer { db: db.clone(), account_root, accounts, storage_slots, codes },
        heal_source: DemoTrieSource { db },
    }
}
