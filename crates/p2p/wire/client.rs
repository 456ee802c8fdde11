//! Verified request adapters. [`Transport`] is the seam a real
//! rlpx connection plugs into; [`WireClient`] wraps it and never hands the
//! rest of the engine an unverified reply — every method either returns data
//! that has already been checked against its claimed root/hash, or an
//! [`EngineError`] that the caller folds into a buddy's error count.

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::H256;

use snapsync_rlp::encode::RLPEncode;
use snapsync_trie::{verify_range, Nibbles};

use crate::envelope::NodeSpecs;
use crate::error::EngineError;

use super::messages::{
    AccountRange, AccountRangeUnit, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges,
    GetTrieNodes, StorageRanges, StorageSlot, TrieNodes,
};

/// Everything a buddy needs to actually move bytes to and from a peer. A real
/// implementation sends an rlpx subprotocol message and awaits the matching
/// reply by request id; tests implement it directly over an in-memory store.
#[async_trait(?Send)]
pub trait Transport {
    async fn get_account_range(&self, peer_id: &str, req: GetAccountRange) -> Result<AccountRange, EngineError>;
    async fn get_storage_ranges(&self, peer_id: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError>;
    async fn get_byte_codes(&self, peer_id: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError>;
    async fn get_trie_nodes(&self, peer_id: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError>;
}

/// A verified batch of accounts, plus whether the reply's proof bracketed a
/// final entry short of `limit_hash` (meaning more lies beyond it) or closed
/// out the requested range.
pub struct VerifiedAccountRange {
    pub accounts: Vec<AccountRangeUnit>,
    pub exhausted: bool,
    /// Partial paths of dangling child references the proof left inside the
    /// claimed range — accounts the peer silently skipped despite an
    /// otherwise root-valid reply. Callers must exclude these from whatever
    /// they mark processed and queue them for healing.
    pub gaps: Vec<Nibbles>,
}

pub struct VerifiedStorageRanges {
    /// One verified slot list per requested account, in request order.
    /// Shorter than the request if the peer ran out of room; the caller
    /// re-requests the remainder starting after the last returned account.
    pub slots: Vec<Vec<StorageSlot>>,
    /// True if the last account's slot list was proven complete rather than
    /// left dangling on an unresolved right edge.
    pub last_account_complete: bool,
}

/// Thin wrapper over a [`Transport`] that verifies every reply before
/// returning it.
pub struct WireClient<T: Transport> {
    transport: T,
}

impl<T: Transport> WireClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn get_account_range(
        &self,
        peer_id: &str,
        root_hash: H256,
        starting_hash: H256,
        limit_hash: H256,
        response_bytes: u64,
    ) -> Result<VerifiedAccountRange, EngineError> {
        let req = GetAccountRange { id: next_id(), root_hash, starting_hash, limit_hash, response_bytes };
        let reply = self.transport.get_account_range(peer_id, req).await?;

        if reply.accounts.is_empty() {
            if reply.proof.is_empty() {
                return Err(EngineError::BadProof(root_hash));
            }
            return Ok(VerifiedAccountRange { accounts: Vec::new(), exhausted: false, gaps: Vec::new() });
        }

        let keys: Vec<H256> = reply.accounts.iter().map(|u| u.hash).collect();
        let values: Vec<Vec<u8>> = reply.accounts.iter().map(|u| u.account.encode_to_vec()).collect();
        let verified = verify_range(root_hash, starting_hash, &keys, &values, &decode_proof(&reply.proof))?;
        if !verified.root_matches {
            return Err(EngineError::BadProof(root_hash));
        }

        let exhausted = reply.proof.is_empty() || *keys.last().expect("checked non-empty above") >= limit_hash;
        Ok(VerifiedAccountRange { accounts: reply.accounts, exhausted, gaps: verified.gaps })
    }

    pub async fn get_storage_ranges(
        &self,
        peer_id: &str,
        root_hash: H256,
        account_hashes: Vec<H256>,
        account_storage_roots: &[H256],
        starting_hash: H256,
        limit_hash: H256,
        response_bytes: u64,
    ) -> Result<VerifiedStorageRanges, EngineError> {
        let req = GetStorageRanges {
            id: next_id(),
            root_hash,
            account_hashes: account_hashes.clone(),
            starting_hash,
            limit_hash,
            response_bytes,
        };
        let reply = self.transport.get_storage_ranges(peer_id, req).await?;

        if reply.slots.len() > account_hashes.len() {
            return Err(EngineError::BadProof(root_hash));
        }

        let decoded_proof = decode_proof(&reply.proof);
        let last_index = reply.slots.len().saturating_sub(1);
        for (i, slots) in reply.slots.iter().enumerate() {
            if slots.is_empty() {
                continue;
            }
            let storage_root = account_storage_roots
                .get(i)
                .copied()
                .ok_or_else(|| EngineError::BadProof(root_hash))?;
            let keys: Vec<H256> = slots.iter().map(|s| s.hash).collect();
            let values: Vec<Vec<u8>> = slots.iter().map(|s| s.data.encode_to_vec()).collect();
            let is_last = i == last_index;
            let proof = if is_last { &decoded_proof[..] } else { &[][..] };
            let verified = verify_range(storage_root, starting_hash, &keys, &values, proof)?;
            if !verified.root_matches {
                return Err(EngineError::RightBoundaryProofFailed(storage_root));
            }
        }

        let last_account_complete = reply.slots.len() < account_hashes.len() || decoded_proof.is_empty();
        Ok(VerifiedStorageRanges { slots: reply.slots, last_account_complete })
    }

    pub async fn get_byte_codes(
        &self,
        peer_id: &str,
        hashes: Vec<H256>,
        bytes_cap: u64,
    ) -> Result<Vec<(H256, Bytes)>, EngineError> {
        let req = GetByteCodes { id: next_id(), hashes: hashes.clone(), bytes: bytes_cap };
        let reply = self.transport.get_byte_codes(peer_id, req).await?;

        if reply.codes.len() > hashes.len() {
            return Err(EngineError::BadProof(H256::zero()));
        }
        let mut verified = Vec::with_capacity(reply.codes.len());
        for (hash, code) in hashes.iter().zip(reply.codes.iter()) {
            if snapsync_crypto::keccak(code) != *hash {
                return Err(EngineError::BadProof(*hash));
            }
            verified.push((*hash, code.clone()));
        }
        Ok(verified)
    }

    pub async fn get_trie_nodes(
        &self,
        peer_id: &str,
        root_hash: H256,
        mut specs: Vec<NodeSpecs>,
        bytes_cap: u64,
    ) -> Result<Vec<NodeSpecs>, EngineError> {
        let paths: Vec<Vec<Bytes>> = specs
            .iter()
            .map(|spec| vec![Bytes::from(spec.partial_path.encode_compact(false))])
            .collect();
        let req = GetTrieNodes { id: next_id(), root_hash, paths, bytes: bytes_cap };
        let reply = self.transport.get_trie_nodes(peer_id, req).await?;

        if reply.nodes.len() > specs.len() {
            return Err(EngineError::BadProof(root_hash));
        }
        for (spec, node) in specs.iter_mut().zip(reply.nodes.into_iter()) {
            if snapsync_crypto::keccak(&node) != spec.node_key {
                return Err(EngineError::BadProof(spec.node_key));
            }
            spec.data = Some(node.to_vec());
        }
        Ok(specs)
    }
}

fn decode_proof(proof: &[Bytes]) -> Vec<Vec<u8>> {
    proof.iter().map(|b| b.to_vec()).collect()
}

static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn account_range_with_no_proof_and_no_accounts_is_rejected() {
        struct EmptyTransport;
        #[async_trait(?Send)]
        impl Transport for EmptyTransport {
            async fn get_account_range(&self, _peer_id: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
                Ok(AccountRange { id: req.id, accounts: Vec::new(), proof: Vec::new() })
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

        let client = WireClient::new(EmptyTransport);
        let result = client
            .get_account_range(
                "peer-1",
                H256::repeat_byte(9),
                H256::zero(),
                H256::repeat_byte(0xff),
                1 << 20,
            )
            .await;
        assert!(matches!(result, Err(EngineError::BadProof(_))));
    }

    #[tokio::test]
    async fn byte_codes_with_mismatched_hash_is_rejected() {
        struct BadCodeTransport;
        #[async_trait(?Send)]
        impl Transport for BadCodeTransport {
            async fn get_account_range(&self, _p: &str, req: GetAccountRange) -> Result<AccountRange, EngineError> {
                Ok(AccountRange { id: req.id, accounts: Vec::new(), proof: Vec::new() })
            }
            async fn get_storage_ranges(&self, _p: &str, req: GetStorageRanges) -> Result<StorageRanges, EngineError> {
                Ok(StorageRanges { id: req.id, slots: Vec::new(), proof: Vec::new() })
            }
            async fn get_byte_codes(&self, _p: &str, req: GetByteCodes) -> Result<ByteCodes, EngineError> {
                Ok(ByteCodes { id: req.id, codes: vec![Bytes::from_static(b"not-the-code")] })
            }
            async fn get_trie_nodes(&self, _p: &str, req: GetTrieNodes) -> Result<TrieNodes, EngineError> {
                Ok(TrieNodes { id: req.id, nodes: Vec::new() })
            }
        }

        let client = WireClient::new(BadCodeTransport);
        let result = client.get_byte_codes("peer-1", vec![H256::repeat_byte(0xaa)], 1 << 20).await;
        assert!(matches!(result, Err(EngineError::BadProof(_))));
    }
}
