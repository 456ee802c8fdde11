//! Persistence of pivot progress under the `P` key, so a restart
//! picks up range-fetch/healing where it left off instead of re-downloading
//! everything. Only the interval boundaries are persisted here; individual
//! trie nodes are already durable the moment they're verified and written
//! under their own `S·` key.

use ethereum_types::H256;
use snapsync_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::{error::StorageError, keys, kv::KvStore};

/// The durable slice of a pivot's progress: its target root and the
/// `processed` account-range boundaries (storage/contract queues are cheap
/// to rebuild by re-scanning accounts, so they aren't snapshotted).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PivotSnapshot {
    pub state_root: H256,
    pub processed: Vec<(H256, H256)>,
}

impl RLPEncode for PivotSnapshot {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.state_root)
            .encode_field(&self.processed)
            .finish();
    }
}

impl RLPDecode for PivotSnapshot {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (state_root, decoder) = decoder.decode_field("stateRoot")?;
        let (processed, decoder) = decoder.decode_field("processed")?;
        let rest = decoder.finish()?;
        Ok((PivotSnapshot { state_root, processed }, rest))
    }
}

impl PivotSnapshot {
    pub fn save(&self, store: &impl KvStore) -> Result<(), StorageError> {
        store.put(keys::pivot_snapshot(), self.encode_to_vec())
    }

    pub fn load(store: &impl KvStore) -> Result<Option<PivotSnapshot>, StorageError> {
        let Some(bytes) = store.get(&keys::pivot_snapshot())? else {
            return Ok(None);
        };
        PivotSnapshot::decode(&bytes)
            .map(Some)
            .map_err(|_| StorageError::MalformedSnapshot(keys::pivot_snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    #[test]
    fn roundtrips_through_rlp() {
        let snapshot = PivotSnapshot {
            state_root: H256::repeat_byte(1),
            processed: vec![(H256::zero(), H256::repeat_byte(0x0f))],
        };
        let encoded = snapshot.encode_to_vec();
        assert_eq!(PivotSnapshot::decode(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn save_then_load_through_a_store() {
        let store = InMemoryKvStore::new();
        assert!(PivotSnapshot::load(&store).unwrap().is_none());

        let snapshot = PivotSnapshot {
            state_root: H256::repeat_byte(2),
            processed: vec![(H256::zero(), H256::repeat_byte(0xff))],
        };
        snapshot.save(&store).unwrap();
        assert_eq!(PivotSnapshot::load(&store).unwrap(), Some(snapshot));
    }
}
