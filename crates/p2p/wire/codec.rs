//! RLP + snappy codec for the snap/1 messages. Every
//! message is RLP-encoded then snappy-compressed on the wire, exactly as the
//! reference protocol does for every rlpx subprotocol message.

use bytes::{BufMut, Bytes};
use snap::raw::{Decoder as SnappyDecoder, Encoder as SnappyEncoder, max_compress_len};

use snapsync_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};

use super::messages::{
    AccountRange, AccountRangeUnit, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges,
    GetTrieNodes, StorageRanges, StorageSlot, TrieNodes,
};

/// Snap/1 message codes.
pub mod codes {
    pub const GET_ACCOUNT_RANGE: u8 = 0x00;
    pub const ACCOUNT_RANGE: u8 = 0x01;
    pub const GET_STORAGE_RANGES: u8 = 0x02;
    pub const STORAGE_RANGES: u8 = 0x03;
    pub const GET_BYTE_CODES: u8 = 0x04;
    pub const BYTE_CODES: u8 = 0x05;
    pub const GET_TRIE_NODES: u8 = 0x06;
    pub const TRIE_NODES: u8 = 0x07;
}

/// A message belonging to the snap/1 subprotocol, carrying its own wire code
/// and the RLP+snappy wrapping used for every request/reply on this wire.
pub trait SnapMessage: Sized {
    const CODE: u8;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError>;
    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError>;
}

pub fn snappy_compress(encoded: Vec<u8>) -> Result<Vec<u8>, RLPEncodeError> {
    let mut encoder = SnappyEncoder::new();
    let mut out = vec![0; max_compress_len(encoded.len()) + 1];
    let size = encoder
        .compress(&encoded, &mut out)
        .map_err(|e| RLPEncodeError::InvalidCompression(e.to_string()))?;
    out.truncate(size);
    Ok(out)
}

pub fn snappy_decompress(msg_data: &[u8]) -> Result<Vec<u8>, RLPDecodeError> {
    let mut decoder = SnappyDecoder::new();
    decoder
        .decompress_vec(msg_data)
        .map_err(|e| RLPDecodeError::InvalidCompression(e.to_string()))
}

impl RLPEncode for AccountRangeUnit {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf).encode_field(&self.hash).encode_field(&self.account).finish();
    }
}

impl RLPDecode for AccountRangeUnit {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (account, decoder) = decoder.decode_field("body")?;
        let rest = decoder.finish()?;
        Ok((AccountRangeUnit { hash, account }, rest))
    }
}

impl RLPEncode for StorageSlot {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf).encode_field(&self.hash).encode_field(&self.data).finish();
    }
}

impl RLPDecode for StorageSlot {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let rest = decoder.finish()?;
        Ok((StorageSlot { hash, data }, rest))
    }
}

impl SnapMessage for GetAccountRange {
    const CODE: u8 = codes::GET_ACCOUNT_RANGE;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.starting_hash)
            .encode_field(&self.limit_hash)
            .encode_field(&self.response_bytes)
            .finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (starting_hash, decoder) = decoder.decode_field("startingHash")?;
        let (limit_hash, decoder) = decoder.decode_field("limitHash")?;
        let (response_bytes, decoder) = decoder.decode_field("responseBytes")?;
        decoder.finish()?;
        Ok(Self { id, root_hash, starting_hash, limit_hash, response_bytes })
    }
}

impl SnapMessage for AccountRange {
    const CODE: u8 = codes::ACCOUNT_RANGE;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded)
            .encode_field(&self.id)
            .encode_field(&self.accounts)
            .encode_field(&self.proof)
            .finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (accounts, decoder) = decoder.decode_field("accounts")?;
        let (proof, decoder) = decoder.decode_field("proof")?;
        decoder.finish()?;
        Ok(Self { id, accounts, proof })
    }
}

impl SnapMessage for GetStorageRanges {
    const CODE: u8 = codes::GET_STORAGE_RANGES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.account_hashes)
            .encode_field(&self.starting_hash)
            .encode_field(&self.limit_hash)
            .encode_field(&self.response_bytes)
            .finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (account_hashes, decoder) = decoder.decode_field("accountHashes")?;
        let (starting_hash, decoder) = decoder.decode_field("startingHash")?;
        let (limit_hash, decoder) = decoder.decode_field("limitHash")?;
        let (response_bytes, decoder) = decoder.decode_field("responseBytes")?;
        decoder.finish()?;
        Ok(Self { id, root_hash, account_hashes, starting_hash, limit_hash, response_bytes })
    }
}

impl SnapMessage for StorageRanges {
    const CODE: u8 = codes::STORAGE_RANGES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded)
            .encode_field(&self.id)
            .encode_field(&self.slots)
            .encode_field(&self.proof)
            .finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (slots, decoder) = decoder.decode_field("slots")?;
        let (proof, decoder) = decoder.decode_field("proof")?;
        decoder.finish()?;
        Ok(Self { id, slots, proof })
    }
}

impl SnapMessage for GetByteCodes {
    const CODE: u8 = codes::GET_BYTE_CODES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded).encode_field(&self.id).encode_field(&self.hashes).encode_field(&self.bytes).finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (hashes, decoder) = decoder.decode_field("hashes")?;
        let (bytes, decoder) = decoder.decode_field("bytes")?;
        decoder.finish()?;
        Ok(Self { id, hashes, bytes })
    }
}

impl SnapMessage for ByteCodes {
    const CODE: u8 = codes::BYTE_CODES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded).encode_field(&self.id).encode_field(&self.codes).finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (codes, decoder) = decoder.decode_field("codes")?;
        decoder.finish()?;
        Ok(Self { id, codes })
    }
}

impl SnapMessage for GetTrieNodes {
    const CODE: u8 = codes::GET_TRIE_NODES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.paths)
            .encode_field(&self.bytes)
            .finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (paths, decoder) = decoder.decode_field("paths")?;
        let (bytes, decoder) = decoder.decode_field("bytes")?;
        decoder.finish()?;
        Ok(Self { id, root_hash, paths, bytes })
    }
}

impl SnapMessage for TrieNodes {
    const CODE: u8 = codes::TRIE_NODES;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded = vec![];
        Encoder::new(&mut encoded).encode_field(&self.id).encode_field(&self.nodes).finish();
        buf.put_slice(&snappy_compress(encoded)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed)?;
        let (id, decoder) = decoder.decode_field("requestId")?;
        let (nodes, decoder) = decoder.decode_field("nodes")?;
        decoder.finish()?;
        Ok(Self { id, nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{H256, U256};
    use snapsync_common::AccountState;

    #[test]
    fn get_account_range_roundtrips() {
        let msg = GetAccountRange {
            id: 7,
            root_hash: H256::repeat_byte(1),
            starting_hash: H256::zero(),
            limit_hash: H256::repeat_byte(0xff),
            response_bytes: 1 << 20,
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();
        let decoded = GetAccountRange::decode(&buf).unwrap();
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.root_hash, msg.root_hash);
        assert_eq!(decoded.response_bytes, msg.response_bytes);
    }

    #[test]
    fn account_range_roundtrips_with_accounts_and_proof() {
        let msg = AccountRange {
            id: 1,
            accounts: vec![AccountRangeUnit { hash: H256::repeat_byte(2), account: AccountState::empty() }],
            proof: vec![Bytes::from_static(b"node-bytes")],
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();
        let decoded = AccountRange::decode(&buf).unwrap();
        assert_eq!(decoded.accounts, msg.accounts);
        assert_eq!(decoded.proof, msg.proof);
    }

    #[test]
    fn storage_slot_roundtrips() {
        let slot = StorageSlot { hash: H256::repeat_byte(3), data: U256::from(42) };
        let encoded = slot.encode_to_vec();
        assert_eq!(StorageSlot::decode(&encoded).unwrap(), slot);
    }
}
