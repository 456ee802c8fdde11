//! Account state as stored in the accounts trie — the leaf value produced by
//! `GetAccountRange` replies and healed leaves alike.

use ethereum_types::{H256, U256};
use snapsync_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl AccountState {
    /// keccak256 of the empty byte string — the code hash of an EOA or a
    /// not-yet-deployed contract.
    pub const EMPTY_CODE_HASH: H256 = H256([
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
        0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
        0xa4, 0x47,
    ]);

    /// keccak256 of RLP(empty string) — the root of an account with no storage.
    pub const EMPTY_STORAGE_ROOT: H256 = H256([
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
        0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
        0xb4, 0x21,
    ]);

    pub fn empty() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            storage_root: Self::EMPTY_STORAGE_ROOT,
            code_hash: Self::EMPTY_CODE_HASH,
        }
    }

    /// True if the account has no outstanding storage trie to fetch.
    pub fn has_storage(&self) -> bool {
        self.storage_root != Self::EMPTY_STORAGE_ROOT
    }

    /// True if the account has bytecode to fetch.
    pub fn has_code(&self) -> bool {
        self.code_hash != Self::EMPTY_CODE_HASH
    }
}

impl RLPEncode for AccountState {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for AccountState {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (storage_root, decoder) = decoder.decode_field("storageRoot")?;
        let (code_hash, decoder) = decoder.decode_field("codeHash")?;
        let rest = decoder.finish()?;
        Ok((
            AccountState { nonce, balance, storage_root, code_hash },
            rest,
        ))
    }
}
