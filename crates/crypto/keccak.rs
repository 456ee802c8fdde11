//! Keccak-256, the only hash function the trie and snap-sync wire format need.
//!
//! The production client picks a platform-specific assembly implementation
//! when one is available; we always use the portable `tiny-keccak` fallback,
//! which is correct on every target and is what the reference implementation
//! itself falls back to off x86_64/aarch64.

use ethereum_types::H256;
use tiny_keccak::{Hasher, Keccak};

/// Hashes `data` with Keccak-256 in one shot.
pub fn keccak_hash(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(data.as_ref());
    hasher.finalize(&mut out);
    out
}

/// Same as [`keccak_hash`] but returns an [`H256`] for direct use as a trie key.
pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256(keccak_hash(data))
}

/// Streaming Keccak-256, for building up a digest over several `update` calls
/// (used when assembling RLP node bodies before hashing).
#[derive(Clone)]
pub struct Keccak256 {
    inner: Keccak,
}

impl Default for Keccak256 {
    fn default() -> Self {
        Self { inner: Keccak::v256() }
    }
}

impl Keccak256 {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn update(mut self, data: impl AsRef<[u8]>) -> Self {
        self.inner.update(data.as_ref());
        self
    }

    pub fn finalize(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.inner.finalize(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        let got = keccak_hash(b"");
        let want =
            hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47")
                .unwrap();
        assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let one_shot = keccak_hash(b"hello world");
        let streaming = Keccak256::new().update(b"hello").update(b" world").finalize();
        assert_eq!(one_shot, streaming);
    }
}
