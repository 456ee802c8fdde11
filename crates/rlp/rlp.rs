//! # snapsync-rlp
//!
//! Recursive Length Prefix (RLP) encoding and decoding.
//!
//! RLP is the wire serialization format for every `eth`/`snap` message the
//! sync engine sends and parses, and for the trie node bodies it hashes and
//! persists. This crate is assumed correct by the rest of the workspace; it
//! carries no snap-sync-specific logic of its own.
//!
//! ## Quick start
//!
//! ```rust
//! use snapsync_rlp::encode::RLPEncode;
//! use snapsync_rlp::decode::RLPDecode;
//!
//! let value: u64 = 42;
//! let encoded = value.encode_to_vec();
//! let decoded = u64::decode(&encoded).unwrap();
//! assert_eq!(value, decoded);
//! ```
//!
//! ## Builder structs
//!
//! Structured messages use the fluent builders in [`structs`]:
//!
//! ```rust
//! use snapsync_rlp::{encode::RLPEncode, decode::RLPDecode, structs::{Encoder, Decoder}, error::RLPDecodeError};
//!
//! struct Pair { a: u8, b: u16 }
//!
//! impl RLPEncode for Pair {
//!     fn encode(&self, buf: &mut dyn bytes::BufMut) {
//!         Encoder::new(buf).encode_field(&self.a).encode_field(&self.b).finish();
//!     }
//! }
//!
//! impl RLPDecode for Pair {
//!     fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
//!         let decoder = Decoder::new(rlp)?;
//!         let (a, decoder) = decoder.decode_field("a")?;
//!         let (b, decoder) = decoder.decode_field("b")?;
//!         let rest = decoder.finish()?;
//!         Ok((Pair { a, b }, rest))
//!     }
//! }
//! ```

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;
