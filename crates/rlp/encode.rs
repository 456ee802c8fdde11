use bytes::{BufMut, Bytes};
use ethereum_types::{Address, H256, U256};

use super::constants::RLP_NULL;

/// Encodes `value` into a freshly-allocated `Vec<u8>`.
pub fn encode<T: RLPEncode>(value: T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

#[inline(always)]
const fn impl_length_integers(bits: u32, lsb: u8) -> usize {
    let sig_len = (bits + 8) >> 3;
    let is_multibyte_mask = ((sig_len > 1) as usize) | ((lsb > 0x7f) as usize);
    1 + sig_len as usize * is_multibyte_mask
}

/// Byte length of the list-prefix + payload for a list of total payload size `payload_len`.
#[inline]
pub const fn list_length(payload_len: usize) -> usize {
    if payload_len < 56 {
        1 + payload_len
    } else {
        let be_len = payload_len.ilog2() / 8 + 1;
        1 + be_len as usize + payload_len
    }
}

/// `BufMut` that only counts bytes, used to compute `RLPEncode::length` without allocating.
#[derive(Debug, Clone, Copy, Default)]
struct ByteCounter {
    count: usize,
}

unsafe impl BufMut for ByteCounter {
    fn remaining_mut(&self) -> usize {
        usize::MAX - self.count
    }
    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.count += cnt;
    }
    fn chunk_mut(&mut self) -> &mut bytes::buf::UninitSlice {
        unreachable!("ByteCounter never hands out a raw chunk")
    }
    fn put<T: bytes::buf::Buf>(&mut self, src: T) {
        self.count += src.remaining();
    }
    fn put_bytes(&mut self, _val: u8, cnt: usize) {
        self.count += cnt;
    }
    fn put_slice(&mut self, src: &[u8]) {
        self.count += src.len()
    }
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut counter = ByteCounter::default();
        self.encode(&mut counter);
        counter.count
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(if *self { 0x01 } else { RLP_NULL });
    }
    fn length(&self) -> usize {
        1
    }
}

#[inline]
fn impl_encode<const N: usize>(value_be: [u8; N], buf: &mut dyn BufMut) {
    let mut i = 0;
    while i < N && value_be[i] == 0 {
        i += 1;
    }
    if i == N {
        buf.put_u8(RLP_NULL);
        return;
    }
    let first = value_be[i];
    if i == N - 1 && first <= 0x7f {
        buf.put_u8(first);
        return;
    }
    let len = N - i;
    buf.put_u8(RLP_NULL + len as u8);
    buf.put_slice(&value_be[i..]);
}

macro_rules! impl_encode_uint {
    ($t:ty) => {
        impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                impl_encode(self.to_be_bytes(), buf);
            }
            #[inline]
            fn length(&self) -> usize {
                impl_length_integers(self.checked_ilog2().unwrap_or(0), (*self & 0xff) as u8)
            }
        }
    };
}

impl RLPEncode for u8 {
    fn encode(&self, buf: &mut dyn BufMut) {
        impl_encode(self.to_be_bytes(), buf);
    }
    fn length(&self) -> usize {
        impl_length_integers(self.checked_ilog2().unwrap_or(0), *self)
    }
}
impl_encode_uint!(u16);
impl_encode_uint!(u32);
impl_encode_uint!(u64);
impl_encode_uint!(u128);
impl_encode_uint!(usize);

impl RLPEncode for [u8] {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
        } else {
            let len = self.len();
            if len < 56 {
                buf.put_u8(RLP_NULL + len as u8);
            } else {
                let bytes = len.to_be_bytes();
                let start = bytes.iter().position(|&x| x != 0).unwrap_or(bytes.len() - 1);
                let be_len = bytes.len() - start;
                buf.put_u8(0xb7 + be_len as u8);
                buf.put_slice(&bytes[start..]);
            }
            buf.put_slice(self);
        }
    }

    #[inline]
    fn length(&self) -> usize {
        if self.is_empty() {
            return 1;
        }
        if self.len() == 1 && self[0] < RLP_NULL {
            return 1;
        }
        if self.len() < 56 {
            return 1 + self.len();
        }
        let be_len = self.len().ilog2() / 8 + 1;
        1 + be_len as usize + self.len()
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf)
    }
    fn length(&self) -> usize {
        self.as_slice().length()
    }
}

impl RLPEncode for Vec<u8> {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf)
    }
    fn length(&self) -> usize {
        self.as_slice().length()
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
    fn length(&self) -> usize {
        self.as_ref().length()
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
    fn length(&self) -> usize {
        RLPEncode::length(self.as_bytes())
    }
}

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.0.encode(buf)
    }
    fn length(&self) -> usize {
        self.0.length()
    }
}

impl RLPEncode for Address {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.0.encode(buf)
    }
    fn length(&self) -> usize {
        self.0.length()
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let leading_zero_bytes = (self.leading_zeros() / 8) as usize;
        let bytes = self.to_big_endian();
        bytes[leading_zero_bytes..].encode(buf)
    }
    fn length(&self) -> usize {
        let ilog = self.bits().saturating_sub(1);
        impl_length_integers(ilog as u32, (self.low_u32() & 0xff) as u8)
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.is_empty() {
            buf.put_u8(RLP_NULL + 0x40); // 0xc0
        } else {
            let payload_len: usize = self.iter().map(RLPEncode::length).sum();
            encode_length(payload_len, buf);
            for item in self {
                item.encode(buf);
            }
        }
    }
    fn length(&self) -> usize {
        list_length(self.iter().map(RLPEncode::length).sum())
    }
}

pub fn encode_length(total_len: usize, buf: &mut dyn BufMut) {
    if total_len < 56 {
        buf.put_u8(0xc0 + total_len as u8);
    } else {
        let bytes = total_len.to_be_bytes();
        let start = bytes.iter().position(|&x| x != 0).unwrap_or(bytes.len() - 1);
        let len = bytes.len() - start;
        buf.put_u8(0xf7 + len as u8);
        buf.put_slice(&bytes[start..]);
    }
}

impl<S: RLPEncode, T: RLPEncode> RLPEncode for (S, T) {
    fn encode(&self, buf: &mut dyn BufMut) {
        super::structs::Encoder::new(buf)
            .encode_field(&self.0)
            .encode_field(&self.1)
            .finish();
    }
    fn length(&self) -> usize {
        list_length(self.0.length() + self.1.length())
    }
}

impl<S: RLPEncode, T: RLPEncode, U: RLPEncode> RLPEncode for (S, T, U) {
    fn encode(&self, buf: &mut dyn BufMut) {
        super::structs::Encoder::new(buf)
            .encode_field(&self.0)
            .encode_field(&self.1)
            .encode_field(&self.2)
            .finish();
    }
    fn length(&self) -> usize {
        list_length(self.0.length() + self.1.length() + self.2.length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RLPDecode;

    #[test]
    fn empty_list_encodes_to_single_byte() {
        let empty: Vec<u64> = vec![];
        assert_eq!(empty.encode_to_vec(), vec![0xc0]);
    }

    #[test]
    fn u256_roundtrips() {
        let value = U256::from(0x1234_5678_9abc_u64);
        let encoded = value.encode_to_vec();
        assert_eq!(U256::decode(&encoded).unwrap(), value);
    }
}
