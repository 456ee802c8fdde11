use super::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// Struct decoding helper.
///
/// The encoded data is expected to be a single RLP list; fields are decoded
/// in the order passed to [`decode_field`](Decoder::decode_field), which must
/// match the order they were encoded in.
///
/// ```
/// # use snapsync_rlp::structs::Decoder;
/// # use snapsync_rlp::error::RLPDecodeError;
/// # use snapsync_rlp::decode::RLPDecode;
/// #[derive(Debug, PartialEq, Eq)]
/// struct Simple { a: u8, b: u16 }
///
/// impl RLPDecode for Simple {
///     fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
///         let decoder = Decoder::new(buf)?;
///         let (a, decoder) = decoder.decode_field("a")?;
///         let (b, decoder) = decoder.decode_field("b")?;
///         let rest = decoder.finish()?;
///         Ok((Simple { a, b }, rest))
///     }
/// }
///
/// let decoded = Simple::decode(&[0xc2, 61, 75]).unwrap();
/// assert_eq!(decoded, Simple { a: 61, b: 75 });
/// ```
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::unexpected_string()),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &'static str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = T::decode_unfinished(self.payload).map_err(|e| e.with_context(name))?;
        Ok((field, Self { payload: rest, ..self }))
    }

    /// Returns the next field's encoded bytes (prefix included) without decoding it.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (field, rest) = get_item_with_prefix(self.payload)?;
        Ok((field.to_vec(), Self { payload: rest, ..self }))
    }

    /// Decodes a field if one remains, otherwise returns `None` without error.
    pub fn decode_optional_field<T: RLPDecode>(self) -> (Option<T>, Self) {
        match T::decode_unfinished(self.payload) {
            Ok((field, rest)) => (Some(field), Self { payload: rest, ..self }),
            Err(_) => (None, self),
        }
    }

    /// Finishes decoding, erroring if unconsumed bytes remain in the list payload.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData(None))
        }
    }

    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Struct encoding helper.
///
/// Fields are encoded in the order passed to [`encode_field`](Encoder::encode_field).
///
/// ```
/// # use snapsync_rlp::structs::Encoder;
/// # use snapsync_rlp::encode::RLPEncode;
/// struct Simple { a: u8, b: u16 }
///
/// impl RLPEncode for Simple {
///     fn encode(&self, buf: &mut dyn bytes::BufMut) {
///         Encoder::new(buf).encode_field(&self.a).encode_field(&self.b).finish();
///     }
/// }
///
/// let mut buf = vec![];
/// Simple { a: 61, b: 75 }.encode(&mut buf);
/// assert_eq!(&buf, &[0xc2, 61, 75]);
/// ```
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl core::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder").field("temp_buf", &self.temp_buf).finish()
    }
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self { buf, temp_buf: Vec::new() }
    }

    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    pub fn encode_optional_field<T: RLPEncode>(mut self, value: &Option<T>) -> Self {
        if let Some(value) = value {
            value.encode(&mut self.temp_buf);
        }
        self
    }

    pub fn encode_bytes(mut self, value: &[u8]) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    pub fn encode_raw(mut self, value: &[u8]) -> Self {
        self.temp_buf.put_slice(value);
        self
    }

    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode::RLPDecode, encode::RLPEncode};

    #[derive(Debug, PartialEq, Eq)]
    struct Simple {
        a: u8,
        b: u16,
    }

    impl RLPEncode for Simple {
        fn encode(&self, buf: &mut dyn BufMut) {
            Encoder::new(buf).encode_field(&self.a).encode_field(&self.b).finish();
        }
    }

    impl RLPDecode for Simple {
        fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
            let decoder = Decoder::new(rlp)?;
            let (a, decoder) = decoder.decode_field("a")?;
            let (b, decoder) = decoder.decode_field("b")?;
            let rest = decoder.finish()?;
            Ok((Simple { a, b }, rest))
        }
    }

    #[test]
    fn struct_roundtrips() {
        let value = Simple { a: 61, b: 75 };
        let encoded = value.encode_to_vec();
        assert_eq!(Simple::decode(&encoded).unwrap(), value);
    }
}
