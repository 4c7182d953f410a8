//! Binary wire codec shared by every endpoint
//!
//! All multi-byte integers are encoded big-endian. Strings carry a u8 length
//! prefix, collections a u32 element count, enums and message unions a single
//! u8 discriminant assigned in declaration order. Maps and sets encode their
//! elements in ascending key order, which is why the message model is built
//! on `BTreeMap`/`BTreeSet`.
//!
//! Decoding is pull-based: each primitive requests exactly the bytes it needs
//! from an async byte source, so a decoder can be driven directly by a TCP
//! stream half (suspending on I/O between requests) or by an in-memory slice
//! for UDP datagrams and tests. No out-of-band framing exists on the wire;
//! the decoder's knowledge of each type's layout is what delimits messages.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors produced while decoding a value from a byte source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The source ran out of bytes in the middle of the named type.
    #[error("unexpected end of stream while decoding {0}")]
    UnexpectedEndOfStream(&'static str),
    /// A discriminant byte matched no variant of the named union.
    #[error("unknown variant {1} for {0}")]
    UnknownVariant(&'static str, u8),
}

/// Serializes a value into the wire format by appending to a byte buffer.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);

    /// Convenience wrapper producing a fresh buffer with the encoded value.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Deserializes a value from an async byte source.
///
/// Implementations pull exactly as many bytes as the value's layout requires
/// and never read past its end, so consecutive messages on one stream decode
/// back-to-back without framing.
#[allow(async_fn_in_trait)]
pub trait Decode: Sized {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send;
}

/// Reads exactly `N` bytes or fails with `UnexpectedEndOfStream` for `ty`.
pub(crate) async fn read_array<R, const N: usize>(
    src: &mut R,
    ty: &'static str,
) -> Result<[u8; N], DecodeError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut bytes = [0u8; N];
    src.read_exact(&mut bytes)
        .await
        .map_err(|_| DecodeError::UnexpectedEndOfStream(ty))?;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl Decode for u8 {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(read_array::<R, 1>(src, "u8").await?[0])
    }
}

impl Encode for u16 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u16 {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(u16::from_be_bytes(read_array(src, "u16").await?))
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u32 {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(u32::from_be_bytes(read_array(src, "u32").await?))
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u64 {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(u64::from_be_bytes(read_array(src, "u64").await?))
    }
}

impl Encode for String {
    /// u8 length prefix followed by the raw bytes. Anything past 255 bytes is
    /// cut off; senders are expected to keep names within the prefix range.
    fn encode(&self, buf: &mut Vec<u8>) {
        let len = self.len().min(u8::MAX as usize);
        buf.push(len as u8);
        buf.extend_from_slice(&self.as_bytes()[..len]);
    }
}

impl Decode for String {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = u8::decode(src).await? as usize;
        let mut bytes = vec![0u8; len];
        src.read_exact(&mut bytes)
            .await
            .map_err(|_| DecodeError::UnexpectedEndOfStream("String"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let count = u32::decode(src).await?;
        // No preallocation from the wire-supplied count: a hostile count
        // would otherwise reserve gigabytes before the first element fails.
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(T::decode(src).await?);
        }
        Ok(items)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    /// Pairs are emitted in ascending key order, which `BTreeMap` iteration
    /// already guarantees.
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        for (key, value) in self {
            key.encode(buf);
            value.encode(buf);
        }
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let count = u32::decode(src).await?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(src).await?;
            let value = V::decode(src).await?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let count = u32::decode(src).await?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(T::decode(src).await?);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_encode_big_endian() {
        assert_eq!(0x12u8.to_bytes(), vec![0x12]);
        assert_eq!(0x1234u16.to_bytes(), vec![0x12, 0x34]);
        assert_eq!(0x1234_5678u32.to_bytes(), vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(
            0x0102_0304_0506_0708u64.to_bytes(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[tokio::test]
    async fn integer_roundtrip() {
        let mut buf = Vec::new();
        42u8.encode(&mut buf);
        1000u16.encode(&mut buf);
        123_456u32.encode(&mut buf);
        9_876_543_210u64.encode(&mut buf);

        let mut src = buf.as_slice();
        assert_eq!(u8::decode(&mut src).await.unwrap(), 42);
        assert_eq!(u16::decode(&mut src).await.unwrap(), 1000);
        assert_eq!(u32::decode(&mut src).await.unwrap(), 123_456);
        assert_eq!(u64::decode(&mut src).await.unwrap(), 9_876_543_210);
        assert!(src.is_empty());
    }

    #[test]
    fn string_layout_is_length_prefixed() {
        assert_eq!(
            "Ola".to_string().to_bytes(),
            vec![3, b'O', b'l', b'a']
        );
        assert_eq!(String::new().to_bytes(), vec![0]);
    }

    #[tokio::test]
    async fn string_roundtrip() {
        let original = "bomber".to_string();
        let bytes = original.to_bytes();
        let mut src = bytes.as_slice();
        assert_eq!(String::decode(&mut src).await.unwrap(), original);
    }

    #[test]
    fn oversized_string_is_truncated_to_prefix_range() {
        let long = "x".repeat(300);
        let bytes = long.to_bytes();
        assert_eq!(bytes[0], 255);
        assert_eq!(bytes.len(), 256);
    }

    #[test]
    fn list_layout_has_u32_count() {
        let list: Vec<u8> = vec![8, 88];
        assert_eq!(list.to_bytes(), vec![0, 0, 0, 2, 8, 88]);
    }

    #[tokio::test]
    async fn nested_list_roundtrip() {
        let original = vec!["Ola".to_string(), "Bart".to_string()];
        let bytes = original.to_bytes();
        let mut src = bytes.as_slice();
        assert_eq!(Vec::<String>::decode(&mut src).await.unwrap(), original);
    }

    #[test]
    fn map_encodes_in_ascending_key_order() {
        let mut map = BTreeMap::new();
        map.insert(2u8, 20u16);
        map.insert(1u8, 10u16);
        assert_eq!(map.to_bytes(), vec![0, 0, 0, 2, 1, 0, 10, 2, 0, 20]);
    }

    #[tokio::test]
    async fn map_roundtrip() {
        let mut original = BTreeMap::new();
        original.insert("Ola".to_string(), 1u32);
        original.insert("Bart".to_string(), 42u32);
        let bytes = original.to_bytes();
        let mut src = bytes.as_slice();
        assert_eq!(
            BTreeMap::<String, u32>::decode(&mut src).await.unwrap(),
            original
        );
    }

    #[test]
    fn set_encodes_in_ascending_order() {
        let mut set = BTreeSet::new();
        set.insert(9u8);
        set.insert(3u8);
        set.insert(7u8);
        assert_eq!(set.to_bytes(), vec![0, 0, 0, 3, 3, 7, 9]);
    }

    #[tokio::test]
    async fn truncated_primitive_reports_end_of_stream() {
        let mut src: &[u8] = &[0x12];
        assert_eq!(
            u16::decode(&mut src).await.unwrap_err(),
            DecodeError::UnexpectedEndOfStream("u16")
        );
    }

    #[tokio::test]
    async fn truncated_string_reports_end_of_stream() {
        // Prefix claims 5 bytes, only 2 present.
        let mut src: &[u8] = &[5, b'a', b'b'];
        assert_eq!(
            String::decode(&mut src).await.unwrap_err(),
            DecodeError::UnexpectedEndOfStream("String")
        );
    }

    #[tokio::test]
    async fn truncated_collection_reports_end_of_stream() {
        // Count claims 3 elements, only 1 present.
        let mut src: &[u8] = &[0, 0, 0, 3, 42];
        assert!(matches!(
            Vec::<u16>::decode(&mut src).await.unwrap_err(),
            DecodeError::UnexpectedEndOfStream(_)
        ));
    }

    #[tokio::test]
    async fn every_strict_prefix_of_a_valid_encoding_fails() {
        let mut original = BTreeMap::new();
        original.insert(1u8, "Ola".to_string());
        original.insert(42u8, "Bart".to_string());
        let bytes = original.to_bytes();

        for cut in 0..bytes.len() {
            let mut src = &bytes[..cut];
            let result = BTreeMap::<u8, String>::decode(&mut src).await;
            assert!(
                matches!(result, Err(DecodeError::UnexpectedEndOfStream(_))),
                "prefix of {} bytes decoded to {:?}",
                cut,
                result
            );
        }
    }
}
