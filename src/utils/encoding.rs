//! Varint and delta coding for posting lists, little-endian helpers for the
//! index file's fixed-width fields, and base64 for bytes sent as JSON.

use std::io::{self, Write};

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None;
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None
}

/// Delta-encode an ascending list of file ids
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &value in values {
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Delta-decode a list of file ids. Stops at the first truncated varint.
pub fn delta_decode(buf: &[u8]) -> Vec<u32> {
    let mut result = Vec::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        let Some((delta, consumed)) = decode_varint(&buf[pos..]) else {
            break;
        };
        prev = prev.saturating_add(delta);
        result.push(prev);
        pos += consumed;
    }

    result
}

pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 at `pos`, or None if the slice is too short
pub fn u32_at(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Read a u64 at `pos`, or None if the slice is too short
pub fn u64_at(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes = buf.get(pos..pos.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Serde adapter that carries bytes as a base64 string instead of a JSON
/// array of numbers. Use with `#[serde(with = "crate::utils::encoding::base64_bytes")]`
/// on `Vec<u8>` or fixed-size array fields.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, T: TryFrom<Vec<u8>>, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)?;
        let len = bytes.len();
        T::try_from(bytes).map_err(|_| D::Error::custom(format!("unexpected length {} for decoded bytes", len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for value in [0, 1, 127, 128, 16383, 16384, u32::MAX] {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            let (decoded, used) = decode_varint(&buf).unwrap();
            assert_eq!(value, decoded);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn test_delta_encoding() {
        let values = vec![0, 1, 5, 10, 15, 100, 1000];
        let mut buf = Vec::new();
        delta_encode(&values, &mut buf);
        assert_eq!(delta_decode(&buf), values);
    }

    #[test]
    fn test_truncated_varint_stops_decode() {
        let mut buf = Vec::new();
        delta_encode(&[3, 300], &mut buf);
        buf.pop();
        assert_eq!(delta_decode(&buf), vec![3]);
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 0xdeadbeef).unwrap();
        write_u64_le(&mut buf, 42).unwrap();
        assert_eq!(u32_at(&buf, 0), Some(0xdeadbeef));
        assert_eq!(u64_at(&buf, 4), Some(42));
        assert_eq!(u64_at(&buf, 5), None);
        assert_eq!(u32_at(&buf, usize::MAX), None);
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Carrier {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "base64_bytes")]
        digest: [u8; 4],
    }

    #[test]
    fn test_bytes_travel_as_base64() {
        let carrier = Carrier {
            data: b"hello".to_vec(),
            digest: [0xde, 0xad, 0xbe, 0xef],
        };
        let json = serde_json::to_string(&carrier).unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8=","digest":"3q2+7w=="}"#);
        assert_eq!(serde_json::from_str::<Carrier>(&json).unwrap(), carrier);
    }

    #[test]
    fn test_base64_wrong_array_length_is_rejected() {
        let err = serde_json::from_str::<Carrier>(r#"{"data":"","digest":"aGVsbG8="}"#).unwrap_err();
        assert!(err.to_string().contains("unexpected length 5"));
    }
}
