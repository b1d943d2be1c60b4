// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bencode codec for torrent metadata. Byte strings stay raw bytes end to
//! end; dictionary keys are ordered, which makes re-encoding canonical.

pub mod decoder;
pub mod encoder;

pub use decoder::{decode, decode_root_dict_with_span};
pub use encoder::encode;

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BencodeError;

    /// Seed round-trip from a real-world shaped metainfo buffer.
    const TORRENT: &[u8] = b"d8:announce14:http://tracker4:infod6:lengthi5e4:name8:file.txt12:piece lengthi16384e6:pieces20:12345678901234567890ee";

    #[test]
    fn test_roundtrip_canonical_input() {
        let value = decode(TORRENT).unwrap();
        assert_eq!(encode(&value), TORRENT);
    }

    #[test]
    fn test_roundtrip_rebuilt_value() {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(b"file.txt".to_vec()));
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"length".to_vec(), Value::Int(5));
        info.insert(
            b"pieces".to_vec(),
            Value::Bytes(b"12345678901234567890".to_vec()),
        );

        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), Value::Bytes(b"http://tracker".to_vec()));
        root.insert(b"info".to_vec(), Value::Dict(info));
        root.insert(
            b"list".to_vec(),
            Value::List(vec![Value::Int(1), Value::Bytes(b"abc".to_vec())]),
        );

        let encoded = encode(&Value::Dict(root));
        let decoded = decode(&encoded).unwrap();
        assert_eq!(encode(&decoded), encoded);
    }

    #[test]
    fn test_dict_keys_emitted_sorted() {
        // BTreeMap insertion order does not matter; emission is byte-sorted.
        let mut d = BTreeMap::new();
        d.insert(b"zz".to_vec(), Value::Int(1));
        d.insert(b"aa".to_vec(), Value::Int(2));
        d.insert(b"m".to_vec(), Value::Int(3));
        assert_eq!(encode(&Value::Dict(d)), b"d2:aai2e1:mi3e2:zzi1ee");
    }

    #[test]
    fn test_integers() {
        assert_eq!(decode(b"i42e").unwrap(), Value::Int(42));
        assert_eq!(decode(b"i-7e").unwrap(), Value::Int(-7));
        assert_eq!(decode(b"i0e").unwrap(), Value::Int(0));

        assert!(matches!(
            decode(b"i-0e"),
            Err(BencodeError::InvalidInteger { .. })
        ));
        assert!(matches!(
            decode(b"i03e"),
            Err(BencodeError::InvalidInteger { .. })
        ));
        assert!(matches!(
            decode(b"ie"),
            Err(BencodeError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_trailing_data_rejected() {
        assert!(matches!(
            decode(b"i1ei2e"),
            Err(BencodeError::TrailingData { pos: 3 })
        ));
        assert!(matches!(
            decode(b"3:abcx"),
            Err(BencodeError::TrailingData { pos: 5 })
        ));
    }

    #[test]
    fn test_binary_strings_survive() {
        let mut raw = Vec::from(&b"4:"[..]);
        raw.extend_from_slice(&[0x00, 0xff, 0x80, 0x01]);
        let v = decode(&raw).unwrap();
        assert_eq!(v.as_bytes().unwrap(), &[0x00, 0xff, 0x80, 0x01]);
        assert_eq!(encode(&v), raw);
    }

    #[test]
    fn test_truncated_inputs() {
        assert!(matches!(
            decode(b"5:abc"),
            Err(BencodeError::StringOutOfBounds { .. })
        ));
        assert!(matches!(decode(b"li1e"), Err(BencodeError::UnexpectedEnd { .. })));
        assert!(matches!(decode(b"d1:a"), Err(BencodeError::UnexpectedEnd { .. })));
        assert!(matches!(decode(b""), Err(BencodeError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_span_matches_info_value() {
        let (value, span) = decode_root_dict_with_span(TORRENT, b"info").unwrap();
        let span = span.unwrap();

        // The recorded span is exactly the bencoding of the info value.
        let info = value.as_dict().unwrap().get(&b"info"[..]).unwrap();
        assert_eq!(encode(info), span);

        // And it is a literal sub-slice of the input.
        let start = TORRENT.windows(span.len()).position(|w| w == span).unwrap();
        assert_eq!(&TORRENT[start..start + span.len()], span);
    }

    #[test]
    fn test_span_absent_key() {
        let (_, span) = decode_root_dict_with_span(TORRENT, b"missing").unwrap();
        assert!(span.is_none());
    }

    #[test]
    fn test_span_requires_root_dict() {
        assert!(matches!(
            decode_root_dict_with_span(b"li1ee", b"info"),
            Err(BencodeError::ExpectedRootDict)
        ));
    }
}
