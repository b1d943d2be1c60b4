// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use sha1::{Digest, Sha1};

use super::{FileEntry, Info, TorrentMeta};
use crate::bencode::{self, Value};
use crate::errors::TorrentError;

/// Parses a `.torrent` buffer into metadata.
///
/// The info hash is computed over the raw byte span of the `info` value as
/// it appeared on the wire, so torrents whose outer dictionary is not in
/// canonical order still hash to their network identity. A buffer where the
/// span cannot be recovered (malformed metainfo, but seen in the wild)
/// falls back to hashing a canonical re-encoding of the parsed dictionary.
pub fn parse_torrent(data: &[u8]) -> Result<TorrentMeta, TorrentError> {
    let (root, span) = bencode::decode_root_dict_with_span(data, b"info")?;
    let root = root.as_dict().ok_or(TorrentError::InvalidRoot)?;

    let info_value = root.get(&b"info"[..]).ok_or(TorrentError::MissingInfo)?;
    let info_dict = info_value.as_dict().ok_or(TorrentError::MissingInfo)?;
    let info = parse_info(info_dict)?;

    let info_bytes = match span {
        Some(raw) if !raw.is_empty() => raw.to_vec(),
        _ => bencode::encode(info_value),
    };

    let mut hasher = Sha1::new();
    hasher.update(&info_bytes);
    let info_hash: [u8; 20] = hasher.finalize().into();

    let announce = root
        .get(&b"announce"[..])
        .and_then(Value::as_bytes)
        .map(|b| String::from_utf8_lossy(b).into_owned());

    let announce_list = root
        .get(&b"announce-list"[..])
        .map(parse_announce_list)
        .unwrap_or_default();

    Ok(TorrentMeta {
        announce,
        announce_list,
        info,
        info_hash,
        info_bytes,
    })
}

fn parse_info(
    dict: &std::collections::BTreeMap<Vec<u8>, Value>,
) -> Result<Info, TorrentError> {
    let name = dict
        .get(&b"name"[..])
        .and_then(Value::as_bytes)
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();
    let piece_length = dict
        .get(&b"piece length"[..])
        .and_then(Value::as_int)
        .unwrap_or(0);
    let pieces = dict
        .get(&b"pieces"[..])
        .and_then(Value::as_bytes)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    if name.is_empty() {
        return Err(TorrentError::InvalidInfo("missing name"));
    }
    if piece_length <= 0 {
        return Err(TorrentError::InvalidInfo("missing piece length"));
    }
    if pieces.is_empty() {
        return Err(TorrentError::InvalidInfo("missing pieces"));
    }

    let length = dict.get(&b"length"[..]).and_then(Value::as_int).unwrap_or(0);
    if length > 0 {
        // Single-file mode.
        return Ok(Info {
            name,
            piece_length,
            pieces,
            length,
            files: Vec::new(),
        });
    }

    let files = match dict.get(&b"files"[..]) {
        Some(v) => parse_files(v)?,
        None => return Err(TorrentError::InvalidInfo("missing length/files")),
    };
    if files.is_empty() {
        return Err(TorrentError::InvalidInfo("empty files list"));
    }

    Ok(Info {
        name,
        piece_length,
        pieces,
        length: 0,
        files,
    })
}

fn parse_files(value: &Value) -> Result<Vec<FileEntry>, TorrentError> {
    let list = value
        .as_list()
        .ok_or(TorrentError::InvalidInfo("invalid files list"))?;

    let mut files = Vec::with_capacity(list.len());
    for item in list {
        let dict = item
            .as_dict()
            .ok_or(TorrentError::InvalidInfo("invalid file entry"))?;

        let length = dict.get(&b"length"[..]).and_then(Value::as_int).unwrap_or(0);
        let path_list = dict
            .get(&b"path"[..])
            .and_then(Value::as_list)
            .ok_or(TorrentError::InvalidInfo("invalid file path"))?;

        let mut path = Vec::with_capacity(path_list.len());
        for part in path_list {
            let bytes = part
                .as_bytes()
                .ok_or(TorrentError::InvalidInfo("invalid path element"))?;
            if bytes.is_empty() {
                return Err(TorrentError::InvalidInfo("empty path element"));
            }
            path.push(String::from_utf8_lossy(bytes).into_owned());
        }

        if length <= 0 || path.is_empty() {
            return Err(TorrentError::InvalidInfo("invalid file entry data"));
        }
        files.push(FileEntry { length, path });
    }
    Ok(files)
}

/// Tiers of tracker URLs; malformed tiers and non-string entries are
/// dropped rather than failing the whole parse, matching how clients treat
/// this optional field.
fn parse_announce_list(value: &Value) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    let Some(list) = value.as_list() else {
        return out;
    };
    for tier_value in list {
        let Some(tier_list) = tier_value.as_list() else {
            continue;
        };
        let tier: Vec<String> = tier_list
            .iter()
            .filter_map(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        if !tier.is_empty() {
            out.push(tier);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;
    use std::collections::BTreeMap;

    fn info_dict() -> BTreeMap<Vec<u8>, Value> {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(b"file.txt".to_vec()));
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"length".to_vec(), Value::Int(5));
        info.insert(
            b"pieces".to_vec(),
            Value::Bytes(b"12345678901234567890".to_vec()),
        );
        info
    }

    fn torrent_bytes(info: BTreeMap<Vec<u8>, Value>) -> Vec<u8> {
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), Value::Bytes(b"http://tracker".to_vec()));
        root.insert(b"info".to_vec(), Value::Dict(info));
        encode(&Value::Dict(root))
    }

    #[test]
    fn test_parse_single_file() {
        let meta = parse_torrent(&torrent_bytes(info_dict())).unwrap();
        assert_eq!(meta.announce.as_deref(), Some("http://tracker"));
        assert_eq!(meta.info.name, "file.txt");
        assert_eq!(meta.info.piece_length, 16384);
        assert_eq!(meta.info.length, 5);
        assert_eq!(meta.info.total_size(), 5);
        assert!(meta.info.files.is_empty());
    }

    #[test]
    fn test_info_hash_is_sha1_of_span() {
        let data = torrent_bytes(info_dict());
        let meta = parse_torrent(&data).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(&meta.info_bytes);
        let expected: [u8; 20] = hasher.finalize().into();
        assert_eq!(meta.info_hash, expected);

        // The span decodes back to the parsed info dictionary.
        let reparsed = crate::bencode::decode(&meta.info_bytes).unwrap();
        assert_eq!(encode(&reparsed), meta.info_bytes);
    }

    #[test]
    fn test_info_hash_stable_under_reencoding() {
        // Hashing the original span and hashing a canonical re-encode of the
        // parsed dictionary must agree when the source is canonical.
        let data = torrent_bytes(info_dict());
        let meta = parse_torrent(&data).unwrap();

        let reencoded = {
            let (root, _) = crate::bencode::decode_root_dict_with_span(&data, b"info").unwrap();
            encode(root.as_dict().unwrap().get(&b"info"[..]).unwrap())
        };
        let mut hasher = Sha1::new();
        hasher.update(&reencoded);
        let rehash: [u8; 20] = hasher.finalize().into();
        assert_eq!(meta.info_hash, rehash);
    }

    #[test]
    fn test_parse_multi_file() {
        let mut entry = BTreeMap::new();
        entry.insert(b"length".to_vec(), Value::Int(3));
        entry.insert(
            b"path".to_vec(),
            Value::List(vec![
                Value::Bytes(b"dir".to_vec()),
                Value::Bytes(b"a.bin".to_vec()),
            ]),
        );
        let mut entry2 = BTreeMap::new();
        entry2.insert(b"length".to_vec(), Value::Int(7));
        entry2.insert(b"path".to_vec(), Value::List(vec![Value::Bytes(b"b.bin".to_vec())]));

        let mut info = info_dict();
        info.remove(&b"length"[..]);
        info.insert(
            b"files".to_vec(),
            Value::List(vec![Value::Dict(entry), Value::Dict(entry2)]),
        );

        let meta = parse_torrent(&torrent_bytes(info)).unwrap();
        assert_eq!(meta.info.files.len(), 2);
        assert_eq!(meta.info.files[0].path, vec!["dir", "a.bin"]);
        assert_eq!(meta.info.total_size(), 10);
    }

    #[test]
    fn test_rejects_incomplete_info() {
        let mut info = info_dict();
        info.remove(&b"name"[..]);
        assert!(matches!(
            parse_torrent(&torrent_bytes(info)),
            Err(TorrentError::InvalidInfo(_))
        ));

        let mut info = info_dict();
        info.remove(&b"length"[..]);
        assert!(matches!(
            parse_torrent(&torrent_bytes(info)),
            Err(TorrentError::InvalidInfo(_))
        ));

        let mut info = info_dict();
        info.remove(&b"pieces"[..]);
        assert!(matches!(
            parse_torrent(&torrent_bytes(info)),
            Err(TorrentError::InvalidInfo(_))
        ));
    }

    #[test]
    fn test_rejects_zero_length_file_entry() {
        let mut entry = BTreeMap::new();
        entry.insert(b"length".to_vec(), Value::Int(0));
        entry.insert(b"path".to_vec(), Value::List(vec![Value::Bytes(b"x".to_vec())]));

        let mut info = info_dict();
        info.remove(&b"length"[..]);
        info.insert(b"files".to_vec(), Value::List(vec![Value::Dict(entry)]));

        assert!(matches!(
            parse_torrent(&torrent_bytes(info)),
            Err(TorrentError::InvalidInfo(_))
        ));
    }

    #[test]
    fn test_missing_info_dict() {
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), Value::Bytes(b"http://tracker".to_vec()));
        let data = encode(&Value::Dict(root));
        assert!(matches!(
            parse_torrent(&data),
            Err(TorrentError::MissingInfo)
        ));
    }

    #[test]
    fn test_announce_list_tiers() {
        let mut root = BTreeMap::new();
        root.insert(b"info".to_vec(), Value::Dict(info_dict()));
        root.insert(
            b"announce-list".to_vec(),
            Value::List(vec![
                Value::List(vec![
                    Value::Bytes(b"udp://a".to_vec()),
                    Value::Bytes(b"udp://b".to_vec()),
                ]),
                Value::List(vec![]), // empty tier dropped
                Value::List(vec![Value::Bytes(b"udp://c".to_vec())]),
            ]),
        );
        let meta = parse_torrent(&encode(&Value::Dict(root))).unwrap();
        assert_eq!(
            meta.announce_list,
            vec![vec!["udp://a".to_string(), "udp://b".to_string()], vec!["udp://c".to_string()]]
        );
    }
}
