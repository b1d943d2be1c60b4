// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use data_encoding::BASE32;
use url::Url;

use crate::errors::MagnetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magnet {
    pub info_hash: [u8; 20],
    pub trackers: Vec<String>,
    pub display_name: Option<String>,
}

/// Parses a magnet URI. The first `xt` parameter carrying a decodable
/// `urn:btih:` digest wins; `tr` parameters collect as trackers and `dn`
/// becomes the display name.
pub fn parse_magnet(raw: &str) -> Result<Magnet, MagnetError> {
    let u = Url::parse(raw)?;
    if !u.scheme().eq_ignore_ascii_case("magnet") {
        return Err(MagnetError::NotMagnet);
    }

    let mut info_hash: Option<[u8; 20]> = None;
    let mut trackers = Vec::new();
    let mut display_name = None;

    for (key, value) in u.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if info_hash.is_none() {
                    info_hash = parse_xt(&value);
                }
            }
            "tr" => trackers.push(value.into_owned()),
            "dn" => {
                if display_name.is_none() && !value.is_empty() {
                    display_name = Some(value.into_owned());
                }
            }
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or(MagnetError::MissingInfoHash)?;
    Ok(Magnet {
        info_hash,
        trackers,
        display_name,
    })
}

/// `urn:btih:` followed by 40 hex chars or 32 unpadded base-32 chars.
fn parse_xt(xt: &str) -> Option<[u8; 20]> {
    let xt = xt.trim().to_ascii_lowercase();
    let digest = xt.strip_prefix("urn:btih:")?;

    let bytes = match digest.len() {
        40 => hex::decode(digest).ok()?,
        32 => BASE32.decode(digest.to_ascii_uppercase().as_bytes()).ok()?,
        _ => return None,
    };
    if bytes.len() != 20 {
        return None;
    }

    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_parse_full_magnet() {
        let raw = format!("magnet:?xt=urn:btih:{HEX_HASH}&dn=x&tr=udp://a&tr=udp://b");
        let m = parse_magnet(&raw).unwrap();
        assert_eq!(hex::encode(m.info_hash), HEX_HASH);
        assert_eq!(m.display_name.as_deref(), Some("x"));
        assert_eq!(m.trackers, vec!["udp://a", "udp://b"]);
    }

    #[test]
    fn test_parse_hex_uppercase() {
        let raw = format!("magnet:?xt=urn:btih:{}", HEX_HASH.to_ascii_uppercase());
        let m = parse_magnet(&raw).unwrap();
        assert_eq!(hex::encode(m.info_hash), HEX_HASH);
    }

    #[test]
    fn test_parse_base32_digest() {
        let expected = [0xAAu8; 20];
        let b32 = BASE32.encode(&expected);
        assert_eq!(b32.len(), 32); // 160 bits, no padding

        let raw = format!("magnet:?xt=urn:btih:{}", b32.to_ascii_lowercase());
        let m = parse_magnet(&raw).unwrap();
        assert_eq!(m.info_hash, expected);
    }

    #[test]
    fn test_first_valid_xt_wins() {
        let raw = format!("magnet:?xt=urn:btih:tooshort&xt=urn:btih:{HEX_HASH}");
        let m = parse_magnet(&raw).unwrap();
        assert_eq!(hex::encode(m.info_hash), HEX_HASH);
    }

    #[test]
    fn test_missing_info_hash() {
        assert!(matches!(
            parse_magnet("magnet:?dn=x&tr=udp://a"),
            Err(MagnetError::MissingInfoHash)
        ));
        assert!(matches!(
            parse_magnet("magnet:?xt=urn:sha1:notbtih"),
            Err(MagnetError::MissingInfoHash)
        ));
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            parse_magnet(&format!("https://host/?xt=urn:btih:{HEX_HASH}")),
            Err(MagnetError::NotMagnet)
        ));
    }
}
