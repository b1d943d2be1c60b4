// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Classifies user-supplied source strings before anything touches the
//! network: plain HTTP(S) URLs, URLs pointing at `.torrent` files, magnet
//! links, or unknown junk.

use url::Url;

/// Longest text the clipboard watcher will even consider.
const MAX_CLIPBOARD_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Http,
    TorrentUrl,
    Magnet,
    Unknown,
}

pub fn normalize(raw: &str) -> &str {
    raw.trim()
}

pub fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => {
            (u.scheme() == "http" || u.scheme() == "https")
                && u.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

pub fn is_torrent_url(raw: &str) -> bool {
    if !is_http_url(raw) {
        return false;
    }
    match Url::parse(raw) {
        Ok(u) => u.path().to_ascii_lowercase().ends_with(".torrent"),
        Err(_) => false,
    }
}

pub fn is_magnet(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => {
            if !u.scheme().eq_ignore_ascii_case("magnet") {
                return false;
            }
            // Accept any non-empty magnet payload (opaque or query).
            u.query().is_some_and(|q| !q.is_empty()) || !u.path().is_empty()
        }
        Err(_) => false,
    }
}

pub fn kind_of(raw: &str) -> Kind {
    let s = normalize(raw);
    if s.is_empty() {
        return Kind::Unknown;
    }
    if is_magnet(s) {
        return Kind::Magnet;
    }
    if is_torrent_url(s) {
        return Kind::TorrentUrl;
    }
    if is_http_url(s) {
        return Kind::Http;
    }
    Kind::Unknown
}

pub fn is_supported(raw: &str) -> bool {
    kind_of(raw) != Kind::Unknown
}

/// Validates clipboard text and returns the trimmed URL if it looks like
/// something we can download. Used by the clipboard watcher; the OS-side
/// reader lives outside the core.
pub fn extract_clipboard_candidate(text: &str) -> Option<String> {
    let text = text.trim();

    // Quick reject: too long, contains newlines, or obviously not a URL.
    if text.len() > MAX_CLIPBOARD_LEN || text.contains(['\n', '\r']) {
        return None;
    }
    if !is_supported(text) {
        return None;
    }
    Some(text.to_string())
}

/// Parses a comma-separated input and returns the primary URL plus mirrors.
/// Mirrors include the primary itself for HTTP(S) and magnet inputs
/// (backward compatibility with the old single-list format).
pub fn parse_comma_arg(arg: &str) -> Option<(String, Vec<String>)> {
    let mut primary: Option<String> = None;
    let mut mirrors: Vec<String> = Vec::new();

    for part in arg.split(',') {
        let clean = part.trim();
        if clean.is_empty() {
            continue;
        }
        match &primary {
            None => {
                if !is_supported(clean) {
                    continue;
                }
                if is_magnet(clean) || is_http_url(clean) {
                    mirrors.push(clean.to_string());
                }
                primary = Some(clean.to_string());
            }
            Some(_) => {
                // Mirrors are HTTP/HTTPS only.
                if is_http_url(clean) {
                    mirrors.push(clean.to_string());
                }
            }
        }
    }

    primary.map(|p| (p, mirrors))
}
