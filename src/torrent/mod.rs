// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Torrent metadata: `.torrent` (metainfo) parsing built on the bencode
//! codec, and magnet URI parsing. Only the parsing side lives here; peer
//! transfer is someone else's job.

pub mod magnet;
pub mod parser;

pub use magnet::{parse_magnet, Magnet};
pub use parser::parse_torrent;

/// Parsed metainfo. `info_bytes` is the bencoding of the `info` dictionary
/// exactly as it appeared in the source buffer, and `info_hash` is its
/// SHA-1, the torrent's identity on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMeta {
    pub announce: Option<String>,
    pub announce_list: Vec<Vec<String>>,
    pub info: Info,
    pub info_hash: [u8; 20],
    pub info_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub name: String,
    pub piece_length: i64,
    /// Concatenated 20-byte SHA-1 piece hashes, kept raw.
    pub pieces: Vec<u8>,
    /// Single-file mode: total length. Zero when `files` is used.
    pub length: i64,
    /// Multi-file mode entries. Empty when `length` is used.
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEntry {
    pub length: i64,
    pub path: Vec<String>,
}

impl Info {
    /// Total content size across both layouts.
    pub fn total_size(&self) -> i64 {
        if self.length > 0 {
            self.length
        } else {
            self.files.iter().map(|f| f.length).sum()
        }
    }
}
