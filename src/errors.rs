// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BencodeError {
    #[error("unexpected end of data at {pos}")]
    UnexpectedEnd { pos: usize },

    #[error("invalid token at {pos}")]
    InvalidToken { pos: usize },

    #[error("invalid integer at {pos}")]
    InvalidInteger { pos: usize },

    #[error("invalid string length at {pos}")]
    InvalidStringLength { pos: usize },

    #[error("string length out of bounds at {pos}")]
    StringOutOfBounds { pos: usize },

    #[error("dictionary key must be a byte string at {pos}")]
    InvalidDictKey { pos: usize },

    #[error("expected dictionary at root")]
    ExpectedRootDict,

    #[error("trailing data at {pos}")]
    TrailingData { pos: usize },
}

#[derive(Error, Debug)]
pub enum TorrentError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("invalid torrent root")]
    InvalidRoot,

    #[error("missing info dictionary")]
    MissingInfo,

    #[error("invalid info dictionary: {0}")]
    InvalidInfo(&'static str),
}

#[derive(Error, Debug)]
pub enum MagnetError {
    #[error("failed to parse magnet link")]
    Url(#[from] url::ParseError),

    #[error("not a magnet link")]
    NotMagnet,

    #[error("missing or invalid infohash")]
    MissingInfoHash,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state I/O error")]
    Io(#[from] std::io::Error),

    #[error("no saved state at {path}")]
    NotFound { path: String },

    #[error("corrupt state record")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by the download engine. Transient transport failures are
/// retried internally; what escapes here is terminal for the download.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("unsupported source: {0}")]
    InvalidSource(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("network error")]
    Network(#[from] reqwest::Error),

    #[error("disk error")]
    Io(#[from] std::io::Error),

    #[error("{algo} mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        algo: &'static str,
        expected: String,
        actual: String,
    },

    #[error("torrent parse error")]
    Torrent(#[from] TorrentError),

    #[error("magnet parse error")]
    Magnet(#[from] MagnetError),

    #[error("download cancelled")]
    Cancelled,

    #[error("state persistence failed")]
    Persistence(#[from] StoreError),
}
