// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Events published by the download engine to its consumers (the headless
/// printer, the progress bar, the control server's log drain).
///
/// Ordering guarantee: `Started` precedes any `Progress`, which precedes the
/// single terminal event (`Complete`, `Error` or `Paused`). `Progress` is
/// best-effort and may be dropped when the sink is full; terminal events and
/// `Started` are always delivered.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started {
        id: String,
        filename: String,
        total: u64,
    },
    Progress {
        id: String,
        downloaded: u64,
    },
    Complete {
        id: String,
        total: u64,
        elapsed_ms: u64,
    },
    Error {
        id: String,
        error: String,
    },
    Paused {
        id: String,
        downloaded: u64,
        total: u64,
    },
}
