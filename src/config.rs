// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Buffer size of the download event channel. Progress events are dropped
/// when the consumer falls behind; lifecycle events always fit.
pub const EVENT_CHANNEL_BUFFER: usize = 64;

/// Ranged connections per download unless the user says otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Process-wide configuration, built once in `main` and passed down. The
/// engine and the state store never reach for hidden globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root for per-download resume records and the master list.
    pub state_dir: PathBuf,
    /// Root for debug log files.
    pub logs_dir: PathBuf,

    /// Below this total size a download is never segmented.
    pub min_segment: u64,
    /// Hard ceiling on ranged workers per download.
    pub max_concurrency: usize,
    /// Retry budget per worker for transient failures.
    pub max_retries: u32,
    /// Base of the exponential retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Minimum spacing between progress events, in milliseconds.
    pub progress_interval_ms: u64,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let home = surge_home();
        Self {
            state_dir: home.join("state"),
            logs_dir: home.join("logs"),
            min_segment: 1024 * 1024,
            max_concurrency: 16,
            max_retries: 5,
            retry_base_delay_ms: 250,
            progress_interval_ms: 100,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Base directory for all surge state: `$SURGE_HOME`, else `~/.surge`,
/// else `.surge` relative to the working directory.
fn surge_home() -> PathBuf {
    if let Some(dir) = std::env::var_os("SURGE_HOME") {
        return PathBuf::from(dir);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".surge");
    }
    PathBuf::from(".surge")
}
