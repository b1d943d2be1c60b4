// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Live counters for one download, shared between the workers (who add
/// bytes), the progress pump (who reads them) and whoever holds the pause
/// handle. The counter only ever grows; per-range accounting lives in the
/// task queue.
pub struct ProgressState {
    pub id: String,
    downloaded: AtomicU64,
    total_size: AtomicU64,
    start_time: Instant,
    active_workers: AtomicUsize,
    done: AtomicBool,
    paused: AtomicBool,
    cancel: CancellationToken,
}

impl ProgressState {
    pub fn new(id: String, total_size: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            downloaded: AtomicU64::new(0),
            total_size: AtomicU64::new(total_size),
            start_time: Instant::now(),
            active_workers: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn add(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Seed the counter when resuming from persisted state.
    pub fn set_downloaded(&self, bytes: u64) {
        self.downloaded.store(bytes, Ordering::Relaxed);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub fn set_done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    /// Request a pause: flags the state and cancels every worker.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let ps = ProgressState::new("d1".into(), 100, CancellationToken::new());
        ps.add(30);
        ps.add(20);
        assert_eq!(ps.downloaded(), 50);
        assert_eq!(ps.total_size(), 100);
    }

    #[test]
    fn test_pause_cancels_workers() {
        let token = CancellationToken::new();
        let ps = ProgressState::new("d1".into(), 100, token.clone());
        assert!(!ps.is_paused());

        ps.pause();
        assert!(ps.is_paused());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_worker_accounting() {
        let ps = ProgressState::new("d1".into(), 100, CancellationToken::new());
        ps.worker_started();
        ps.worker_started();
        assert_eq!(ps.active_workers(), 2);
        ps.worker_finished();
        assert_eq!(ps.active_workers(), 1);
    }
}
