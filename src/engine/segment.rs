// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

/// One worker's byte range, inclusive on both ends. Ranges are disjoint and
/// together cover `[0, total)` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub start: u64,
    pub end: u64,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            status: TaskStatus::Pending,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Splits `total` bytes across `concurrency` contiguous ranges. Small files
/// (at or under `min_segment`) always get a single range, as does a
/// concurrency of one; the division remainder lands in the last range.
pub fn plan_tasks(total: u64, concurrency: usize, min_segment: u64) -> Vec<Task> {
    if total == 0 {
        return Vec::new();
    }
    if total <= min_segment || concurrency <= 1 {
        return vec![Task::new(0, total - 1)];
    }

    let n = concurrency as u64;
    let chunk = total / n;
    if chunk == 0 {
        return vec![Task::new(0, total - 1)];
    }

    let mut tasks = Vec::with_capacity(concurrency);
    for i in 0..n {
        let start = i * chunk;
        let end = if i == n - 1 { total - 1 } else { start + chunk - 1 };
        tasks.push(Task::new(start, end));
    }
    tasks
}
