// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::progress::ProgressState;
use super::segment::{Task, TaskStatus};
use crate::errors::DownloadError;

/// Tasks shared between the planner and the workers. Workers claim pending
/// entries, advance `start` as bytes land on disk, and mark them done, so a
/// snapshot of the queue is always an accurate resume plan.
pub(crate) type TaskQueue = Arc<Mutex<Vec<Task>>>;

pub(crate) struct WorkerParams {
    pub client: Client,
    pub url: String,
    pub path: PathBuf,
    pub queue: TaskQueue,
    pub progress: Arc<ProgressState>,
    pub cancel: CancellationToken,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

enum TaskOutcome {
    Done,
    Cancelled,
}

/// One worker: claims ranges off the queue until it is drained, streaming
/// each range into the destination file at its absolute offset. Every worker
/// holds its own file handle, so a seek per task is the only coordination
/// the writes need; the ranges never overlap.
pub(crate) async fn run_worker(params: WorkerParams) -> Result<(), DownloadError> {
    let mut file = OpenOptions::new().write(true).open(&params.path).await?;

    params.progress.worker_started();
    let result = worker_loop(&mut file, &params).await;
    params.progress.worker_finished();

    let flushed = file.flush().await;
    result?;
    flushed.map_err(DownloadError::Io)
}

async fn worker_loop(file: &mut File, params: &WorkerParams) -> Result<(), DownloadError> {
    loop {
        if params.cancel.is_cancelled() {
            return Ok(());
        }
        let Some((index, task)) = claim_task(&params.queue).await else {
            return Ok(());
        };
        debug!(start = task.start, end = task.end, "claimed range");

        match download_task(file, index, task, params).await? {
            TaskOutcome::Done => {
                let mut queue = params.queue.lock().await;
                queue[index].status = TaskStatus::Done;
            }
            TaskOutcome::Cancelled => return Ok(()),
        }
    }
}

async fn claim_task(queue: &TaskQueue) -> Option<(usize, Task)> {
    let mut queue = queue.lock().await;
    for (index, task) in queue.iter_mut().enumerate() {
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::InProgress;
            return Some((index, *task));
        }
    }
    None
}

/// Fetches one range, retrying transient failures with exponential backoff.
/// Bytes written before a retry are kept: the next attempt asks only for
/// what is still missing, and never for anything past the original end.
async fn download_task(
    file: &mut File,
    index: usize,
    task: Task,
    params: &WorkerParams,
) -> Result<TaskOutcome, DownloadError> {
    let mut written: u64 = 0;
    let mut attempt: u32 = 0;

    'attempts: loop {
        if params.cancel.is_cancelled() {
            return Ok(TaskOutcome::Cancelled);
        }

        let offset = task.start + written;
        let request = params
            .client
            .get(&params.url)
            .header(RANGE, format!("bytes={}-{}", offset, task.end));

        let sent = tokio::select! {
            _ = params.cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
            resp = request.send() => resp,
        };
        let mut response = match sent {
            Ok(resp) => resp,
            Err(e) => {
                if attempt < params.max_retries {
                    warn!(offset, attempt, error = %e, "range request failed, retrying");
                    if !backoff(params, attempt).await {
                        return Ok(TaskOutcome::Cancelled);
                    }
                    attempt += 1;
                    continue;
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        let acceptable =
            status == StatusCode::PARTIAL_CONTENT || (status == StatusCode::OK && offset == 0);
        if !acceptable {
            if retryable_status(status) && attempt < params.max_retries {
                warn!(offset, attempt, %status, "retryable status on range request");
                if !backoff(params, attempt).await {
                    return Ok(TaskOutcome::Cancelled);
                }
                attempt += 1;
                continue;
            }
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        file.seek(SeekFrom::Start(offset)).await?;

        loop {
            let next = tokio::select! {
                _ = params.cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
                chunk = response.chunk() => chunk,
            };
            match next {
                Ok(Some(bytes)) => {
                    // Clamp to the task end; a misbehaving server must not
                    // widen the range.
                    let remaining = (task.len() - written) as usize;
                    let take = bytes.len().min(remaining);
                    file.write_all(&bytes[..take]).await?;
                    written += take as u64;
                    params.progress.add(take as u64);
                    {
                        let mut queue = params.queue.lock().await;
                        queue[index].start = task.start + written;
                    }
                    if written == task.len() {
                        return Ok(TaskOutcome::Done);
                    }
                }
                Ok(None) => {
                    if written == task.len() {
                        return Ok(TaskOutcome::Done);
                    }
                    // Body ended short of the range: transient.
                    if attempt < params.max_retries {
                        warn!(offset, written, attempt, "response body truncated, retrying");
                        if !backoff(params, attempt).await {
                            return Ok(TaskOutcome::Cancelled);
                        }
                        attempt += 1;
                        continue 'attempts;
                    }
                    return Err(DownloadError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "response body ended before range completed",
                    )));
                }
                Err(e) => {
                    if attempt < params.max_retries {
                        warn!(offset, written, attempt, error = %e, "stream error, retrying");
                        if !backoff(params, attempt).await {
                            return Ok(TaskOutcome::Cancelled);
                        }
                        attempt += 1;
                        continue 'attempts;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

/// 5xx plus the two 4xx statuses that mean "come back later".
fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Sleeps `base * 2^attempt`, capped. Returns false when cancellation
/// arrived instead of the timeout.
async fn backoff(params: &WorkerParams, attempt: u32) -> bool {
    let delay = params.retry_base_delay.saturating_mul(1 << attempt.min(6));
    tokio::select! {
        _ = params.cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_marks_in_progress() {
        let queue: TaskQueue = Arc::new(Mutex::new(vec![
            Task::new(0, 99),
            Task::new(100, 199),
        ]));

        let (i0, t0) = claim_task(&queue).await.unwrap();
        assert_eq!(i0, 0);
        assert_eq!(t0.start, 0);

        let (i1, t1) = claim_task(&queue).await.unwrap();
        assert_eq!(i1, 1);
        assert_eq!(t1.start, 100);

        assert!(claim_task(&queue).await.is_none());

        let q = queue.lock().await;
        assert!(q.iter().all(|t| t.status == TaskStatus::InProgress));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
        assert!(!retryable_status(StatusCode::FORBIDDEN));
        assert!(!retryable_status(StatusCode::RANGE_NOT_SATISFIABLE));
    }
}
