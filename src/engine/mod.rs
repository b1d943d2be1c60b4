// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The HTTP download engine: probes the resource, plans byte ranges, runs a
//! bounded pool of ranged workers writing at absolute offsets, and
//! checkpoints to the state store on pause so the same invocation later
//! resumes where it stopped.

pub mod probe;
pub mod progress;
pub mod segment;
mod worker;

pub use progress::ProgressState;
pub use segment::{plan_tasks, Task, TaskStatus};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use md5::Context as Md5Context;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::DownloadError;
use crate::events::DownloadEvent;
use crate::store::{now_unix, DownloadState, EntryStatus, MasterEntry, StateStore};
use probe::ProbeResult;
use worker::{run_worker, TaskQueue, WorkerParams};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub url: String,
    /// Directory (filename comes from the probe) or explicit file path.
    pub dest_path: String,
    pub verbose: bool,
    pub md5: Option<String>,
    pub sha256: Option<String>,
    pub id: String,
    pub concurrency: usize,
}

/// Runs one download to completion, pause or failure.
///
/// On `Ok` with the download complete, the file at the final path has the
/// probed size, matches any supplied checksums, and no state file remains.
/// On external cancellation mid-transfer the remaining ranges are persisted
/// and `Ok` is returned after a `Paused` event; re-invoking with the same
/// URL and destination resumes. Failures leave either nothing (stream mode)
/// or a restartable partial plus its state file (ranged mode).
pub async fn download(
    ctx: CancellationToken,
    opts: DownloadOptions,
    settings: &Settings,
    store: &StateStore,
    events: mpsc::Sender<DownloadEvent>,
) -> Result<(), DownloadError> {
    debug!(
        url = %opts.url,
        dest = %opts.dest_path,
        concurrency = opts.concurrency,
        verbose = opts.verbose,
        "download requested"
    );
    let client = Client::builder()
        .connect_timeout(settings.connect_timeout())
        .read_timeout(settings.read_timeout())
        .build()?;

    let probed = probe_with_retry(&client, &opts.url, settings, &ctx).await?;

    let filename = probe::resolve_filename(probed.filename.as_deref(), &opts.url);
    let final_path = resolve_dest(&opts.dest_path, &filename);
    if let Some(parent) = final_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    debug!(url = %opts.url, path = %final_path.display(), ?probed, "probe complete");

    match probed {
        ProbeResult {
            total: Some(0), ..
        } => complete_empty(&opts, store, &events, &final_path, &filename).await,
        ProbeResult {
            total: Some(total),
            accepts_ranges: true,
            ..
        } => {
            download_ranged(
                ctx, &opts, settings, store, &events, &client, &final_path, &filename, total,
            )
            .await
        }
        ProbeResult { total, .. } => {
            download_single_stream(
                ctx, &opts, settings, store, &events, &client, &final_path, &filename, total,
            )
            .await
        }
    }
}

/// Probe with the worker retry budget; every failure mode (rejected HEAD and
/// rejected fallback alike) is retried before giving up.
async fn probe_with_retry(
    client: &Client,
    url: &str,
    settings: &Settings,
    ctx: &CancellationToken,
) -> Result<ProbeResult, DownloadError> {
    let mut last = String::new();
    for attempt in 0..settings.max_retries.max(1) {
        if ctx.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        match probe::probe(client, url).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(url, attempt, error = %e, "probe attempt failed");
                last = e.to_string();
            }
        }
        let delay = settings.retry_base_delay().saturating_mul(1 << attempt.min(6));
        tokio::select! {
            _ = ctx.cancelled() => return Err(DownloadError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    Err(DownloadError::Probe(last))
}

#[allow(clippy::too_many_arguments)]
async fn download_ranged(
    ctx: CancellationToken,
    opts: &DownloadOptions,
    settings: &Settings,
    store: &StateStore,
    events: &mpsc::Sender<DownloadEvent>,
    client: &Client,
    final_path: &Path,
    filename: &str,
    total: u64,
) -> Result<(), DownloadError> {
    // Resume plan from a previous pause, when it still matches the resource.
    // A resumed download keeps its original id so the master list stays
    // keyed to one entry across pause cycles.
    let mut opts = opts.clone();
    let mut tasks: Vec<Task> = Vec::new();
    let mut created_at = 0i64;
    if let Ok(saved) = store.load_state(&opts.url, &opts.dest_path).await {
        let file_present = tokio::fs::metadata(final_path).await.is_ok();
        if saved.total_size == total && !saved.tasks.is_empty() && file_present {
            tasks = saved
                .tasks
                .iter()
                .map(|t| Task::new(t.start, t.end))
                .collect();
            created_at = saved.created_at;
            if !saved.id.is_empty() {
                opts.id = saved.id;
            }
            info!(
                url = %opts.url,
                downloaded = total - remaining_bytes(&tasks),
                "resuming from saved state"
            );
        } else {
            warn!(url = %opts.url, "saved state does not match resource, starting over");
        }
    }
    let opts = &opts;

    let fresh = tasks.is_empty();
    if fresh {
        let concurrency = opts.concurrency.clamp(1, settings.max_concurrency);
        tasks = plan_tasks(total, concurrency, settings.min_segment);
    }
    let initial_downloaded = total - remaining_bytes(&tasks);

    {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(final_path)
            .await?;
        if fresh {
            file.set_len(total).await?;
        }
    }

    let worker_cancel = ctx.child_token();
    let progress = Arc::new(ProgressState::new(
        opts.id.clone(),
        total,
        worker_cancel.clone(),
    ));
    progress.set_downloaded(initial_downloaded);

    let worker_count = opts
        .concurrency
        .clamp(1, settings.max_concurrency)
        .min(tasks.len());
    let queue: TaskQueue = Arc::new(Mutex::new(tasks));

    send_event(
        events,
        DownloadEvent::Started {
            id: opts.id.clone(),
            filename: filename.to_string(),
            total,
        },
    )
    .await;

    let pump_stop = CancellationToken::new();
    let pump = spawn_progress_pump(
        events.clone(),
        progress.clone(),
        settings.progress_interval(),
        pump_stop.clone(),
    );

    let mut pool: JoinSet<Result<(), DownloadError>> = JoinSet::new();
    for _ in 0..worker_count {
        pool.spawn(run_worker(WorkerParams {
            client: client.clone(),
            url: opts.url.clone(),
            path: final_path.to_path_buf(),
            queue: queue.clone(),
            progress: progress.clone(),
            cancel: progress.cancel_token(),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay(),
        }));
    }

    // First fatal error wins; the rest of the pool is cancelled and its
    // late errors are discarded.
    let mut fatal: Option<DownloadError> = None;
    while let Some(joined) = pool.join_next().await {
        let outcome = joined
            .unwrap_or_else(|e| Err(DownloadError::Io(std::io::Error::other(e))));
        if let Err(e) = outcome {
            if fatal.is_none() {
                warn!(url = %opts.url, error = %e, "worker failed, stopping download");
                fatal = Some(e);
                worker_cancel.cancel();
            }
        }
    }

    pump_stop.cancel();
    let _ = pump.await;

    let remaining = {
        let queue = queue.lock().await;
        remaining_tasks(&queue)
    };

    if let Some(err) = fatal {
        // The partial is restartable; checkpoint it like a pause so a retry
        // of the same command picks up from here.
        if !remaining.is_empty() {
            if let Err(persist_err) = save_checkpoint(
                store, opts, filename, total, &remaining, created_at,
            )
            .await
            {
                warn!(error = %persist_err, "failed to checkpoint after error");
            }
        }
        send_event(
            events,
            DownloadEvent::Error {
                id: opts.id.clone(),
                error: err.to_string(),
            },
        )
        .await;
        return Err(err);
    }

    // Pause arrives through the external token or through the shared
    // progress handle; either way the remaining ranges get checkpointed.
    if (ctx.is_cancelled() || progress.is_paused()) && !remaining.is_empty() {
        progress.pause();
        let downloaded = total - remaining_bytes(&remaining);
        save_checkpoint(store, opts, filename, total, &remaining, created_at).await?;
        info!(url = %opts.url, downloaded, total, "download paused");
        send_event(
            events,
            DownloadEvent::Paused {
                id: opts.id.clone(),
                downloaded,
                total,
            },
        )
        .await;
        return Ok(());
    }

    progress.set_done();
    finalize(opts, store, events, final_path, filename, total, progress.as_ref()).await
}

#[allow(clippy::too_many_arguments)]
async fn download_single_stream(
    ctx: CancellationToken,
    opts: &DownloadOptions,
    settings: &Settings,
    store: &StateStore,
    events: &mpsc::Sender<DownloadEvent>,
    client: &Client,
    final_path: &Path,
    filename: &str,
    total: Option<u64>,
) -> Result<(), DownloadError> {
    let part_path = part_path_for(final_path);
    let progress = Arc::new(ProgressState::new(
        opts.id.clone(),
        total.unwrap_or(0),
        ctx.clone(),
    ));

    info!(url = %opts.url, "no range support, using a single stream");
    send_event(
        events,
        DownloadEvent::Started {
            id: opts.id.clone(),
            filename: filename.to_string(),
            total: total.unwrap_or(0),
        },
    )
    .await;

    let pump_stop = CancellationToken::new();
    let pump = spawn_progress_pump(
        events.clone(),
        progress.clone(),
        settings.progress_interval(),
        pump_stop.clone(),
    );

    let result = stream_to_file(&ctx, client, &opts.url, &part_path, progress.as_ref()).await;

    pump_stop.cancel();
    let _ = pump.await;

    if let Err(err) = result {
        // No resume without ranges: a pause here is a cancel, and the
        // partial is useless either way.
        let _ = tokio::fs::remove_file(&part_path).await;
        let _ = store
            .add_to_master_list(error_entry(opts, filename, total.unwrap_or(0)))
            .await;
        send_event(
            events,
            DownloadEvent::Error {
                id: opts.id.clone(),
                error: err.to_string(),
            },
        )
        .await;
        return Err(err);
    }

    progress.set_done();
    if let Err(err) =
        verify_checksums(&part_path, opts.md5.as_deref(), opts.sha256.as_deref()).await
    {
        warn!(path = %part_path.display(), error = %err, "checksum mismatch, removing file");
        let _ = tokio::fs::remove_file(&part_path).await;
        let _ = store
            .add_to_master_list(error_entry(opts, filename, total.unwrap_or(0)))
            .await;
        send_event(
            events,
            DownloadEvent::Error {
                id: opts.id.clone(),
                error: err.to_string(),
            },
        )
        .await;
        return Err(err);
    }

    tokio::fs::rename(&part_path, final_path).await?;

    let written = progress.downloaded();
    record_completion(opts, store, events, filename, written, progress.as_ref()).await
}

async fn stream_to_file(
    ctx: &CancellationToken,
    client: &Client,
    url: &str,
    path: &Path,
    progress: &ProgressState,
) -> Result<(), DownloadError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut response = tokio::select! {
        _ = ctx.cancelled() => return Err(DownloadError::Cancelled),
        resp = client.get(url).send() => resp?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus(status.as_u16()));
    }

    loop {
        let next = tokio::select! {
            _ = ctx.cancelled() => return Err(DownloadError::Cancelled),
            chunk = response.chunk() => chunk,
        };
        match next {
            Ok(Some(bytes)) => {
                file.write_all(&bytes).await?;
                progress.add(bytes.len() as u64);
            }
            Ok(None) => break,
            Err(e) => return Err(e.into()),
        }
    }
    file.flush().await?;
    Ok(())
}

/// Zero-byte resource: nothing to transfer, straight to finalization.
async fn complete_empty(
    opts: &DownloadOptions,
    store: &StateStore,
    events: &mpsc::Sender<DownloadEvent>,
    final_path: &Path,
    filename: &str,
) -> Result<(), DownloadError> {
    let file = tokio::fs::File::create(final_path).await?;
    file.set_len(0).await?;
    drop(file);

    send_event(
        events,
        DownloadEvent::Started {
            id: opts.id.clone(),
            filename: filename.to_string(),
            total: 0,
        },
    )
    .await;

    let progress = Arc::new(ProgressState::new(
        opts.id.clone(),
        0,
        CancellationToken::new(),
    ));
    progress.set_done();
    finalize(opts, store, events, final_path, filename, 0, progress.as_ref()).await
}

/// Verify, record completion in the master list, drop the resume state, and
/// announce. The checksum mismatch path deletes the file and keeps no state.
async fn finalize(
    opts: &DownloadOptions,
    store: &StateStore,
    events: &mpsc::Sender<DownloadEvent>,
    final_path: &Path,
    filename: &str,
    total: u64,
    progress: &ProgressState,
) -> Result<(), DownloadError> {
    if let Err(err) =
        verify_checksums(final_path, opts.md5.as_deref(), opts.sha256.as_deref()).await
    {
        warn!(path = %final_path.display(), error = %err, "checksum mismatch, removing file");
        let _ = tokio::fs::remove_file(final_path).await;
        let _ = store.remove_state_file(&opts.url, &opts.dest_path).await;
        let _ = store
            .add_to_master_list(error_entry(opts, filename, total))
            .await;
        send_event(
            events,
            DownloadEvent::Error {
                id: opts.id.clone(),
                error: err.to_string(),
            },
        )
        .await;
        return Err(err);
    }

    record_completion(opts, store, events, filename, total, progress).await
}

/// Upsert the completed master entry, drop the resume record, announce.
async fn record_completion(
    opts: &DownloadOptions,
    store: &StateStore,
    events: &mpsc::Sender<DownloadEvent>,
    filename: &str,
    total: u64,
    progress: &ProgressState,
) -> Result<(), DownloadError> {
    let elapsed_ms = progress.elapsed().as_millis() as u64;
    store
        .add_to_master_list(MasterEntry {
            id: opts.id.clone(),
            url_hash: crate::store::url_hash(&opts.url),
            url: opts.url.clone(),
            dest_path: opts.dest_path.clone(),
            filename: filename.to_string(),
            status: EntryStatus::Completed,
            total_size: total,
            completed_at: now_unix(),
            time_taken_ms: elapsed_ms as i64,
        })
        .await?;
    store.remove_state_file(&opts.url, &opts.dest_path).await?;

    info!(url = %opts.url, total, elapsed_ms, "download complete");
    send_event(
        events,
        DownloadEvent::Complete {
            id: opts.id.clone(),
            total,
            elapsed_ms,
        },
    )
    .await;
    Ok(())
}

async fn save_checkpoint(
    store: &StateStore,
    opts: &DownloadOptions,
    filename: &str,
    total: u64,
    remaining: &[Task],
    created_at: i64,
) -> Result<(), DownloadError> {
    let mut state = DownloadState {
        id: opts.id.clone(),
        url_hash: String::new(),
        url: opts.url.clone(),
        dest_path: opts.dest_path.clone(),
        total_size: total,
        downloaded: total - remaining_bytes(remaining),
        tasks: remaining.to_vec(),
        filename: filename.to_string(),
        created_at,
        paused_at: 0,
    };
    store
        .save_state(&opts.url, &opts.dest_path, &mut state)
        .await?;
    Ok(())
}

/// Not-yet-done ranges, with `start` already advanced past everything the
/// workers wrote, reset to pending for the next run.
fn remaining_tasks(tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Done)
        .map(|t| Task::new(t.start, t.end))
        .collect()
}

fn remaining_bytes(tasks: &[Task]) -> u64 {
    tasks.iter().map(Task::len).sum()
}

fn spawn_progress_pump(
    events: mpsc::Sender<DownloadEvent>,
    progress: Arc<ProgressState>,
    interval: Duration,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last: Option<u64> = None;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => {
                    let downloaded = progress.downloaded();
                    if last != Some(downloaded) {
                        // Best effort: a slow consumer drops ticks, never
                        // stalls workers.
                        let _ = events.try_send(DownloadEvent::Progress {
                            id: progress.id.clone(),
                            downloaded,
                        });
                        last = Some(downloaded);
                    }
                }
            }
        }
    })
}

async fn send_event(events: &mpsc::Sender<DownloadEvent>, event: DownloadEvent) {
    let _ = events.send(event).await;
}

fn error_entry(opts: &DownloadOptions, filename: &str, total: u64) -> MasterEntry {
    MasterEntry {
        id: opts.id.clone(),
        url_hash: crate::store::url_hash(&opts.url),
        url: opts.url.clone(),
        dest_path: opts.dest_path.clone(),
        filename: filename.to_string(),
        status: EntryStatus::Error,
        total_size: total,
        completed_at: 0,
        time_taken_ms: 0,
    }
}

/// A destination argument is a directory when it exists as one, is empty, or
/// ends with a separator; the probed filename lands inside it. Anything else
/// is an explicit file path.
fn resolve_dest(dest_path: &str, filename: &str) -> PathBuf {
    if dest_path.is_empty() || dest_path == "." {
        return Path::new(".").join(filename);
    }
    let dest = Path::new(dest_path);
    if dest_path.ends_with('/') || dest.is_dir() {
        dest.join(filename)
    } else {
        dest.to_path_buf()
    }
}

fn part_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| probe::DEFAULT_FILENAME.to_string());
    final_path.with_file_name(format!("{name}.part"))
}

/// Streams the file once, feeding whichever digests were requested, and
/// compares case-insensitively.
async fn verify_checksums(
    path: &Path,
    md5sum: Option<&str>,
    sha256sum: Option<&str>,
) -> Result<(), DownloadError> {
    if md5sum.is_none() && sha256sum.is_none() {
        return Ok(());
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut md5_ctx = Md5Context::new();
    let mut sha256_ctx = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if md5sum.is_some() {
            md5_ctx.consume(&buf[..n]);
        }
        if sha256sum.is_some() {
            sha256_ctx.update(&buf[..n]);
        }
    }

    if let Some(expected) = md5sum {
        let actual = format!("{:x}", md5_ctx.compute());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::ChecksumMismatch {
                algo: "md5",
                expected: expected.to_string(),
                actual,
            });
        }
    }
    if let Some(expected) = sha256sum {
        let actual = hex::encode(sha256_ctx.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::ChecksumMismatch {
                algo: "sha256",
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_dest_variants() {
        assert_eq!(resolve_dest("", "f.bin"), Path::new("./f.bin"));
        assert_eq!(resolve_dest(".", "f.bin"), Path::new("./f.bin"));
        assert_eq!(resolve_dest("out/dir/", "f.bin"), Path::new("out/dir/f.bin"));
        assert_eq!(resolve_dest("out/file.iso", "f.bin"), Path::new("out/file.iso"));

        let dir = TempDir::new().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        assert_eq!(
            resolve_dest(&dir_str, "f.bin"),
            dir.path().join("f.bin")
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path_for(Path::new("/tmp/file.iso")),
            Path::new("/tmp/file.iso.part")
        );
    }

    #[test]
    fn test_remaining_task_arithmetic() {
        let total = 1000u64;
        let mut tasks = plan_tasks(total, 4, 1);
        assert_eq!(tasks.len(), 4);

        // Worker finished the first range, half-finished the second.
        tasks[0].status = TaskStatus::Done;
        tasks[1].status = TaskStatus::InProgress;
        tasks[1].start += 100;

        let remaining = remaining_tasks(&tasks);
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|t| t.status == TaskStatus::Pending));

        // downloaded + remaining == total, the resume invariant.
        let downloaded = total - remaining_bytes(&remaining);
        assert_eq!(downloaded, 250 + 100);
    }

    #[tokio::test]
    async fn test_verify_checksums() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let md5_hello = "5d41402abc4b2a76b9719d911017c592";
        let sha256_hello = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

        verify_checksums(&path, Some(md5_hello), None).await.unwrap();
        verify_checksums(&path, None, Some(sha256_hello)).await.unwrap();
        verify_checksums(&path, Some(md5_hello), Some(sha256_hello))
            .await
            .unwrap();
        // Case-insensitive comparison.
        verify_checksums(&path, Some(&md5_hello.to_uppercase()), None)
            .await
            .unwrap();
        // No checksums requested: nothing to do, even for a missing file.
        verify_checksums(Path::new("/nonexistent"), None, None)
            .await
            .unwrap();

        let err = verify_checksums(&path, None, Some("deadbeef")).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::ChecksumMismatch { algo: "sha256", .. }
        ));
    }
}
