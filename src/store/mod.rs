// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistence for resumable downloads: one JSON record per in-flight
//! download plus a master `downloads.json` index of everything surge knows
//! about. All writes go through temp-file-plus-rename so a crash never
//! leaves a half-written record behind.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Settings;
use crate::engine::Task;
use crate::errors::StoreError;

/// Short hash of the URL alone, used to key master-list entries that
/// predate stable ids.
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Hash over URL and destination, so the same URL downloading to two
/// places gets two state files.
pub fn state_hash(url: &str, dest_path: &str) -> String {
    let digest = Sha256::digest(format!("{url}|{dest_path}").as_bytes());
    hex::encode(&digest[..8])
}

/// Resume record for one download. `downloaded + sum(task lengths)` always
/// equals `total_size`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url_hash: String,
    pub url: String,
    pub dest_path: String,
    pub total_size: u64,
    pub downloaded: u64,
    /// Remaining (non-done) ranges.
    pub tasks: Vec<Task>,
    pub filename: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub paused_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url_hash: String,
    pub url: String,
    pub dest_path: String,
    pub filename: String,
    pub status: EntryStatus,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub completed_at: i64,
    /// Transfer duration in milliseconds, for completed entries.
    #[serde(rename = "time_taken", default)]
    pub time_taken_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterList {
    pub downloads: Vec<MasterEntry>,
}

/// Handle on the state directory. The master-list mutex lives here rather
/// than in module globals; `main` builds one store and shares it. The lock
/// only serializes writers in this process; crash safety against other
/// processes comes from the atomic rename, not the lock.
pub struct StateStore {
    state_dir: PathBuf,
    master_mu: Mutex<()>,
}

impl StateStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            state_dir: settings.state_dir.clone(),
            master_mu: Mutex::new(()),
        }
    }

    fn state_path(&self, url: &str, dest_path: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", state_hash(url, dest_path)))
    }

    fn master_path(&self) -> PathBuf {
        self.state_dir.join("downloads.json")
    }

    /// Persists a resume record and upserts the matching paused master
    /// entry. Fills `url_hash` and timestamps in place.
    pub async fn save_state(
        &self,
        url: &str,
        dest_path: &str,
        state: &mut DownloadState,
    ) -> Result<(), StoreError> {
        let path = self.state_path(url, dest_path);

        state.url_hash = url_hash(url);
        state.paused_at = now_unix();
        if state.created_at == 0 {
            state.created_at = now_unix();
        }

        let data = serde_json::to_vec_pretty(state)?;
        write_atomic(&path, &data).await?;
        debug!(path = %path.display(), tasks = state.tasks.len(), "saved download state");

        self.add_to_master_list(MasterEntry {
            id: state.id.clone(),
            url_hash: state.url_hash.clone(),
            url: state.url.clone(),
            dest_path: state.dest_path.clone(),
            filename: state.filename.clone(),
            status: EntryStatus::Paused,
            total_size: state.total_size,
            completed_at: 0,
            time_taken_ms: 0,
        })
        .await
    }

    pub async fn load_state(
        &self,
        url: &str,
        dest_path: &str,
    ) -> Result<DownloadState, StoreError> {
        let path = self.state_path(url, dest_path);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// Removes just the state file; succeeds when it was already gone.
    pub async fn remove_state_file(&self, url: &str, dest_path: &str) -> Result<(), StoreError> {
        let path = self.state_path(url, dest_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the state file and the master entry. Used when the user
    /// discards a download entirely.
    pub async fn delete_state(
        &self,
        id: &str,
        url: &str,
        dest_path: &str,
    ) -> Result<(), StoreError> {
        self.remove_state_file(url, dest_path).await?;
        self.remove_from_master_list(id).await
    }

    pub async fn load_master_list(&self) -> Result<MasterList, StoreError> {
        let data = match tokio::fs::read(self.master_path()).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MasterList::default())
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn save_master_list(&self, list: &MasterList) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(list)?;
        write_atomic(&self.master_path(), &data).await
    }

    /// Upserts a master entry. Entries with an id match on id; legacy
    /// entries without one fall back to the URL hash.
    pub async fn add_to_master_list(&self, entry: MasterEntry) -> Result<(), StoreError> {
        let _guard = self.master_mu.lock().await;

        let mut list = self.load_master_list().await.unwrap_or_default();

        let existing = list.downloads.iter_mut().find(|e| {
            if !entry.id.is_empty() {
                e.id == entry.id
            } else {
                e.url_hash == entry.url_hash
            }
        });
        match existing {
            Some(slot) => *slot = entry,
            None => list.downloads.push(entry),
        }

        self.save_master_list(&list).await
    }

    pub async fn remove_from_master_list(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.master_mu.lock().await;

        let Ok(mut list) = self.load_master_list().await else {
            return Ok(()); // nothing to remove
        };
        list.downloads.retain(|e| e.id != id);
        self.save_master_list(&list).await
    }

    pub async fn load_paused(&self) -> Result<Vec<MasterEntry>, StoreError> {
        Ok(self
            .load_master_list()
            .await?
            .downloads
            .into_iter()
            .filter(|e| e.status == EntryStatus::Paused)
            .collect())
    }

    pub async fn load_completed(&self) -> Result<Vec<MasterEntry>, StoreError> {
        Ok(self
            .load_master_list()
            .await?
            .downloads
            .into_iter()
            .filter(|e| e.status == EntryStatus::Completed)
            .collect())
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Write-to-temp then rename, creating the parent directory on the way.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
