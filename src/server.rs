// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Local control server: other processes (or a second `surge get --port`
//! invocation) POST a URL and destination, and the download runs here as if
//! it had been typed locally.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{Settings, DEFAULT_CONCURRENCY, EVENT_CHANNEL_BUFFER};
use crate::engine::{self, DownloadOptions};
use crate::events::DownloadEvent;
use crate::source;
use crate::store::StateStore;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Clone)]
struct ServerState {
    settings: Arc<Settings>,
    store: Arc<StateStore>,
}

pub async fn run(
    settings: Settings,
    store: Arc<StateStore>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = ServerState {
        settings: Arc::new(settings),
        store,
    };
    let app = Router::new()
        .route("/download", post(queue_download))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "control server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn queue_download(
    State(state): State<ServerState>,
    Json(req): Json<DownloadRequest>,
) -> (StatusCode, String) {
    if !source::is_supported(&req.url) {
        return (
            StatusCode::BAD_REQUEST,
            format!("unsupported source: {}\n", req.url),
        );
    }
    let dest = if req.path.is_empty() {
        ".".to_string()
    } else {
        req.path
    };

    let id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<DownloadEvent>(EVENT_CHANNEL_BUFFER);
    tokio::spawn(drain_events(rx));

    let opts = DownloadOptions {
        url: req.url.clone(),
        dest_path: dest.clone(),
        verbose: false,
        md5: None,
        sha256: None,
        id: id.clone(),
        concurrency: DEFAULT_CONCURRENCY,
    };
    let settings = state.settings.clone();
    let store = state.store.clone();
    tokio::spawn(async move {
        let ctx = CancellationToken::new();
        if let Err(e) = engine::download(ctx, opts, &settings, &store, tx).await {
            error!(error = %e, "queued download failed");
        }
    });

    info!(url = %req.url, dest = %dest, id = %id, "download queued");
    (
        StatusCode::OK,
        format!("queued {} -> {} (id {})\n", req.url, dest, id),
    )
}

/// Queued downloads have no terminal attached; their events land in the log.
async fn drain_events(mut rx: mpsc::Receiver<DownloadEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Started { id, filename, total } => {
                info!(id, filename, total, "download started");
            }
            DownloadEvent::Progress { .. } => {}
            DownloadEvent::Complete { id, total, elapsed_ms } => {
                info!(id, total, elapsed_ms, "download complete");
            }
            DownloadEvent::Error { id, error } => {
                error!(id, error, "download failed");
            }
            DownloadEvent::Paused { id, downloaded, total } => {
                info!(id, downloaded, total, "download paused");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let req: DownloadRequest =
            serde_json::from_str(r#"{"url": "https://a/f", "path": "/tmp"}"#).unwrap();
        assert_eq!(req.url, "https://a/f");
        assert_eq!(req.path, "/tmp");

        // path is optional
        let req: DownloadRequest = serde_json::from_str(r#"{"url": "https://a/f"}"#).unwrap();
        assert!(req.path.is_empty());
    }
}
