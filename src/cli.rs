// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::DEFAULT_CONCURRENCY;
use crate::events::DownloadEvent;

#[derive(Parser, Debug)]
#[command(name = "surge", version, about = "Multi-protocol download manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a file from a URL
    Get(GetArgs),
    /// List paused and completed downloads
    List,
    /// Run the control server and accept queued downloads
    Serve {
        #[arg(short = 'p', long, default_value_t = 7777)]
        port: u16,
    },
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Source: HTTP(S) URL, .torrent URL or magnet link. Comma-separated
    /// mirrors are accepted after the primary.
    pub url: String,

    /// Download folder, or an explicit file path
    #[arg(short = 'o', long)]
    pub path: Option<String>,

    /// Number of concurrent connections (1 = single stream)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrent: usize,

    /// Write a debug trace to the logs directory
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Plain line output instead of a progress bar, for scripting
    #[arg(long)]
    pub headless: bool,

    /// MD5 checksum to verify against after the transfer
    #[arg(long)]
    pub md5: Option<String>,

    /// SHA-256 checksum to verify against after the transfer
    #[arg(long)]
    pub sha256: Option<String>,

    /// Queue on a running surge server instead of downloading here
    #[arg(short = 'p', long, default_value_t = 0)]
    pub port: u16,
}

/// Headless event consumer: one line per ~10% on stderr, plus start and
/// completion summaries.
pub async fn headless_printer(mut rx: mpsc::Receiver<DownloadEvent>) {
    let start = Instant::now();
    let mut total: u64 = 0;
    let mut last: u64 = 0;

    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Started { filename, total: t, .. } => {
                total = t;
                eprintln!("Downloading: {} ({})", filename, human_bytes(t));
            }
            DownloadEvent::Progress { downloaded, .. } => {
                if total > 0 {
                    let percent = downloaded * 100 / total;
                    let last_percent = last * 100 / total;
                    if percent / 10 > last_percent / 10 {
                        let speed = downloaded as f64
                            / start.elapsed().as_secs_f64()
                            / (1024.0 * 1024.0);
                        eprintln!(
                            "  {}% ({}) - {:.2} MB/s",
                            percent,
                            human_bytes(downloaded),
                            speed
                        );
                    }
                    last = downloaded;
                }
            }
            DownloadEvent::Complete { total: t, elapsed_ms, .. } => {
                let secs = (elapsed_ms as f64 / 1000.0).max(0.001);
                let speed = t as f64 / secs / (1024.0 * 1024.0);
                eprintln!(
                    "Complete: {} in {:.1}s ({:.2} MB/s)",
                    human_bytes(t),
                    secs,
                    speed
                );
            }
            DownloadEvent::Error { error, .. } => {
                eprintln!("Error: {error}");
            }
            DownloadEvent::Paused { downloaded, total, .. } => {
                eprintln!(
                    "Paused at {} / {} (rerun the same command to resume)",
                    human_bytes(downloaded),
                    human_bytes(total)
                );
            }
        }
    }
}

/// Interactive event consumer: an indicatif bar driven by the event stream.
pub async fn progress_bar_printer(mut rx: mpsc::Receiver<DownloadEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Started { filename, total, .. } => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
                pb.println(format!("Downloading: {} ({})", filename, human_bytes(total)));
                bar = Some(pb);
            }
            DownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = &bar {
                    pb.set_position(downloaded);
                }
            }
            DownloadEvent::Complete { total, elapsed_ms, .. } => {
                if let Some(pb) = &bar {
                    pb.set_position(total);
                    pb.finish();
                }
                let secs = (elapsed_ms as f64 / 1000.0).max(0.001);
                eprintln!(
                    "Complete: {} in {:.1}s ({:.2} MB/s)",
                    human_bytes(total),
                    secs,
                    total as f64 / secs / (1024.0 * 1024.0)
                );
            }
            DownloadEvent::Error { error, .. } => {
                if let Some(pb) = &bar {
                    pb.abandon();
                }
                eprintln!("Error: {error}");
            }
            DownloadEvent::Paused { downloaded, total, .. } => {
                if let Some(pb) = &bar {
                    pb.abandon();
                }
                eprintln!(
                    "Paused at {} / {} (rerun the same command to resume)",
                    human_bytes(downloaded),
                    human_bytes(total)
                );
            }
        }
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(1_000_000), "976.6 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_cli_parses_get_flags() {
        let cli = Cli::try_parse_from([
            "surge", "get", "https://a/f.iso", "-o", "/tmp", "-c", "8", "--headless",
            "--sha256", "abc",
        ])
        .unwrap();
        let Commands::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.url, "https://a/f.iso");
        assert_eq!(args.path.as_deref(), Some("/tmp"));
        assert_eq!(args.concurrent, 8);
        assert!(args.headless);
        assert!(!args.verbose);
        assert_eq!(args.sha256.as_deref(), Some("abc"));
        assert_eq!(args.port, 0);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["surge", "get", "https://a/f"]).unwrap();
        let Commands::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.concurrent, DEFAULT_CONCURRENCY);
        assert!(args.path.is_none());
    }
}
