// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_appender::rolling;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};
use uuid::Uuid;

use surge::cli::{self, human_bytes, Cli, Commands, GetArgs};
use surge::config::{Settings, EVENT_CHANNEL_BUFFER};
use surge::engine::{self, DownloadOptions};
use surge::server;
use surge::source::{self, Kind};
use surge::store::StateStore;
use surge::torrent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::default();

    let result = match cli.command {
        Commands::Get(args) => {
            let _log_guard = init_debug_log(&settings, args.verbose);
            run_get(&settings, &args).await
        }
        Commands::List => run_list(&settings).await,
        Commands::Serve { port } => {
            tracing_subscriber::fmt::init();
            let store = Arc::new(StateStore::new(&settings));
            server::run(settings, store, port).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

/// `--verbose` writes a debug trace file under the logs root; without it
/// nothing is logged at all.
fn init_debug_log(
    settings: &Settings,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if !verbose {
        return None;
    }
    if let Err(e) = std::fs::create_dir_all(&settings.logs_dir) {
        eprintln!("Failed to create log directory: {e}");
        return None;
    }
    let name = format!(
        "debug-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let file = rolling::never(&settings.logs_dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG),
        )
        .init();
    Some(guard)
}

async fn run_get(settings: &Settings, args: &GetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let Some((primary, mirrors)) = source::parse_comma_arg(&args.url) else {
        return Err(format!("unsupported source: {}", args.url).into());
    };
    if mirrors.len() > 1 {
        debug!(count = mirrors.len(), "mirrors noted, transferring from primary only");
    }

    match source::kind_of(&primary) {
        Kind::Magnet => describe_magnet(&primary),
        Kind::TorrentUrl => describe_torrent(settings, &primary).await,
        Kind::Http => download_http(settings, args, primary).await,
        Kind::Unknown => Err(format!("unsupported source: {primary}").into()),
    }
}

async fn download_http(
    settings: &Settings,
    args: &GetArgs,
    url: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let dest = args.path.clone().unwrap_or_else(|| ".".to_string());

    // A configured port means a surge server owns the download.
    if args.port > 0 {
        return send_to_server(&url, &dest, args.port).await;
    }

    let store = StateStore::new(settings);
    let ctx = CancellationToken::new();
    {
        // Ctrl-C pauses: workers stop at the next write boundary and the
        // remaining ranges are checkpointed.
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        });
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
    let printer = if args.headless {
        tokio::spawn(cli::headless_printer(rx))
    } else {
        tokio::spawn(cli::progress_bar_printer(rx))
    };

    let opts = DownloadOptions {
        url,
        dest_path: dest,
        verbose: args.verbose,
        md5: args.md5.clone(),
        sha256: args.sha256.clone(),
        id: Uuid::new_v4().to_string(),
        concurrency: args.concurrent,
    };

    let result = engine::download(ctx, opts, settings, &store, tx).await;
    let _ = printer.await;
    result.map_err(Into::into)
}

/// Forwards the request to a running control server, exactly as a local
/// invocation would run it there.
async fn send_to_server(url: &str, dest: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let body = serde_json::json!({ "url": url, "path": dest });
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/download"))
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(format!("server returned error: {status} - {}", text.trim()).into());
    }
    println!("Download queued on server: {}", text.trim());
    Ok(())
}

async fn describe_torrent(
    settings: &Settings,
    url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout())
        .build()?;
    let data = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let meta = torrent::parse_torrent(&data)?;

    println!("Torrent: {}", meta.info.name);
    println!("  size:      {}", human_bytes(meta.info.total_size().max(0) as u64));
    println!("  info hash: {}", hex::encode(meta.info_hash));
    if meta.info.files.len() > 1 {
        println!("  files:     {}", meta.info.files.len());
    }
    if let Some(announce) = &meta.announce {
        println!("  announce:  {announce}");
    }
    if !meta.announce_list.is_empty() {
        println!("  tiers:     {}", meta.announce_list.len());
    }
    println!("Peer transfer is out of surge's scope; hand the torrent to a BitTorrent client.");
    Ok(())
}

fn describe_magnet(raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let magnet = torrent::parse_magnet(raw)?;

    match &magnet.display_name {
        Some(name) => println!("Magnet: {name}"),
        None => println!("Magnet link"),
    }
    println!("  info hash: {}", hex::encode(magnet.info_hash));
    for tracker in &magnet.trackers {
        println!("  tracker:   {tracker}");
    }
    println!("Peer transfer is out of surge's scope; hand the magnet to a BitTorrent client.");
    Ok(())
}

async fn run_list(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::new(settings);
    let paused = store.load_paused().await?;
    let completed = store.load_completed().await?;

    if paused.is_empty() && completed.is_empty() {
        println!("No downloads tracked.");
        return Ok(());
    }
    if !paused.is_empty() {
        println!("Paused:");
        for entry in &paused {
            println!("  {}  {}  -> {}", entry.id, entry.url, entry.dest_path);
        }
    }
    if !completed.is_empty() {
        println!("Completed:");
        for entry in &completed {
            println!(
                "  {}  {}  {} in {:.1}s",
                entry.id,
                entry.filename,
                human_bytes(entry.total_size),
                entry.time_taken_ms as f64 / 1000.0
            );
        }
    }
    Ok(())
}
