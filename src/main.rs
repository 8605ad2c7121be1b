//! CLI entry point for the drivebridge proxy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use drivebridge::config::AppConfig;
use drivebridge::download::filename::resolve_unique_path;
use drivebridge::download::{
    DownloadEngine, DownloadOutcome, DownloadedFile, RetryController, RetryPolicy, TaskTracker,
};
use drivebridge::failure::resource_notice;
use drivebridge::gateway::DriveGateway;
use drivebridge::parser::{ReferenceParser, ResourceKind};
use drivebridge::server::{self, AppState};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Serve { bind } => serve(bind).await,
        Command::Fetch { url, output_dir } => fetch(&url, &output_dir).await,
    }
}

async fn serve(bind: Option<String>) -> Result<()> {
    let mut config = AppConfig::from_env();
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    let bind_addr = config.bind_addr.clone();

    info!(addr = %bind_addr, "starting proxy service");
    let state = AppState::new(config);
    server::run(state, &bind_addr)
        .await
        .context("proxy service terminated")
}

async fn fetch(url: &str, output_dir: &Path) -> Result<()> {
    let config = AppConfig::from_env();
    let parser = ReferenceParser::new();
    let Some(reference) = parser.parse(url) else {
        bail!("not a recognized Drive share link: {url}");
    };
    info!(kind = %reference.kind(), id = reference.id(), "parsed share link");

    let gateway = Arc::new(DriveGateway::new(config.api_base, config.api_key));
    let retries = Arc::new(RetryController::new(RetryPolicy::default()));
    let (tracker, mut events) = TaskTracker::with_events();
    let tracker = Arc::new(tracker);
    let engine = DownloadEngine::new(gateway, retries, Arc::clone(&tracker));

    // Render progress events on a bar until the channel closes.
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            bar.set_position(event.progress_percent.round() as u64);
            bar.set_message(format!(
                "{}/s",
                HumanBytes(event.speed_bytes_per_sec as u64)
            ));
        }
        bar.finish_and_clear();
    });

    let result = match reference.kind() {
        ResourceKind::File => fetch_file(&engine, &reference, output_dir).await,
        ResourceKind::Folder => fetch_folder(&engine, &reference, output_dir).await,
    };

    drop(engine);
    drop(tracker);
    let _ = progress_task.await;

    result
}

async fn fetch_file(
    engine: &DownloadEngine,
    reference: &drivebridge::parser::ResourceReference,
    output_dir: &Path,
) -> Result<()> {
    let outcome = engine
        .download_file(reference, None, None)
        .await
        .map_err(|error| {
            let notice = resource_notice(error.kind());
            anyhow::anyhow!("{} {}", notice.message, notice.suggestion)
        })?;

    match outcome {
        DownloadOutcome::Completed(file) => {
            let path = write_output(output_dir, &file).await?;
            info!(path = %path.display(), bytes = file.bytes.len(), "saved");
            Ok(())
        }
        DownloadOutcome::Cancelled => {
            warn!("download cancelled");
            Ok(())
        }
    }
}

async fn fetch_folder(
    engine: &DownloadEngine,
    reference: &drivebridge::parser::ResourceReference,
    output_dir: &Path,
) -> Result<()> {
    let folder = engine
        .download_folder(reference, None)
        .await
        .map_err(|error| {
            let notice = resource_notice(error.kind());
            anyhow::anyhow!("{} {}", notice.message, notice.suggestion)
        })?;

    let target_dir = output_dir.join(&folder.name);
    let mut saved = 0usize;
    let mut failed = 0usize;

    for member in folder.members {
        match member.outcome {
            Ok(DownloadOutcome::Completed(file)) => {
                let path = write_output(&target_dir, &file).await?;
                debug!(path = %path.display(), "saved member");
                saved += 1;
            }
            Ok(DownloadOutcome::Cancelled) => {
                warn!(name = %member.member.name, "member cancelled");
            }
            Err(error) => {
                let notice = resource_notice(error.kind());
                warn!(
                    name = %member.member.name,
                    message = notice.message,
                    suggestion = notice.suggestion,
                    "member failed"
                );
                failed += 1;
            }
        }
    }

    info!(saved, failed, folder = %folder.name, "folder download finished");
    if saved == 0 && failed > 0 {
        bail!("every file in the folder failed to download");
    }
    Ok(())
}

async fn write_output(dir: &Path, file: &DownloadedFile) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = resolve_unique_path(dir, &file.file_name);
    tokio::fs::write(&path, &file.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
