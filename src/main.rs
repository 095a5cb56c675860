use anyhow::Result;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

mod cli;
mod config;
mod coordinator;
mod downloader;
mod fetcher;
mod files;
mod path_mapper;
mod registry;
mod rewriter;
mod safety;
mod task;

use cli::MirrorCommand;
use registry::RunRegistry;
use task::RunStatus;

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();

    let registry = RunRegistry::new(args.to_config());
    let submitted = registry.submit(args.to_request());

    if submitted.status == RunStatus::Failed {
        eprintln!(
            "❌ Submission rejected: {}",
            submitted
                .error_message
                .as_deref()
                .unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);

    // Submission returns immediately; poll the registry until terminal.
    let snapshot = loop {
        let Some(snapshot) = registry.status(submitted.id) else {
            anyhow::bail!("Run evicted while still being polled");
        };
        if snapshot.status.is_terminal() {
            break snapshot;
        }
        progress_bar.set_message(format!(
            "{:?}: {} pages, {} files, {} bytes",
            snapshot.status,
            snapshot.pages_crawled,
            snapshot.files_downloaded,
            snapshot.total_bytes_downloaded
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
    };

    progress_bar.finish_and_clear();

    match snapshot.status {
        RunStatus::Completed => {
            println!("✅ Mirroring completed successfully!");
            println!("📊 Pages crawled: {}", snapshot.pages_crawled);
            println!("📊 Files downloaded: {}", snapshot.files_downloaded);
            println!("📊 Total bytes: {}", snapshot.total_bytes_downloaded);
            println!("📁 Output: {:?}", snapshot.output_dir);

            let files = files::list_files(&snapshot.output_dir)?;
            println!("🗂  {} files mirrored", files.len().to_string().green());
            Ok(())
        }
        _ => {
            eprintln!(
                "❌ Run failed: {}",
                snapshot
                    .error_message
                    .as_deref()
                    .unwrap_or("unknown error")
                    .red()
            );
            std::process::exit(1);
        }
    }
}
