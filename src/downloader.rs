use std::fs;
use std::path::Path;
use std::sync::Arc;
use url::Url;

use crate::config::MirrorConfig;
use crate::fetcher::ResourceFetcher;
use crate::safety;
use crate::task::{DownloadCommit, MirrorRun};

/// Result of one download attempt. Resource-level failures are outcomes,
/// not errors: a missing image must never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched from the network and committed to disk this call.
    Fetched,
    /// Already on disk; idempotent success, counters untouched.
    AlreadyExists,
    /// Not downloaded: out of scope, over a size cap, or the fetch failed.
    Skipped,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DownloadOutcome::Skipped)
    }
}

/// Host component of a URL with any leading `www.` removed.
pub fn url_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// True when both URLs share a host, ignoring a leading `www.`.
pub fn same_domain(a: &str, b: &str) -> bool {
    match (url_domain(a), url_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Downloads resources for one run, enforcing domain scope and the per-file
/// and cumulative size caps before anything reaches disk.
pub struct ResourceDownloader {
    fetcher: ResourceFetcher,
    run: Arc<MirrorRun>,
    target_domain: String,
    external_allowlist: Vec<String>,
    max_file_size: u64,
    max_total_size: u64,
}

impl ResourceDownloader {
    pub fn new(
        fetcher: ResourceFetcher,
        run: Arc<MirrorRun>,
        target_domain: &str,
        config: &MirrorConfig,
    ) -> Self {
        Self {
            fetcher,
            run,
            target_domain: target_domain
                .strip_prefix("www.")
                .unwrap_or(target_domain)
                .to_string(),
            external_allowlist: config.external_domain_allowlist.clone(),
            max_file_size: config.max_file_size,
            max_total_size: config.max_total_size,
        }
    }

    fn domain_allowed(&self, url: &str) -> bool {
        match url_domain(url) {
            Some(domain) => {
                domain == self.target_domain || self.external_allowlist.contains(&domain)
            }
            None => false,
        }
    }

    /// Fetches `url` and persists it at `local_path`. Size checks run before
    /// any disk write; the cumulative quota check and the write commit in
    /// one critical section on the run (`MirrorRun::try_commit_download`).
    pub async fn download(&self, url: &str, local_path: &Path) -> DownloadOutcome {
        if url.trim().is_empty() || !self.domain_allowed(url) {
            return DownloadOutcome::Skipped;
        }

        if local_path.exists() {
            return DownloadOutcome::AlreadyExists;
        }

        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                eprintln!("⚠️  Failed to fetch {}: {}", url, e);
                return DownloadOutcome::Skipped;
            }
        };

        if !fetched.is_success() {
            eprintln!("⚠️  HTTP {} for {}", fetched.status, url);
            return DownloadOutcome::Skipped;
        }

        self.persist(url, local_path, &fetched.bytes)
    }

    /// Commits already-fetched bytes (an HTML page the coordinator fetched
    /// itself) under the same quota rules as a network download.
    pub fn persist(&self, url: &str, local_path: &Path, bytes: &[u8]) -> DownloadOutcome {
        let size = bytes.len() as u64;

        if !safety::is_file_size_allowed(size, self.max_file_size) {
            eprintln!("⚠️  File size {} exceeds per-file cap for {}", size, url);
            return DownloadOutcome::Skipped;
        }

        if let Some(parent) = local_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("⚠️  Failed to create directory {:?}: {}", parent, e);
                return DownloadOutcome::Skipped;
            }
        }

        match self
            .run
            .try_commit_download(size, self.max_total_size, || fs::write(local_path, bytes))
        {
            DownloadCommit::Committed => DownloadOutcome::Fetched,
            DownloadCommit::QuotaExceeded => {
                eprintln!("⚠️  Run download quota reached, skipping {}", url);
                DownloadOutcome::Skipped
            }
            DownloadCommit::WriteFailed(e) => {
                eprintln!("⚠️  Failed to write {:?}: {}", local_path, e);
                // Never leave a partial file behind.
                let _ = fs::remove_file(local_path);
                DownloadOutcome::Skipped
            }
        }
    }
}
