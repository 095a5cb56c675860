use clap::Parser;
use std::path::PathBuf;

use crate::config::{MirrorConfig, RunRequest};

#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    about = "Mirror a website into a sandboxed local directory",
    version,
    long_about = "Crawls same-domain pages starting from a URL, downloads the resources they \
                  reference under strict size quotas, and rewrites every reference to a \
                  relative local path so the mirror browses offline."
)]
pub struct MirrorCommand {
    /// The URL of the website to mirror
    #[arg(required = true)]
    pub url: String,

    /// Base directory for mirrored output (one subdirectory per domain)
    #[arg(short, long, default_value = "./mirrored_sites")]
    pub output_dir: PathBuf,

    /// Number of concurrent workers
    #[arg(short = 'w', long, default_value = "5")]
    pub workers: u64,

    /// Retry count for failed fetches
    #[arg(short = 'r', long, default_value = "3")]
    pub retries: u64,

    /// Politeness delay between requests in milliseconds
    #[arg(long, default_value = "1000")]
    pub delay_ms: u64,

    /// Per-file download cap in bytes
    #[arg(long, default_value = "52428800")]
    pub max_file_size: u64,

    /// Cumulative download cap for the whole run in bytes
    #[arg(long, default_value = "1073741824")]
    pub max_total_size: u64,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// External domains whose resources may also be mirrored (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub allow_external: Option<Vec<String>>,
}

impl MirrorCommand {
    pub fn to_config(&self) -> MirrorConfig {
        MirrorConfig {
            base_dir: self.output_dir.clone(),
            max_file_size: self.max_file_size,
            max_total_size: self.max_total_size,
            timeout_secs: self.timeout,
            external_domain_allowlist: self.allow_external.clone().unwrap_or_default(),
            ..MirrorConfig::default()
        }
    }

    pub fn to_request(&self) -> RunRequest {
        RunRequest {
            url: self.url.clone(),
            worker_count: self.workers,
            retry_count: self.retries,
            delay_ms: self.delay_ms,
        }
    }
}
