use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operator-level configuration for the mirroring service. Callers of
/// `RunRegistry::submit` supply per-run knobs; everything here bounds or
/// defaults them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory under which every run's output root is allocated.
    pub base_dir: PathBuf,
    /// Subdirectory of `base_dir` holding per-domain output roots.
    pub sub_dir: String,
    /// Per-file download cap in bytes.
    pub max_file_size: u64,
    /// Cumulative per-run download cap in bytes.
    pub max_total_size: u64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound on caller-supplied worker counts.
    pub max_workers: u64,
    /// Upper bound on caller-supplied retry counts.
    pub max_retries: u64,
    /// Bounds on the caller-supplied politeness delay, in milliseconds.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Runs older than this many seconds are eligible for eviction.
    pub max_run_age_secs: u64,
    /// User agent presented to target sites.
    pub user_agent: String,
    /// External domains whose resources may be mirrored locally too.
    pub external_domain_allowlist: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("site-mirror"),
            sub_dir: "sites".to_string(),
            max_file_size: 50 * 1024 * 1024,
            max_total_size: 1024 * 1024 * 1024,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_workers: 20,
            max_retries: 10,
            min_delay_ms: 100,
            max_delay_ms: 10_000,
            max_run_age_secs: 24 * 60 * 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            external_domain_allowlist: Vec::new(),
        }
    }
}

/// Caller-supplied parameters for one mirroring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub url: String,
    pub worker_count: u64,
    pub retry_count: u64,
    pub delay_ms: u64,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            worker_count: 5,
            retry_count: 3,
            delay_ms: 1000,
        }
    }
}
