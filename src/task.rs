use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::safety;

/// Lifecycle of one mirroring run: PENDING -> RUNNING -> {COMPLETED | FAILED}.
/// Terminal states absorb all further transition attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Outcome of a quota-checked download commit.
#[derive(Debug)]
pub enum DownloadCommit {
    Committed,
    QuotaExceeded,
    WriteFailed(std::io::Error),
}

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    updated_at: DateTime<Utc>,
    error_message: Option<String>,
    pages_crawled: u64,
    files_downloaded: u64,
    total_bytes_downloaded: u64,
}

/// One end-to-end mirroring task. All mutable state lives behind a single
/// lock; workers go through the synchronized methods and never touch fields
/// directly.
#[derive(Debug)]
pub struct MirrorRun {
    id: Uuid,
    url: String,
    output_dir: PathBuf,
    created_at: DateTime<Utc>,
    state: Mutex<RunState>,
}

impl MirrorRun {
    pub fn new(url: &str, output_dir: &Path) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            output_dir: output_dir.to_path_buf(),
            created_at: now,
            state: Mutex::new(RunState {
                status: RunStatus::Pending,
                updated_at: now,
                error_message: None,
                pages_crawled: 0,
                files_downloaded: 0,
                total_bytes_downloaded: 0,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> RunStatus {
        self.state.lock().unwrap().status
    }

    pub fn set_running(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = RunStatus::Running;
        state.updated_at = Utc::now();
    }

    pub fn set_completed(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = RunStatus::Completed;
        state.updated_at = Utc::now();
    }

    pub fn set_failed(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = RunStatus::Failed;
        state.error_message = Some(message.to_string());
        state.updated_at = Utc::now();
    }

    pub fn increment_pages_crawled(&self) {
        let mut state = self.state.lock().unwrap();
        state.pages_crawled += 1;
        state.updated_at = Utc::now();
    }

    pub fn total_bytes_downloaded(&self) -> u64 {
        self.state.lock().unwrap().total_bytes_downloaded
    }

    /// Quota check and counter update share one critical section with the
    /// write itself: the total-bytes counter can never pass `max_total_size`,
    /// and a failed write never leaves counters incremented.
    pub fn try_commit_download<F>(&self, size: u64, max_total_size: u64, write: F) -> DownloadCommit
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        let mut state = self.state.lock().unwrap();
        if !safety::is_total_size_allowed(state.total_bytes_downloaded, size, max_total_size) {
            return DownloadCommit::QuotaExceeded;
        }
        match write() {
            Ok(()) => {
                state.files_downloaded += 1;
                state.total_bytes_downloaded += size;
                state.updated_at = Utc::now();
                DownloadCommit::Committed
            }
            Err(e) => DownloadCommit::WriteFailed(e),
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.state.lock().unwrap();
        RunSnapshot {
            id: self.id,
            url: self.url.clone(),
            output_dir: self.output_dir.clone(),
            status: state.status,
            created_at: self.created_at,
            updated_at: state.updated_at,
            error_message: state.error_message.clone(),
            pages_crawled: state.pages_crawled,
            files_downloaded: state.files_downloaded,
            total_bytes_downloaded: state.total_bytes_downloaded,
        }
    }
}

/// Point-in-time view of a run, returned from the polling interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub url: String,
    pub output_dir: PathBuf,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub pages_crawled: u64,
    pub files_downloaded: u64,
    pub total_bytes_downloaded: u64,
}
