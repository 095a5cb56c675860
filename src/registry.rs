use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::{MirrorConfig, RunRequest};
use crate::coordinator;
use crate::downloader::url_domain;
use crate::safety;
use crate::task::{MirrorRun, RunSnapshot};

/// Substrings that suggest internal detail leaking through an error message.
const SENSITIVE_MARKERS: &[&str] = &["sql", "database", "password", "token", "secret", "credential"];

/// Replaces internal-looking error text with a generic phrase before it
/// reaches external callers.
pub fn sanitize_error_message(message: &str) -> String {
    let lower = message.to_lowercase();
    if SENSITIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        "An internal error occurred".to_string()
    } else {
        message.to_string()
    }
}

/// Thread-safe map of run id to run, owned by whichever component wires the
/// service together and passed explicitly to anything that needs it.
/// Submission inserts, the external cleanup scheduler evicts; workers hold
/// their own handle to the run, so eviction mid-flight is harmless.
pub struct RunRegistry {
    config: MirrorConfig,
    runs: Mutex<HashMap<Uuid, Arc<MirrorRun>>>,
}

impl RunRegistry {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Validates a submission, allocates the sandboxed output root, and
    /// starts the run asynchronously. Returns immediately with the run's
    /// current state; invalid submissions come back as already-failed runs
    /// that remain pollable.
    pub fn submit(&self, request: RunRequest) -> RunSnapshot {
        if let Err(message) = self.validate(&request) {
            return self.insert_failed(&request.url, &message);
        }

        // validate() checked the URL parses with a safe host.
        let domain = match url_domain(&request.url) {
            Some(domain) => domain,
            None => return self.insert_failed(&request.url, "Invalid source URL"),
        };

        let output_root = match safety::create_safe_output_root(
            &self.config.base_dir,
            &self.config.sub_dir,
            &domain,
        ) {
            Ok(root) => root,
            Err(e) => {
                return self.insert_failed(&request.url, &sanitize_error_message(&e.to_string()))
            }
        };

        let run = Arc::new(MirrorRun::new(&request.url, &output_root));
        self.runs.lock().unwrap().insert(run.id(), run.clone());

        let config = self.config.clone();
        let task_run = run.clone();
        tokio::spawn(async move {
            coordinator::execute_run(task_run, config, request).await;
        });

        run.snapshot()
    }

    fn validate(&self, request: &RunRequest) -> Result<(), String> {
        if !safety::is_url_safe(&request.url) {
            return Err(format!("Unsafe or invalid source URL: {}", request.url));
        }
        if !safety::is_parameter_in_range(request.worker_count, 1, self.config.max_workers) {
            return Err(format!(
                "Worker count {} outside [1, {}]",
                request.worker_count, self.config.max_workers
            ));
        }
        if !safety::is_parameter_in_range(request.retry_count, 0, self.config.max_retries) {
            return Err(format!(
                "Retry count {} outside [0, {}]",
                request.retry_count, self.config.max_retries
            ));
        }
        if !safety::is_parameter_in_range(
            request.delay_ms,
            self.config.min_delay_ms,
            self.config.max_delay_ms,
        ) {
            return Err(format!(
                "Delay {}ms outside [{}, {}]",
                request.delay_ms, self.config.min_delay_ms, self.config.max_delay_ms
            ));
        }
        Ok(())
    }

    fn insert_failed(&self, url: &str, message: &str) -> RunSnapshot {
        let run = Arc::new(MirrorRun::new(url, std::path::Path::new("")));
        run.set_failed(&sanitize_error_message(message));
        self.runs.lock().unwrap().insert(run.id(), run.clone());
        run.snapshot()
    }

    /// Current snapshot of one run, or `None` when the id is unknown or the
    /// run has been evicted.
    pub fn status(&self, id: Uuid) -> Option<RunSnapshot> {
        self.runs.lock().unwrap().get(&id).map(|run| run.snapshot())
    }

    /// Evicts runs created more than `max_age` ago; called by the external
    /// cleanup scheduler. Returns how many runs were removed.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|_, run| run.created_at() >= cutoff);
        before - runs.len()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}
