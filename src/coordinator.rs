use colored::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{MirrorConfig, RunRequest};
use crate::downloader::{url_domain, DownloadOutcome, ResourceDownloader};
use crate::fetcher::ResourceFetcher;
use crate::path_mapper::PathMapper;
use crate::rewriter::{PageRewriter, ResourceKind};
use crate::task::MirrorRun;

/// How long an idle worker waits before re-checking the queue.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Conventional subfolders created up front in every output root.
const CONVENTIONAL_DIRS: &[&str] = &["images", "css", "js", "fonts", "media", "data"];

/// Deduplicated queue of not-yet-visited page URLs for one run. Completion
/// requires the queue to be empty AND no worker mid-flight: an empty queue
/// snapshot alone races with a worker about to enqueue more.
pub struct Frontier {
    queue: Mutex<VecDeque<String>>,
    seen: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            seen: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Enqueues a URL unless it was already seen this run.
    pub fn enqueue(&self, url: &str) -> bool {
        let mut seen = self.seen.lock().unwrap();
        if !seen.insert(url.to_string()) {
            return false;
        }
        self.queue.lock().unwrap().push_back(url.to_string());
        true
    }

    /// Pops the next URL, marking it in-flight until `task_done`.
    pub fn next(&self) -> Option<String> {
        let mut queue = self.queue.lock().unwrap();
        let url = queue.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(url)
    }

    pub fn task_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_drained(&self) -> bool {
        self.queue.lock().unwrap().is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared per-run state handed to every worker.
struct WorkerContext {
    run: Arc<MirrorRun>,
    frontier: Frontier,
    mapper: Mutex<PathMapper>,
    downloader: ResourceDownloader,
    rewriter: PageRewriter,
    fetcher: ResourceFetcher,
    delay: Duration,
}

/// Drives one mirroring run: seeds the frontier, dispatches the bounded
/// worker pool, and finalizes the run's status when the frontier drains.
pub async fn execute_run(run: Arc<MirrorRun>, config: MirrorConfig, request: RunRequest) {
    let context = match setup(&run, &config, &request) {
        Ok(context) => Arc::new(context),
        Err(e) => {
            run.set_failed(&e.to_string());
            eprintln!("❌ Run setup failed for {}: {}", run.url(), e);
            return;
        }
    };

    context.frontier.enqueue(run.url());
    run.set_running();
    println!(
        "🚀 Mirroring {} into {:?}",
        run.url().blue(),
        run.output_dir()
    );

    let worker_count = request.worker_count.clamp(1, config.max_workers) as usize;
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let context = context.clone();
        workers.push(tokio::spawn(async move {
            worker_loop(&context).await;
        }));
    }

    let results = futures::future::join_all(workers).await;
    let failed = results.iter().any(|result| result.is_err());

    if failed {
        // Generic message only; internal panic text never reaches callers.
        run.set_failed("An internal error occurred while mirroring");
    } else {
        run.set_completed();
        let snapshot = run.snapshot();
        println!(
            "✅ Completed {}: {} pages, {} files, {} bytes",
            run.url().blue(),
            snapshot.pages_crawled,
            snapshot.files_downloaded,
            snapshot.total_bytes_downloaded
        );
    }
}

fn setup(
    run: &Arc<MirrorRun>,
    config: &MirrorConfig,
    request: &RunRequest,
) -> anyhow::Result<WorkerContext> {
    let domain = url_domain(run.url())
        .ok_or_else(|| anyhow::anyhow!("Seed URL has no host: {}", run.url()))?;

    fs::create_dir_all(run.output_dir())?;
    for dir in CONVENTIONAL_DIRS {
        fs::create_dir_all(run.output_dir().join(dir))?;
    }

    let fetcher = ResourceFetcher::new(config, request.retry_count, request.delay_ms)?;
    let downloader =
        ResourceDownloader::new(fetcher.clone(), run.clone(), &domain, config);
    let rewriter = PageRewriter::new(&domain)?;
    let mapper = Mutex::new(PathMapper::new(run.output_dir()));

    Ok(WorkerContext {
        run: run.clone(),
        frontier: Frontier::new(),
        mapper,
        downloader,
        rewriter,
        fetcher,
        delay: Duration::from_millis(request.delay_ms),
    })
}

async fn worker_loop(context: &WorkerContext) {
    loop {
        let url = match context.frontier.next() {
            Some(url) => url,
            None => {
                if context.frontier.is_drained() {
                    break;
                }
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
        };

        if let Err(e) = process_page(context, &url).await {
            eprintln!("⚠️  Failed to process {}: {}", url, e);
        }
        context.frontier.task_done();

        tokio::time::sleep(context.delay).await;
    }
}

/// Per-page pipeline: fetch, scan, materialize every same-domain resource,
/// rewrite references to relative local paths, save, and feed newly
/// discovered links back to the frontier. Nothing here is fatal to the run.
async fn process_page(context: &WorkerContext, url: &str) -> anyhow::Result<()> {
    let fetched = match context.fetcher.fetch(url).await {
        Ok(fetched) => fetched,
        Err(e) => {
            eprintln!("⚠️  Failed to fetch page {}: {}", url, e);
            return Ok(());
        }
    };
    if !fetched.is_success() {
        eprintln!("⚠️  HTTP {} for page {}", fetched.status, url);
        return Ok(());
    }

    let page_mapping = {
        let mut mapper = context.mapper.lock().unwrap();
        mapper.map_url(url)?
    };

    let is_html = fetched.content_type.contains("text/html")
        || fetched.bytes.starts_with(b"<!DOCTYPE")
        || fetched.bytes.starts_with(b"<html");
    if !is_html {
        // A frontier URL that turned out to be a plain resource.
        context
            .downloader
            .persist(url, &page_mapping.local_path, &fetched.bytes);
        return Ok(());
    }

    let html = String::from_utf8_lossy(&fetched.bytes).into_owned();
    println!("📥 Processing page: {}", url);

    let resources = context.rewriter.scan_resources(&html, url);
    let mut resolved = HashMap::new();

    for resource in &resources {
        let mapped = {
            let mut mapper = context.mapper.lock().unwrap();
            match mapper.map_url(&resource.absolute) {
                Ok(mapped) => mapped,
                Err(e) => {
                    eprintln!("⚠️  Failed to map {}: {}", resource.absolute, e);
                    continue;
                }
            }
        };
        if mapped.relocated {
            println!(
                "🔒 Relocated unsafe resource {} -> {}",
                resource.absolute, mapped.relative_path
            );
        }

        let outcome = context
            .downloader
            .download(&resource.absolute, &mapped.local_path)
            .await;
        if !outcome.is_success() {
            continue;
        }

        let relative =
            PathMapper::relative_path_between(&page_mapping.local_path, &mapped.local_path);
        resolved.insert(resource.original.clone(), relative);

        // Recursive content rewriting runs once, for the worker that
        // actually fetched the file; re-downloads report AlreadyExists.
        if outcome == DownloadOutcome::Fetched {
            let result = match resource.kind {
                ResourceKind::Stylesheet => {
                    context
                        .rewriter
                        .process_stylesheet(
                            &mapped.local_path,
                            &resource.absolute,
                            &context.mapper,
                            &context.downloader,
                        )
                        .await
                }
                ResourceKind::Script => {
                    context
                        .rewriter
                        .process_script(
                            &mapped.local_path,
                            &context.mapper,
                            &context.downloader,
                        )
                        .await
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                eprintln!("⚠️  Post-processing failed for {}: {}", resource.absolute, e);
            }
        }
    }

    let rewritten = context.rewriter.rewrite_page(&html, &resolved);
    context
        .downloader
        .persist(url, &page_mapping.local_path, rewritten.as_bytes());
    context.run.increment_pages_crawled();

    for link in context.rewriter.extract_page_links(&html) {
        context.frontier.enqueue(&link);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontier_dedupes() {
        let frontier = Frontier::new();
        assert!(frontier.enqueue("https://example.com/a"));
        assert!(!frontier.enqueue("https://example.com/a"));
        assert!(frontier.enqueue("https://example.com/b"));

        assert_eq!(frontier.next().as_deref(), Some("https://example.com/a"));
        assert_eq!(frontier.next().as_deref(), Some("https://example.com/b"));
        assert!(frontier.next().is_none());
    }

    #[test]
    fn test_frontier_not_drained_while_in_flight() {
        let frontier = Frontier::new();
        frontier.enqueue("https://example.com/");

        let url = frontier.next().unwrap();
        assert!(!frontier.is_drained(), "worker still holds {}", url);

        // The in-flight worker discovers another page before finishing.
        frontier.enqueue("https://example.com/about");
        frontier.task_done();
        assert!(!frontier.is_drained());

        frontier.next().unwrap();
        frontier.task_done();
        assert!(frontier.is_drained());
    }

    #[test]
    fn test_frontier_seen_survives_pop() {
        let frontier = Frontier::new();
        frontier.enqueue("https://example.com/a");
        frontier.next();
        frontier.task_done();

        // Re-discovering a processed page must not re-enqueue it.
        assert!(!frontier.enqueue("https://example.com/a"));
        assert!(frontier.is_drained());
    }
}
