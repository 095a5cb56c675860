pub mod cli;
pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod fetcher;
pub mod files;
pub mod path_mapper;
pub mod registry;
pub mod rewriter;
pub mod safety;
pub mod task;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use config::{MirrorConfig, RunRequest};
pub use coordinator::Frontier;
pub use downloader::{DownloadOutcome, ResourceDownloader};
pub use fetcher::{Fetched, ResourceFetcher};
pub use path_mapper::{MappedPath, PathMapper};
pub use registry::RunRegistry;
pub use rewriter::{PageRewriter, ResourceKind, ScannedResource};
pub use task::{MirrorRun, RunSnapshot, RunStatus};
