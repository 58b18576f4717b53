pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod ingest;
pub mod probe;
pub mod progress;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use config::{Config, PodcastConfig, RewritePattern, ensure_config_dir};
pub use episode::{DownloadOutcome, download_episode};
pub use error::{
    ConfigError, DownloadError, FeedError, HttpError, PatternError, ProbeError, StoreError,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use ingest::{RefreshOutcome, refresh_feed};
pub use probe::probe_feed;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{DownloadStatus, EpisodeRecord, EpisodeRow, Store};
pub use sync::{SyncOptions, SyncSummary, run_sync};
