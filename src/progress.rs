use std::sync::Arc;

use crate::ingest::RefreshOutcome;

/// Events emitted during a sync run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The feed-refresh phase is starting
    RefreshPhaseStarting { feeds: usize },

    /// One feed finished refreshing
    FeedRefreshed {
        podname: String,
        outcome: RefreshOutcome,
    },

    /// All feeds are refreshed and the pending set has been read
    RefreshPhaseCompleted { pending: usize },

    /// A download is starting
    DownloadStarting {
        /// Identifies the download slot (0 to pool width - 1)
        download_id: usize,
        title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes queued for download
        total_to_download: usize,
        /// Remaining bytes according to the server, if known
        content_length: Option<u64>,
        /// Byte offset the transfer resumed at
        resumed_at: u64,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        download_id: usize,
        title: String,
        bytes_downloaded: u64,
    },

    /// A download failed or timed out
    DownloadFailed {
        download_id: usize,
        title: String,
        error: String,
    },

    /// Sync run completed
    SyncCompleted {
        downloaded: usize,
        already_complete: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
