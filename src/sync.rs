// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::episode::{DownloadContext, DownloadOutcome, download_episode};
use crate::error::StoreError;
use crate::http::HttpClient;
use crate::ingest::{RefreshOutcome, refresh_feed};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::Store;

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Worker pool width, shared by both phases
    pub concurrency: usize,
    /// Timeout for feed document requests
    pub feed_timeout: Duration,
    /// Stop after the refresh phase
    pub refresh_only: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            feed_timeout: Duration::from_secs(5),
            refresh_only: false,
        }
    }
}

/// Counters produced by a full sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Feeds whose episode lists were ingested
    pub feeds_refreshed: usize,
    /// Feeds skipped because they are disabled
    pub feeds_skipped: usize,
    /// Feeds that failed to fetch or parse
    pub feeds_failed: usize,
    /// Pending episodes found at the phase barrier (after the limit)
    pub pending: usize,
    /// Episodes downloaded this run
    pub downloaded: usize,
    /// Episodes whose on-disk file already had the expected size
    pub already_complete: usize,
    /// Episodes skipped (disabled, dry-run, or unconfigured podcast)
    pub skipped: usize,
    /// Episodes that failed (HTTP error or I/O error)
    pub failed: usize,
    /// Episodes whose transfer timed out and stays pending
    pub timed_out: usize,
}

/// Synchronize all configured podcasts.
///
/// Two sequential fan-out phases share one bounded slot pool: refresh
/// every feed, then — after all refresh tasks have joined and the
/// pending set has been read — download every pending episode. The slot
/// pool both limits concurrency and hands out stable lane ids for the
/// progress display; a slot is acquired before spawning, so tasks start
/// in order.
pub async fn run_sync<C: HttpClient + Clone + 'static>(
    client: &C,
    config: &Config,
    store: &Store,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
) -> Result<SyncSummary, StoreError> {
    let mut summary = SyncSummary::default();
    let width = options.concurrency.max(1);

    let (slot_tx, slot_rx) = tokio::sync::mpsc::channel(width);
    for slot in 0..width {
        slot_tx.send(slot).await.unwrap();
    }
    let slot_rx = Arc::new(Mutex::new(slot_rx));

    // phase one: refresh every configured feed
    reporter.report(ProgressEvent::RefreshPhaseStarting {
        feeds: config.podcasts.len(),
    });
    info!(
        feeds = config.podcasts.len(),
        workers = width,
        "refreshing feeds"
    );

    let mut refresh_handles = Vec::new();
    for (podname, podcast) in config.podcasts.clone() {
        let slot = slot_rx.lock().await.recv().await.unwrap();

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let store = store.clone();
        let reporter = reporter.clone();
        let timeout = options.feed_timeout;

        refresh_handles.push(tokio::spawn(async move {
            let result = refresh_feed(&podname, &podcast, &client, &store, timeout).await;
            let _ = slot_tx.send(slot).await;

            match result {
                Ok(outcome) => {
                    reporter.report(ProgressEvent::FeedRefreshed {
                        podname,
                        outcome: outcome.clone(),
                    });
                    Some(outcome)
                }
                Err(err) => {
                    error!(%podname, error = %err, "episode store rejected feed refresh");
                    None
                }
            }
        }));
    }

    for handle in refresh_handles {
        match handle.await {
            Ok(Some(RefreshOutcome::Ingested(_))) => summary.feeds_refreshed += 1,
            Ok(Some(RefreshOutcome::SkipDisabled)) => summary.feeds_skipped += 1,
            Ok(Some(_)) | Ok(None) | Err(_) => summary.feeds_failed += 1,
        }
    }

    // barrier: every refresh has committed before the pending set is read
    let mut pending = store.fetch_pending()?;
    if config.download_limit > 0 {
        pending.truncate(config.download_limit);
    }
    summary.pending = pending.len();
    reporter.report(ProgressEvent::RefreshPhaseCompleted {
        pending: pending.len(),
    });

    if options.refresh_only {
        info!(pending = pending.len(), "refresh-only run, skipping downloads");
        return Ok(summary);
    }

    // phase two: download the pending set
    info!(episodes = pending.len(), workers = width, "downloading episodes");

    let total_to_download = pending.len();
    let mut download_handles = Vec::new();

    for (episode_index, row) in pending.into_iter().enumerate() {
        let Some(podcast) = config.podcast(&row.podname).cloned() else {
            // rows from podcasts that have since left the config stay pending
            debug!(podname = %row.podname, url = %row.url, "no config section for pending episode");
            summary.skipped += 1;
            continue;
        };

        let download_id = slot_rx.lock().await.recv().await.unwrap();

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let store = store.clone();
        let reporter = reporter.clone();

        download_handles.push(tokio::spawn(async move {
            let context = DownloadContext {
                download_id,
                episode_index,
                total_to_download,
            };

            let result =
                download_episode(&client, &podcast, &row, &store, &context, &reporter).await;
            let _ = slot_tx.send(download_id).await;

            match result {
                Ok(outcome) => {
                    match &outcome {
                        DownloadOutcome::HttpFailed(status) => {
                            reporter.report(ProgressEvent::DownloadFailed {
                                download_id,
                                title: row.title.clone(),
                                error: format!("HTTP/{status}"),
                            });
                        }
                        DownloadOutcome::TimedOut => {
                            reporter.report(ProgressEvent::DownloadFailed {
                                download_id,
                                title: row.title.clone(),
                                error: "request timed out".to_string(),
                            });
                        }
                        _ => {}
                    }
                    Some(outcome)
                }
                Err(err) => {
                    error!(url = %row.url, error = %err, "download failed");
                    reporter.report(ProgressEvent::DownloadFailed {
                        download_id,
                        title: row.title.clone(),
                        error: err.to_string(),
                    });
                    None
                }
            }
        }));
    }

    for handle in download_handles {
        match handle.await {
            Ok(Some(DownloadOutcome::Done)) => summary.downloaded += 1,
            Ok(Some(DownloadOutcome::AlreadyComplete)) => summary.already_complete += 1,
            Ok(Some(DownloadOutcome::SkipDisabled | DownloadOutcome::DryRun)) => {
                summary.skipped += 1
            }
            Ok(Some(DownloadOutcome::TimedOut)) => summary.timed_out += 1,
            Ok(Some(DownloadOutcome::HttpFailed(_))) | Ok(None) | Err(_) => summary.failed += 1,
        }
    }

    reporter.report(ProgressEvent::SyncCompleted {
        downloaded: summary.downloaded,
        already_complete: summary.already_complete,
        skipped: summary.skipped,
        failed: summary.failed + summary.timed_out,
    });

    Ok(summary)
}
