use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::PodcastConfig;
use crate::error::{FeedError, StoreError};
use crate::feed::{fetch_feed_bytes, parse_duration, parse_feed, pub_time_or_now};
use crate::http::HttpClient;
use crate::store::{EpisodeRecord, Store};

/// Outcome of refreshing one configured feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Podcast is disabled; no network call was made
    SkipDisabled,
    /// Connection-level failure; skipped this cycle
    NetworkFailed,
    /// The server answered with a non-success status
    HttpFailed(u16),
    /// The payload was not a well-formed feed
    ParseFailed,
    /// The feed was ingested; carries the number of items seen
    Ingested(usize),
}

/// Refresh one podcast's episode list into the store.
///
/// This is the unit of work for the refresh worker pool: idempotent on
/// re-invocation (the store skips known URLs) and never fatal to sibling
/// feeds — every remote failure folds into an outcome.
pub async fn refresh_feed<C: HttpClient>(
    podname: &str,
    podcast: &PodcastConfig,
    client: &C,
    store: &Store,
    timeout: Duration,
) -> Result<RefreshOutcome, StoreError> {
    if !podcast.enabled {
        debug!(podname, "feed not enabled");
        return Ok(RefreshOutcome::SkipDisabled);
    }

    let bytes = match fetch_feed_bytes(client, &podcast.url, timeout).await {
        Ok(bytes) => bytes,
        Err(FeedError::FetchStatus { status, url }) => {
            debug!(podname, status, %url, "HTTP failure while fetching feed");
            return Ok(RefreshOutcome::HttpFailed(status));
        }
        Err(err) => {
            warn!(podname, error = %err, "network failure while fetching feed");
            return Ok(RefreshOutcome::NetworkFailed);
        }
    };

    let items = match parse_feed(&bytes) {
        Ok(items) => items,
        Err(err) => {
            warn!(podname, error = %err, "couldn't parse podcast feed");
            return Ok(RefreshOutcome::ParseFailed);
        }
    };

    info!(podname, items = items.len(), "feed refreshed");

    let now = Utc::now();
    let records: Vec<EpisodeRecord> = items
        .iter()
        .map(|item| EpisodeRecord {
            podname: podname.to_string(),
            url: item.enclosure_url.clone(),
            title: item.title.clone(),
            filesize: item.enclosure_length,
            pub_time: pub_time_or_now(podname, item.pub_date.as_deref()),
            duration: parse_duration(item.duration.as_deref()),
            add_time: now,
        })
        .collect();

    store.insert_if_absent(&records)?;
    Ok(RefreshOutcome::Ingested(records.len()))
}
