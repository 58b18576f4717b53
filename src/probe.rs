use std::time::Duration;

use tracing::debug;

use crate::config::RewritePattern;
use crate::error::{FeedError, ProbeError};
use crate::feed::{fetch_feed_bytes, parse_feed};
use crate::http::HttpClient;

/// Probe one ad hoc feed: resolve every enclosure URL through its
/// redirect chain and print the results, optionally previewing a rewrite
/// pattern against each URL.
///
/// Read-only: the store is never touched, so Ctrl-C simply ends the loop
/// between items.
pub async fn probe_feed<C: HttpClient>(
    client: &C,
    url: &str,
    timeout: Duration,
    pattern: Option<&RewritePattern>,
) -> Result<(), ProbeError> {
    let bytes = match fetch_feed_bytes(client, url, timeout).await {
        Ok(bytes) => bytes,
        Err(FeedError::FetchStatus { status, .. }) => {
            return Err(ProbeError::FetchStatus {
                url: url.to_string(),
                status,
            });
        }
        Err(FeedError::FetchFailed { source, .. }) => {
            return Err(ProbeError::FetchFailed {
                url: url.to_string(),
                source,
            });
        }
        Err(_) => {
            return Err(ProbeError::InvalidFeed {
                url: url.to_string(),
            });
        }
    };

    let items = parse_feed(&bytes).map_err(|_| ProbeError::InvalidFeed {
        url: url.to_string(),
    })?;
    debug!(url, items = items.len(), "probing enclosure URLs");

    for item in items {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("probe interrupted");
                return Ok(());
            }
            resolved = client.resolve(&item.enclosure_url, timeout) => {
                if let Some(pattern) = pattern {
                    println!("{}", pattern.apply(&item.enclosure_url));
                }
                match resolved {
                    Ok(resolved) if (200..300).contains(&resolved.status) => {
                        println!("{}", item.enclosure_url);
                        println!("{}", resolved.final_url);
                    }
                    Ok(resolved) => {
                        println!("HTTP/{} - {}", resolved.status, item.enclosure_url);
                    }
                    Err(err) => {
                        println!("{err} - {}", item.enclosure_url);
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}
