use futures::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::PodcastConfig;
use crate::episode::filename::destination;
use crate::error::{DownloadError, HttpError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{DownloadStatus, EpisodeRow, Store};

/// Outcome of one download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The owning podcast is disabled; nothing was touched
    SkipDisabled,
    /// Dry-run podcast; the destination was computed but no I/O happened
    DryRun,
    /// The destination file already has the expected size
    AlreadyComplete,
    /// Transfer finished and the row was marked complete
    Done,
    /// The request timed out; the row stays pending for the next run
    TimedOut,
    /// The server answered with a non-success status; the row was marked failed
    HttpFailed(u16),
}

/// Lane bookkeeping for concurrent downloads
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Slot ID (0 to pool width - 1) for progress bar management
    pub download_id: usize,
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes queued for download
    pub total_to_download: usize,
}

/// Download one pending episode to its computed destination.
///
/// Resumes byte-exact from whatever is already on disk via an HTTP range
/// request, appending to the existing file. The store is only written at
/// terminal outcomes; a timeout leaves the row pending.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    podcast: &PodcastConfig,
    row: &EpisodeRow,
    store: &Store,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    if !podcast.enabled {
        debug!(podname = %row.podname, "feed not enabled");
        return Ok(DownloadOutcome::SkipDisabled);
    }

    let dest = destination(&row.podname, podcast, &row.url);
    debug!(podname = %row.podname, file = %dest.file.display(), "download target");

    if podcast.dry_run {
        return Ok(DownloadOutcome::DryRun);
    }

    // workers sharing a podcast race on this; losing the race is fine
    if let Err(err) = fs::create_dir_all(&dest.dir).await
        && !dest.dir.is_dir()
    {
        return Err(DownloadError::CreateDirFailed {
            path: dest.dir.clone(),
            source: err,
        });
    }

    let existing_len = match fs::metadata(&dest.file).await {
        Ok(meta) => Some(meta.len()),
        Err(_) => None,
    };

    if let Some(len) = existing_len
        && len == row.filesize
    {
        debug!(file = %dest.file.display(), "download complete");
        store.update_status(&row.podname, &row.url, DownloadStatus::Complete)?;
        return Ok(DownloadOutcome::AlreadyComplete);
    }

    let resume_from = existing_len.unwrap_or(0);

    let response = match client.get_stream(&row.url, resume_from).await {
        Ok(response) => response,
        Err(HttpError::Timeout) => {
            warn!(url = %row.url, "download request timed out");
            return Ok(DownloadOutcome::TimedOut);
        }
        Err(source) => {
            return Err(DownloadError::HttpFailed {
                url: row.url.clone(),
                source,
            });
        }
    };

    if !(200..300).contains(&response.status) {
        store.update_status(&row.podname, &row.url, DownloadStatus::Failed)?;
        return Ok(DownloadOutcome::HttpFailed(response.status));
    }

    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        title: row.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length: response.content_length,
        resumed_at: resume_from,
    });

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&dest.file)
        .await
        .map_err(|e| DownloadError::FileOpenFailed {
            path: dest.file.clone(),
            source: e,
        })?;

    let total_bytes = response.content_length.map(|len| len + resume_from);
    let mut bytes_on_disk = resume_from;
    let mut stream = response.body;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(HttpError::Timeout) => {
                warn!(url = %row.url, "download timed out mid-stream");
                return Ok(DownloadOutcome::TimedOut);
            }
            Err(source) => {
                return Err(DownloadError::StreamFailed {
                    url: row.url.clone(),
                    source,
                });
            }
        };

        if chunk.is_empty() {
            continue;
        }

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: dest.file.clone(),
                source: e,
            })?;
        bytes_on_disk += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: context.download_id,
            title: row.title.clone(),
            bytes_downloaded: bytes_on_disk,
            total_bytes,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: dest.file.clone(),
            source: e,
        })?;

    store.update_status(&row.podname, &row.url, DownloadStatus::Complete)?;

    reporter.report(ProgressEvent::DownloadCompleted {
        download_id: context.download_id,
        title: row.title.clone(),
        bytes_downloaded: bytes_on_disk,
    });

    Ok(DownloadOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, FetchResponse, HttpResponse, ResolvedUrl};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    struct MockHttpClient {
        status: u16,
        payload: Vec<u8>,
        timeout: bool,
        requests: AtomicUsize,
        last_resume_from: AtomicU64,
    }

    impl MockHttpClient {
        fn serving(status: u16, payload: &[u8]) -> Self {
            Self {
                status,
                payload: payload.to_vec(),
                timeout: false,
                requests: AtomicUsize::new(0),
                last_resume_from: AtomicU64::new(0),
            }
        }

        fn timing_out() -> Self {
            Self {
                timeout: true,
                ..Self::serving(200, b"")
            }
        }

        fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> Result<FetchResponse, HttpError> {
            unimplemented!("downloads never fetch whole documents")
        }

        async fn get_stream(
            &self,
            _url: &str,
            resume_from: u64,
        ) -> Result<HttpResponse, HttpError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.last_resume_from.store(resume_from, Ordering::SeqCst);

            if self.timeout {
                return Err(HttpError::Timeout);
            }

            // serve the remainder, like a server honoring the range header
            let data: Vec<u8> = self
                .payload
                .iter()
                .skip(resume_from as usize)
                .copied()
                .collect();
            let len = data.len() as u64;
            let stream: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status: self.status,
                content_length: Some(len),
                body: stream,
            })
        }

        async fn resolve(&self, _url: &str, _timeout: Duration) -> Result<ResolvedUrl, HttpError> {
            unimplemented!("downloads never resolve")
        }
    }

    fn podcast(destdir: &Path) -> PodcastConfig {
        PodcastConfig {
            url: "https://example.com/feed.rss".to_string(),
            enabled: true,
            dry_run: false,
            destdir: destdir.to_string_lossy().into_owned(),
            transform: None,
        }
    }

    fn pending_row(store: &Store, url: &str, filesize: u64) -> EpisodeRow {
        store
            .insert_if_absent(&[crate::store::EpisodeRecord {
                podname: "pod".to_string(),
                url: url.to_string(),
                title: "Test Episode".to_string(),
                filesize,
                pub_time: Utc::now(),
                duration: 0,
                add_time: Utc::now(),
            }])
            .unwrap();
        store
            .fetch_pending()
            .unwrap()
            .into_iter()
            .find(|row| row.url == url)
            .unwrap()
    }

    fn context() -> DownloadContext {
        DownloadContext {
            download_id: 0,
            episode_index: 0,
            total_to_download: 1,
        }
    }

    fn open_store(dir: &Path) -> Store {
        let store = Store::open(&dir.join("test.sqlite")).unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[tokio::test]
    async fn disabled_podcast_is_skipped_without_io() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(200, b"0123456789");
        let podcast = PodcastConfig {
            enabled: false,
            ..podcast(&dir.path().join("out"))
        };

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::SkipDisabled);
        assert_eq!(client.request_count(), 0);
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn dry_run_performs_no_io() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(200, b"0123456789");
        let podcast = PodcastConfig {
            dry_run: true,
            ..podcast(&dir.path().join("out"))
        };

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::DryRun);
        assert_eq!(client.request_count(), 0);
        assert!(!dir.path().join("out").exists());
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Pending)
        );
    }

    #[tokio::test]
    async fn fresh_download_writes_file_and_marks_complete() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(200, b"0123456789");
        let podcast = podcast(&dir.path().join("out"));

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::Done);
        assert_eq!(client.last_resume_from.load(Ordering::SeqCst), 0);
        let written = std::fs::read(dir.path().join("out/ep.mp3")).unwrap();
        assert_eq!(written, b"0123456789");
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Complete)
        );
    }

    #[tokio::test]
    async fn partial_file_resumes_from_its_length() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(206, b"0123456789");
        let podcast = podcast(&dir.path().join("out"));

        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/ep.mp3"), b"0123").unwrap();

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::Done);
        assert_eq!(client.last_resume_from.load(Ordering::SeqCst), 4);
        let written = std::fs::read(dir.path().join("out/ep.mp3")).unwrap();
        assert_eq!(written, b"0123456789");
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Complete)
        );
    }

    #[tokio::test]
    async fn size_match_short_circuits_without_any_request() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(200, b"0123456789");
        let podcast = podcast(&dir.path().join("out"));

        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/ep.mp3"), b"0123456789").unwrap();

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::AlreadyComplete);
        assert_eq!(client.request_count(), 0);
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Complete)
        );
    }

    #[tokio::test]
    async fn http_failure_marks_the_row_failed() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::serving(404, b"Not Found");
        let podcast = podcast(&dir.path().join("out"));

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::HttpFailed(404));
        // nothing is written on a failed response
        assert!(!dir.path().join("out/ep.mp3").exists());
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Failed)
        );
    }

    #[tokio::test]
    async fn timeout_leaves_the_row_pending() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let row = pending_row(&store, "https://example.com/ep.mp3", 10);
        let client = MockHttpClient::timing_out();
        let podcast = podcast(&dir.path().join("out"));

        let outcome = download_episode(
            &client,
            &podcast,
            &row,
            &store,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::TimedOut);
        assert_eq!(
            store.status_of(&row.url).unwrap(),
            Some(DownloadStatus::Pending)
        );
    }
}
