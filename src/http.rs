// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::HttpError;

/// Read timeout applied to media transfers. Distinct from the
/// configurable feed/probe timeout: it bounds each read, not the whole
/// transfer, so large downloads are not killed mid-flight.
pub const MEDIA_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

/// Response to a whole-document fetch (feed documents are small)
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Entire response body
    pub body: Bytes,
}

/// Streaming response for media downloads
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present. For a ranged request
    /// this is the remaining byte count, not the full file size.
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Result of following a URL through its redirect chain
pub struct ResolvedUrl {
    /// HTTP status code of the final response
    pub status: u16,
    /// URL the request ended up at after redirects
    pub final_url: String,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch an entire response body, bounded by a whole-request timeout
    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<FetchResponse, HttpError>;

    /// Open a streaming GET with a `Range: bytes=<resume_from>-` header
    async fn get_stream(&self, url: &str, resume_from: u64) -> Result<HttpResponse, HttpError>;

    /// Issue a GET and report the post-redirect URL without reading the body
    async fn resolve(&self, url: &str, timeout: Duration) -> Result<ResolvedUrl, HttpError>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with the media read timeout applied
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .read_timeout(MEDIA_READ_TIMEOUT)
            .build()
            .map_err(HttpError::from_reqwest)?;
        Ok(Self { client })
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<FetchResponse, HttpError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(HttpError::from_reqwest)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(HttpError::from_reqwest)?;

        Ok(FetchResponse { status, body })
    }

    async fn get_stream(&self, url: &str, resume_from: u64) -> Result<HttpResponse, HttpError> {
        use futures::StreamExt;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes={resume_from}-"))
            .send()
            .await
            .map_err(HttpError::from_reqwest)?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|result| result.map_err(HttpError::from_reqwest)),
        );

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }

    async fn resolve(&self, url: &str, timeout: Duration) -> Result<ResolvedUrl, HttpError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(HttpError::from_reqwest)?;

        Ok(ResolvedUrl {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
        })
    }
}
