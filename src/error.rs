use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the HTTP layer.
///
/// Timeouts are split out from other transport failures because the
/// download engine treats a timed-out transfer as still pending rather
/// than failed.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Transport(reqwest::Error),
}

impl HttpError {
    /// Classify a reqwest error, folding deadline overruns into `Timeout`
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("HTTP {status} while fetching feed from {url}")]
    FetchStatus { url: String, status: u16 },

    #[error("failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors raised by the episode store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open episode store {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("episode store operation failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open file {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while parsing a sed-style rewrite pattern
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("pattern must start with 's'")]
    NotSubstitution,

    #[error("pattern has no delimiter")]
    MissingDelimiter,

    #[error("pattern has an empty search expression")]
    MissingSearch,

    #[error("pattern has no closing delimiter")]
    MissingReplacement,

    #[error("invalid search expression: {0}")]
    BadRegex(#[from] regex::Error),
}

/// Errors raised while loading or generating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to create config directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write sample config {path}: {source}")]
    WriteSampleFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("podcast '{name}' is missing required field '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("podcast '{name}' has an invalid rewrite pattern '{pattern}': {source}")]
    InvalidPattern {
        name: String,
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("config file {path} only contains the bundled example; review and edit it first")]
    OnlyExample { path: PathBuf },
}

/// Errors reported by the feed probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP/{status} - failed to probe {url}")]
    FetchStatus { url: String, status: u16 },

    #[error("failed to probe {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("invalid feed: {url}")]
    InvalidFeed { url: String },
}
