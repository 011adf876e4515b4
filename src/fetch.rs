//! Caption document retrieval
//!
//! The document grows while it is being extracted, and its byte length is
//! the only staleness signal: responses are never cached, and a response is
//! only parsed when it is longer than anything seen before in the current
//! extraction epoch.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cue::CueSet;
use crate::parser;

/// Why a fetch produced no document. Every variant means "not ready yet".
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document not available (status {0})")]
    Status(u16),

    #[error("Invalid source URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere a caption document can be read from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the whole document as it currently stands.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP(S) source with caching disabled.
pub struct HttpDocumentSource {
    client: Client,
}

impl HttpDocumentSource {
    pub fn new() -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an existing client. It should not cache responses.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = url::Url::parse(url)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "Caption document received");
        Ok(decode_document(bytes.to_vec()))
    }
}

/// Local file being appended to by another process.
///
/// Accepts plain paths and `file://` URLs.
#[derive(Debug, Default, Clone)]
pub struct FileDocumentSource {
    root: Option<PathBuf>,
}

impl FileDocumentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl DocumentSource for FileDocumentSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let bytes = tokio::fs::read(self.resolve(url)).await?;
        Ok(decode_document(bytes))
    }
}

/// Decode a document snapshot as UTF-8.
///
/// A writer may be mid-way through a multi-byte character. That incomplete
/// tail is cut rather than replaced, so the completed character later makes
/// the document strictly longer. Invalid bytes elsewhere become U+FFFD.
#[must_use]
pub fn decode_document(mut bytes: Vec<u8>) -> String {
    if let Err(err) = std::str::from_utf8(&bytes) {
        if err.error_len().is_none() {
            bytes.truncate(err.valid_up_to());
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// How much of the document has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCursor {
    pub last_observed_length: usize,
}

impl ParseCursor {
    /// Move forward if `length` is strictly greater. Returns whether it moved.
    pub fn advance(&mut self, length: usize) -> bool {
        if length > self.last_observed_length {
            self.last_observed_length = length;
            true
        } else {
            false
        }
    }
}

/// Epoch and cursor bookkeeping for periodic refreshes.
///
/// Each fetch is tagged with the epoch it was issued in. Starting a new epoch
/// (source change, disable) makes every outstanding response stale.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    epoch: u64,
    cursor: ParseCursor,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh extraction epoch with an empty cursor.
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.cursor = ParseCursor::default();
        self.epoch
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn cursor(&self) -> ParseCursor {
        self.cursor
    }

    /// Offer a fetched document. Returns the new cue set only if the response
    /// belongs to the current epoch and the document grew.
    pub fn offer(&mut self, epoch: u64, document: &str) -> Option<CueSet> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Discarding response from old epoch");
            return None;
        }
        if !self.cursor.advance(document.len()) {
            return None;
        }
        Some(parser::parse(document))
    }
}
