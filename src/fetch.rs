//! Attachment fetching with bounded retry.
//!
//! The export executor only ever sees the [`Fetch`] trait: a locator goes
//! in, a payload or a structured [`FetchError`] comes out. The production
//! implementation retries remote fetches a fixed number of times with no
//! backoff; local files are checked once — retrying a missing file does
//! not make it appear.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ExportConfig;
use crate::plan::Locator;

/// Fetched attachment bytes on their way into the archive.
///
/// Remote bodies arrive fully buffered (individually small, bounded in
/// number by the executor's channel); local files cross as paths and are
/// streamed into the archive at append time.
#[derive(Debug)]
pub enum Payload {
    Bytes(Bytes),
    File(PathBuf),
}

/// Why one attachment could not be fetched. Carried into the export
/// outcome so failure classes stay distinguishable without string
/// matching.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Remote side answered with a non-success status.
    Status(u16),
    /// Connection-level failure (DNS, refused, reset, malformed body).
    Network(String),
    /// The transport timeout elapsed.
    Timeout,
    /// Local file does not exist (or is not a regular file).
    Missing(String),
    /// Local file exists but could not be read.
    Io(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "HTTP status {}", code),
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
            FetchError::Timeout => write!(f, "timed out"),
            FetchError::Missing(path) => write!(f, "file not found: {}", path),
            FetchError::Io(msg) => write!(f, "read error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Single-attachment fetch collaborator.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, locator: &Locator) -> Result<Payload, FetchError>;
}

/// Production fetcher: reqwest for URLs, the filesystem for store paths.
pub struct StoreFetcher {
    client: reqwest::Client,
    retries: u32,
}

impl StoreFetcher {
    pub fn new(config: &ExportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            retries: config.fetch_retries,
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<Payload, FetchError> {
        let mut last = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=self.retries {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(bytes) => return Ok(Payload::Bytes(bytes)),
                    Err(e) => last = classify_reqwest_error(e),
                },
                Ok(resp) => last = FetchError::Status(resp.status().as_u16()),
                Err(e) => last = classify_reqwest_error(e),
            }
            if attempt < self.retries {
                eprintln!("Fetch {} failed ({}), attempt {}/{}", url, last, attempt, self.retries);
            }
        }

        Err(last)
    }
}

#[async_trait]
impl Fetch for StoreFetcher {
    async fn fetch(&self, locator: &Locator) -> Result<Payload, FetchError> {
        match locator {
            Locator::Url(url) => self.fetch_url(url).await,
            Locator::Local(path) => fetch_local(path).await,
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

async fn fetch_local(path: &Path) -> Result<Payload, FetchError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Payload::File(path.to_path_buf())),
        Ok(_) => Err(FetchError::Missing(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FetchError::Missing(path.display().to_string()))
        }
        Err(e) => Err(FetchError::Io(e.to_string())),
    }
}
