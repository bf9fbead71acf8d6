/*!
 * Streamed image downloads with size and type checks.
 */

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use tempfile::NamedTempFile;

use crate::errors::ProviderError;
use crate::generation::client::backoff_delay;

/// Largest accepted image body
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Download attempts for transient failures
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Base delay between download attempts
pub const DEFAULT_DOWNLOAD_BACKOFF: Duration = Duration::from_secs(1);

/// User agent sent with image downloads
pub const USER_AGENT: &str = "lexicard/0.3";

const ACCEPTED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Image container formats recognised by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Identify the format from the file header
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if header.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if header.starts_with(b"GIF8") {
            Some(Self::Gif)
        } else if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }
}

/// Check that a file on disk is non-empty and starts with a known image signature
pub fn verify_image_file(path: &Path) -> bool {
    let mut header = [0u8; 16];
    let read = fs::File::open(path).and_then(|mut file| file.read(&mut header));
    match read {
        Ok(0) => false,
        Ok(n) => ImageFormat::detect(&header[..n]).is_some(),
        Err(e) => {
            warn!("Error verifying image file {:?}: {}", path, e);
            false
        }
    }
}

/// Fetches a remote image into a local file
#[async_trait]
pub trait ImageDownloader: Send + Sync + Debug {
    /// Download `url` to `target`; on error nothing is left at `target`
    async fn download(&self, url: &str, target: &Path) -> Result<(), ProviderError>;
}

/// reqwest-backed downloader
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    max_bytes: u64,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// Use a preconfigured client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Override the size cap
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ImageDownloader for HttpDownloader {
    async fn download(&self, url: &str, target: &Path) -> Result<(), ProviderError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), format!("GET {}", url)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !ACCEPTED_CONTENT_TYPES.iter().any(|accepted| content_type.contains(accepted)) {
            return Err(ProviderError::RequestFailed(format!(
                "Invalid content type: '{}'",
                content_type
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(ProviderError::RequestFailed(format!("File too large: {} bytes", length)));
            }
        }

        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        let io_error = |e: std::io::Error| ProviderError::RequestFailed(format!("I/O error: {}", e));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;

        let mut total: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(ProviderError::from_transport)? {
            total += chunk.len() as u64;
            if total > self.max_bytes {
                // tmp is removed on drop
                return Err(ProviderError::RequestFailed(
                    "File size exceeded during download".to_string(),
                ));
            }
            tmp.write_all(&chunk).map_err(io_error)?;
        }
        tmp.flush().map_err(io_error)?;

        tmp.persist(target).map_err(|e| io_error(e.error))?;
        debug!("Downloaded {} bytes from {} to {:?}", total, url, target);
        Ok(())
    }
}

/// Retries an inner downloader on transient failures
///
/// Waits `backoff_base * 2^attempt` between attempts. Rejected content
/// (wrong type, too large) fails immediately.
#[derive(Debug, Clone)]
pub struct RetryingDownloader {
    inner: Arc<dyn ImageDownloader>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryingDownloader {
    pub fn new(inner: Arc<dyn ImageDownloader>) -> Self {
        Self {
            inner,
            max_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            backoff_base: DEFAULT_DOWNLOAD_BACKOFF,
        }
    }

    /// Set the retry policy; `max_attempts` is clamped to at least 1
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }
}

#[async_trait]
impl ImageDownloader for RetryingDownloader {
    async fn download(&self, url: &str, target: &Path) -> Result<(), ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.download(url, target).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = backoff_delay(self.backoff_base, attempt);
                    warn!(
                        "Download attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
