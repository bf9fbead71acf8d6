/*!
 * Per-term image discovery.
 *
 * `ImageResolver` checks the URL cache, walks the configured search sources
 * in order and downloads the first usable image into the image directory.
 * Every "nothing found" outcome is `Ok(None)`; only local filesystem
 * failures are errors.
 */

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::errors::GenerationError;
use crate::file_utils::FileManager;
use crate::generation::cache::ContentCache;
use crate::images::download::{self, HttpDownloader, ImageDownloader, RetryingDownloader};
use crate::images::sources::{ImageSource, PixabaySource, UnsplashSource};
use crate::models::IMAGE_EXTENSIONS;

static QUERY_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid query regex"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Anything that can turn a query into a local image path
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Option<PathBuf>, GenerationError>;

    /// Remote URL behind the last successful resolution of `query`
    fn source_url(&self, _query: &str) -> Option<String> {
        None
    }
}

/// Strip characters other than word characters, whitespace and hyphens
pub fn sanitize_query(query: &str) -> String {
    let stripped = QUERY_UNSAFE_CHARS.replace_all(query, "");
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}

/// Local file name for an image downloaded for `query` from `url`
///
/// `<sanitized query>_<first 8 hex of sha256(url)>.<ext>`, where the
/// extension comes from the URL path when it is an accepted image type.
pub fn image_filename(query: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!(
        "{}_{}.{}",
        FileManager::sanitize_filename(query),
        &digest[..8],
        url_extension(url).unwrap_or("jpg")
    )
}

fn url_extension(url: &str) -> Option<&'static str> {
    let parsed = url::Url::parse(url).ok()?;
    let ext = Path::new(parsed.path()).extension()?.to_str()?.to_lowercase();
    IMAGE_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

/// Search sources in preference order for the given key
///
/// Unsplash leads when a key is configured, Pixabay otherwise.
pub fn default_sources(client: Client, api_key: Option<String>) -> Vec<Arc<dyn ImageSource>> {
    let unsplash: Arc<dyn ImageSource> = Arc::new(UnsplashSource::new(client.clone(), api_key.clone()));
    let pixabay: Arc<dyn ImageSource> = Arc::new(PixabaySource::new(client, api_key.clone()));

    if api_key.is_some_and(|key| !key.is_empty()) {
        vec![unsplash, pixabay]
    } else {
        vec![pixabay, unsplash]
    }
}

/// Image discovery with URL caching and ordered source fallback
#[derive(Debug)]
pub struct ImageResolver {
    image_dir: PathBuf,
    sources: Vec<Arc<dyn ImageSource>>,
    downloader: Arc<dyn ImageDownloader>,
    cache: Option<Arc<ContentCache<String>>>,
    // sanitized query -> URL of the image on disk
    resolved_urls: Mutex<HashMap<String, String>>,
}

impl ImageResolver {
    /// Create a resolver from explicit sources and downloader
    pub fn new(
        image_dir: impl Into<PathBuf>,
        sources: Vec<Arc<dyn ImageSource>>,
        downloader: Arc<dyn ImageDownloader>,
    ) -> Self {
        Self {
            image_dir: image_dir.into(),
            sources,
            downloader,
            cache: None,
            resolved_urls: Mutex::new(HashMap::new()),
        }
    }

    /// Create a resolver talking to the public search APIs
    pub fn http(image_dir: impl Into<PathBuf>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(download::USER_AGENT)
            .build()
            .unwrap_or_default();

        Self::new(
            image_dir,
            default_sources(client, api_key),
            Arc::new(RetryingDownloader::new(Arc::new(HttpDownloader::new(timeout)))),
        )
    }

    /// Cache resolved URLs in `cache`
    pub fn with_cache(mut self, cache: Arc<ContentCache<String>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Remove image files older than `max_age`, returning how many were removed
    pub fn cleanup_old_images(&self, max_age: Duration) -> Result<usize, GenerationError> {
        let removed = FileManager::remove_files_older_than(&self.image_dir, &IMAGE_EXTENSIONS, max_age)
            .map_err(|e| GenerationError::file(&self.image_dir, e))?;
        info!("Cleaned up {} old images", removed);
        Ok(removed)
    }

    /// Download `url` for `query`, returning the verified local path
    ///
    /// An existing file with the target name is reused without a request.
    async fn fetch_into_dir(&self, url: &str, query: &str) -> Option<PathBuf> {
        let path = self.download_verified(url, query).await?;
        self.resolved_urls.lock().insert(query.to_string(), url.to_string());
        Some(path)
    }

    async fn download_verified(&self, url: &str, query: &str) -> Option<PathBuf> {
        let target = self.image_dir.join(image_filename(query, url));
        if target.exists() {
            debug!("Reusing existing image {:?}", target);
            return Some(target);
        }

        if let Err(e) = self.downloader.download(url, &target).await {
            warn!("Error downloading image from {}: {}", url, e);
            return None;
        }

        if download::verify_image_file(&target) {
            info!("Successfully downloaded image: {:?}", target);
            Some(target)
        } else {
            warn!("Downloaded file is not a valid image: {}", url);
            if let Err(e) = fs::remove_file(&target) {
                error!("Failed to remove invalid image {:?}: {}", target, e);
            }
            None
        }
    }
}

#[async_trait]
impl Resolve for ImageResolver {
    async fn resolve(&self, query: &str) -> Result<Option<PathBuf>, GenerationError> {
        let query = sanitize_query(query);
        if query.is_empty() {
            return Ok(None);
        }

        FileManager::ensure_dir(&self.image_dir).map_err(|e| GenerationError::file(&self.image_dir, e))?;

        if let Some(url) = self.cache.as_ref().and_then(|cache| cache.get(&query)) {
            debug!("Using cached image URL for '{}'", query);
            if let Some(path) = self.fetch_into_dir(&url, &query).await {
                return Ok(Some(path));
            }
        }

        for source in &self.sources {
            match source.search(&query).await {
                Ok(Some(url)) => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.put(&query, url.clone()) {
                            warn!("Failed to cache image URL for '{}': {}", query, e);
                        }
                    }
                    if let Some(path) = self.fetch_into_dir(&url, &query).await {
                        return Ok(Some(path));
                    }
                }
                Ok(None) => debug!("No {} result for '{}'", source.name(), query),
                Err(e) => warn!("Error searching {} for '{}': {}", source.name(), query, e),
            }
        }

        warn!("No image found for query: {}", query);
        Ok(None)
    }

    fn source_url(&self, query: &str) -> Option<String> {
        self.resolved_urls.lock().get(&sanitize_query(query)).cloned()
    }
}
