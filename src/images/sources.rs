/*!
 * Image search backends.
 *
 * Each source issues one search request and extracts the first result's
 * URL through a typed response schema and a pure extraction function.
 */

use std::fmt::Debug;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::ProviderError;

pub const UNSPLASH_SEARCH_URL: &str = "https://api.unsplash.com/search/photos";
pub const PIXABAY_SEARCH_URL: &str = "https://pixabay.com/api/";

/// Results requested per search
const PER_PAGE: u32 = 3;

/// A searchable image backend
#[async_trait]
pub trait ImageSource: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Return the URL of the best match for `query`, if any
    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError>;
}

#[derive(Debug, Deserialize)]
pub struct UnsplashSearchResponse {
    #[serde(default)]
    pub results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
pub struct UnsplashPhoto {
    pub urls: UnsplashUrls,
}

#[derive(Debug, Deserialize)]
pub struct UnsplashUrls {
    #[serde(default)]
    pub regular: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PixabaySearchResponse {
    #[serde(default)]
    pub hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
pub struct PixabayHit {
    #[serde(default, rename = "webformatURL")]
    pub webformat_url: Option<String>,
    #[serde(default, rename = "largeImageURL")]
    pub large_image_url: Option<String>,
}

/// First result's regular-size URL
pub fn extract_unsplash_url(response: &UnsplashSearchResponse) -> Option<String> {
    response
        .results
        .first()
        .and_then(|photo| photo.urls.regular.clone())
        .filter(|url| !url.is_empty())
}

/// First hit's web-format URL, falling back to the large image URL
pub fn extract_pixabay_url(response: &PixabaySearchResponse) -> Option<String> {
    let hit = response.hits.first()?;
    hit.webformat_url
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| hit.large_image_url.clone().filter(|url| !url.is_empty()))
}

async fn fetch_json<T: for<'de> Deserialize<'de>>(request: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(ProviderError::from_transport)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Unsplash photo search; skipped when no access key is configured
#[derive(Debug, Clone)]
pub struct UnsplashSource {
    client: Client,
    access_key: Option<String>,
    search_url: String,
}

impl UnsplashSource {
    pub fn new(client: Client, access_key: Option<String>) -> Self {
        Self {
            client,
            access_key: access_key.filter(|key| !key.is_empty()),
            search_url: UNSPLASH_SEARCH_URL.to_string(),
        }
    }
}

#[async_trait]
impl ImageSource for UnsplashSource {
    fn name(&self) -> &str {
        "unsplash"
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let Some(key) = &self.access_key else {
            debug!("Skipping unsplash search for '{}': no access key", query);
            return Ok(None);
        };

        let request = self
            .client
            .get(&self.search_url)
            .header("Authorization", format!("Client-ID {}", key))
            .query(&[
                ("query", query.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("orientation", "landscape".to_string()),
            ]);

        let response: UnsplashSearchResponse = fetch_json(request).await?;
        Ok(extract_unsplash_url(&response))
    }
}

/// Pixabay photo search
#[derive(Debug, Clone)]
pub struct PixabaySource {
    client: Client,
    api_key: Option<String>,
    search_url: String,
}

impl PixabaySource {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.is_empty()),
            search_url: PIXABAY_SEARCH_URL.to_string(),
        }
    }
}

#[async_trait]
impl ImageSource for PixabaySource {
    fn name(&self) -> &str {
        "pixabay"
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let request = self.client.get(&self.search_url).query(&[
            ("key", self.api_key.clone().unwrap_or_default()),
            ("q", query.to_string()),
            ("image_type", "photo".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("safesearch", "true".to_string()),
        ]);

        let response: PixabaySearchResponse = fetch_json(request).await?;
        Ok(extract_pixabay_url(&response))
    }
}
