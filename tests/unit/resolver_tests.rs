/*!
 * Tests for image resolution: source fallback, URL caching and downloads
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lexicard::generation::ContentCache;
use lexicard::images::resolver::image_filename;
use lexicard::images::{ImageResolver, ImageSource, Resolve};

use crate::common::{self, FakeDownloader, FakeSource};

const CAT_URL: &str = "https://img.example/photos/cat.jpg";
const CAT_PNG_URL: &str = "https://mirror.example/cat.png";

fn resolver(dir: &Path, sources: Vec<Arc<FakeSource>>, downloader: Arc<FakeDownloader>) -> ImageResolver {
    let sources: Vec<Arc<dyn ImageSource>> = sources
        .into_iter()
        .map(|source| source as Arc<dyn ImageSource>)
        .collect();
    ImageResolver::new(dir.join("images"), sources, downloader)
}

fn image_count(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("images")).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_resolve_withFirstSourceHit_shouldDownloadIntoImageDir() {
    let dir = common::create_temp_dir();
    let source = Arc::new(FakeSource::new("primary", &[("cat", CAT_URL)]));
    let downloader = Arc::new(FakeDownloader::jpeg());
    let resolver = resolver(dir.path(), vec![source], downloader.clone());

    let path = resolver.resolve("cat").await.unwrap().unwrap();

    assert_eq!(path, dir.path().join("images").join(image_filename("cat", CAT_URL)));
    assert!(path.exists());
    assert_eq!(downloader.downloaded_urls(), vec![CAT_URL.to_string()]);
    assert_eq!(resolver.source_url(" cat! "), Some(CAT_URL.to_string()));
    assert_eq!(resolver.source_url("dog"), None);
}

#[tokio::test]
async fn test_resolve_withFailingFirstSource_shouldFallBackToNext() {
    let dir = common::create_temp_dir();
    let broken = Arc::new(FakeSource::failing("primary"));
    let backup = Arc::new(FakeSource::new("backup", &[("cat", CAT_URL)]));
    let downloader = Arc::new(FakeDownloader::jpeg());
    let resolver = resolver(dir.path(), vec![broken.clone(), backup.clone()], downloader);

    let path = resolver.resolve("cat").await.unwrap();

    assert!(path.is_some());
    assert_eq!(broken.search_count(), 1);
    assert_eq!(backup.search_count(), 1);
}

#[tokio::test]
async fn test_resolve_withFailedDownload_shouldTryNextSource() {
    let dir = common::create_temp_dir();
    let primary = Arc::new(FakeSource::new("primary", &[("cat", CAT_URL)]));
    let backup = Arc::new(FakeSource::new("backup", &[("cat", CAT_PNG_URL)]));
    let downloader = Arc::new(FakeDownloader::failing_for(&[CAT_URL]));
    let resolver = resolver(dir.path(), vec![primary, backup], downloader.clone());

    let path = resolver.resolve("cat").await.unwrap().unwrap();

    assert_eq!(path.extension().unwrap(), "png");
    assert_eq!(downloader.download_count(), 2);
    assert_eq!(resolver.source_url("cat"), Some(CAT_PNG_URL.to_string()));
}

#[tokio::test]
async fn test_resolve_twice_shouldNotDownloadAgain() {
    let dir = common::create_temp_dir();
    let source = Arc::new(FakeSource::new("primary", &[("cat", CAT_URL)]));
    let downloader = Arc::new(FakeDownloader::jpeg());
    let resolver = resolver(dir.path(), vec![source], downloader.clone());

    let first = resolver.resolve("cat").await.unwrap();
    let second = resolver.resolve("cat").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(downloader.download_count(), 1);
    assert_eq!(image_count(dir.path()), 1);
}

#[tokio::test]
async fn test_resolve_withNonImageBody_shouldDeleteFileAndReturnNone() {
    let dir = common::create_temp_dir();
    let source = Arc::new(FakeSource::new("primary", &[("cat", CAT_URL)]));
    let resolver = resolver(dir.path(), vec![source], Arc::new(FakeDownloader::garbage()));

    assert!(resolver.resolve("cat").await.unwrap().is_none());
    assert_eq!(image_count(dir.path()), 0);
}

#[tokio::test]
async fn test_resolve_withNoMatch_shouldReturnNone() {
    let dir = common::create_temp_dir();
    let source = Arc::new(FakeSource::new("primary", &[]));
    let resolver = resolver(dir.path(), vec![source.clone()], Arc::new(FakeDownloader::jpeg()));

    assert!(resolver.resolve("unicorn").await.unwrap().is_none());
    assert!(resolver.resolve("?!").await.unwrap().is_none());
    // the punctuation-only query never reaches a source
    assert_eq!(source.search_count(), 1);
}

#[tokio::test]
async fn test_resolve_withCachedUrl_shouldSkipSearch() {
    let dir = common::create_temp_dir();
    let cache = Arc::new(ContentCache::open(dir.path().join("image_cache.json"), Duration::from_secs(3600)));

    let warm_source = Arc::new(FakeSource::new("primary", &[("cat", CAT_URL)]));
    let warm = resolver(dir.path(), vec![warm_source], Arc::new(FakeDownloader::jpeg())).with_cache(cache.clone());
    warm.resolve("cat").await.unwrap();
    assert_eq!(cache.get("cat").as_deref(), Some(CAT_URL));

    let cold_source = Arc::new(FakeSource::new("primary", &[("cat", "https://other.example/cat.jpg")]));
    let cold_dir = common::create_temp_dir();
    let downloader = Arc::new(FakeDownloader::jpeg());
    let cold = resolver(cold_dir.path(), vec![cold_source.clone()], downloader.clone()).with_cache(cache);

    let path = cold.resolve("cat").await.unwrap();

    assert!(path.is_some());
    assert_eq!(cold_source.search_count(), 0);
    assert_eq!(downloader.downloaded_urls(), vec![CAT_URL.to_string()]);
}

#[tokio::test]
async fn test_cleanupOldImages_shouldRemoveOnlyImages() {
    let dir = common::create_temp_dir();
    let resolver = resolver(dir.path(), Vec::new(), Arc::new(FakeDownloader::jpeg()));
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    common::write_jpeg(&images, "old.jpg");
    std::fs::write(images.join("notes.txt"), "keep").unwrap();

    std::thread::sleep(Duration::from_millis(30));
    let removed = resolver.cleanup_old_images(Duration::from_millis(1)).unwrap();

    assert_eq!(removed, 1);
    assert!(images.join("notes.txt").exists());
}
