/*!
 * Tests for image downloads against a local HTTP server
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lexicard::images::{HttpDownloader, ImageDownloader, RetryingDownloader};

use crate::common::{self, FakeDownloader, JPEG_BYTES};

/// Serve one canned HTTP response and return a URL pointing at it
async fn serve_once(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/photo.jpg", addr)
}

fn downloader(max_bytes: u64) -> HttpDownloader {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    HttpDownloader::new(Duration::from_secs(5))
        .with_client(client)
        .with_max_bytes(max_bytes)
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_download_withImageBody_shouldWriteTarget() {
    let dir = common::create_temp_dir();
    let target = dir.path().join("cat.jpg");
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        JPEG_BYTES.len()
    )
    .into_bytes();
    response.extend_from_slice(JPEG_BYTES);
    let url = serve_once(response).await;

    downloader(1024).download(&url, &target).await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), JPEG_BYTES);
    assert_eq!(entries(dir.path()), 1);
}

#[tokio::test]
async fn test_download_withHtmlContentType_shouldRejectWithoutFile() {
    let dir = common::create_temp_dir();
    let target = dir.path().join("cat.jpg");
    let body = "<html>nope</html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let url = serve_once(response.into_bytes()).await;

    let err = downloader(1024).download(&url, &target).await.unwrap_err();

    assert!(err.to_string().contains("Invalid content type: 'text/html'"), "{}", err);
    assert!(!err.is_transient());
    assert!(!target.exists());
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_download_withOversizedContentLength_shouldRejectBeforeReading() {
    let dir = common::create_temp_dir();
    let target = dir.path().join("big.png");
    let response = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n";
    let url = serve_once(response.as_bytes().to_vec()).await;

    let err = downloader(20).download(&url, &target).await.unwrap_err();

    assert!(err.to_string().contains("File too large: 1000 bytes"), "{}", err);
    assert!(!target.exists());
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_download_withChunkedBodyOverCap_shouldAbortAndLeaveNothing() {
    let dir = common::create_temp_dir();
    let target = dir.path().join("stream.jpg");
    let chunk = "x".repeat(24);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
         18\r\n{chunk}\r\n18\r\n{chunk}\r\n0\r\n\r\n"
    );
    let url = serve_once(response.into_bytes()).await;

    let err = downloader(20).download(&url, &target).await.unwrap_err();

    assert!(err.to_string().contains("File size exceeded during download"), "{}", err);
    assert!(!target.exists());
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retryingDownload_withDroppedConnection_shouldRetryAndSucceed() {
    let dir = common::create_temp_dir();
    let target = dir.path().join("cat.jpg");
    let inner = Arc::new(FakeDownloader::flaky(1));
    let downloader = RetryingDownloader::new(inner.clone()).with_retry_policy(3, Duration::from_millis(500));

    let started = tokio::time::Instant::now();
    downloader.download("https://img.example/cat.jpg", &target).await.unwrap();

    assert_eq!(inner.download_count(), 2);
    assert!(target.exists());
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_retryingDownload_withPersistentDrops_shouldGiveUpAfterMaxAttempts() {
    let dir = common::create_temp_dir();
    let inner = Arc::new(FakeDownloader::flaky(10));
    let downloader = RetryingDownloader::new(inner.clone()).with_retry_policy(3, Duration::from_millis(10));

    let err = downloader
        .download("https://img.example/cat.jpg", &dir.path().join("cat.jpg"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(inner.download_count(), 3);
}

#[tokio::test]
async fn test_retryingDownload_withClientError_shouldNotRetry() {
    let dir = common::create_temp_dir();
    let url = "https://img.example/missing.jpg";
    let inner = Arc::new(FakeDownloader::failing_for(&[url]));
    let downloader = RetryingDownloader::new(inner.clone()).with_retry_policy(3, Duration::ZERO);

    assert!(downloader.download(url, &dir.path().join("missing.jpg")).await.is_err());
    assert_eq!(inner.download_count(), 1);
}
