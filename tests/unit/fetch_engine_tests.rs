/*!
 * Tests for bounded-concurrency image fetching
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lexicard::errors::GenerationError;
use lexicard::images::{FetchEngine, FetchMode, Resolve};

use crate::common::{self, ConcurrencyProbe, ReversedResolver};

#[tokio::test]
async fn test_fetch_withManyQueries_shouldNeverExceedConcurrencyCap() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(20)));
    let engine = FetchEngine::new(probe.clone(), 3);
    let queries: Vec<String> = (0..12).map(|i| format!("term{}", i)).collect();

    let results = engine.resolve_many(&queries).await;

    assert_eq!(results.len(), 12);
    assert!(probe.peak() <= 3, "peak was {}", probe.peak());
    assert!(probe.peak() >= 2, "fan-out never overlapped");
}

#[tokio::test]
async fn test_fetch_withOutOfOrderCompletion_shouldPreserveInputOrder() {
    let queries: Vec<String> = (0..6).map(|i| format!("q{}", i)).collect();
    let engine = FetchEngine::new(Arc::new(ReversedResolver::new(queries.len())), 6);

    let results = engine.resolve_many(&queries).await;

    let returned: Vec<&str> = results.iter().map(|(query, _)| query.as_str()).collect();
    assert_eq!(returned, vec!["q0", "q1", "q2", "q3", "q4", "q5"]);
    for (query, path) in &results {
        assert_eq!(path.as_ref().unwrap(), &PathBuf::from(format!("{}.jpg", query)));
    }
}

struct FlakyResolver;

#[async_trait]
impl Resolve for FlakyResolver {
    async fn resolve(&self, query: &str) -> Result<Option<PathBuf>, GenerationError> {
        match query {
            "disk" => Err(GenerationError::file("/images", "permission denied")),
            "crash" => panic!("decoder crashed"),
            "nothing" => Ok(None),
            other => Ok(Some(PathBuf::from(format!("{}.png", other)))),
        }
    }
}

#[tokio::test]
async fn test_fetch_withFailingItems_shouldIsolateFailures() {
    let engine = FetchEngine::new(Arc::new(FlakyResolver), 2);
    let queries = common::queries(&["cat", "disk", "dog", "crash", "nothing", "bird"]);

    let report = engine.fetch(&queries).await;

    assert_eq!(report.results.len(), 6);
    assert_eq!(report.failures, 2);
    assert_eq!(report.resolved_count(), 3);
    assert_eq!(report.results[0].1, Some(PathBuf::from("cat.png")));
    assert_eq!(report.results[1].1, None);
    assert_eq!(report.results[3].1, None);
    assert_eq!(report.results[5].1, Some(PathBuf::from("bird.png")));
}

#[tokio::test]
async fn test_fetch_shouldReportProgressForEveryQuery() {
    let calls = Arc::new(AtomicUsize::new(0));
    let last_total = Arc::new(AtomicUsize::new(0));
    let (c, t) = (calls.clone(), last_total.clone());

    let engine = FetchEngine::new(Arc::new(FlakyResolver), 4).with_progress(Arc::new(move |_done, total| {
        c.fetch_add(1, Ordering::SeqCst);
        t.store(total, Ordering::SeqCst);
    }));

    engine.fetch(&common::queries(&["a", "b", "crash", "d", "e"])).await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(last_total.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_sequentialFetch_shouldRunOneAtATime() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(5)));
    let engine = FetchEngine::sequential(probe.clone(), Duration::ZERO);

    let results = engine.resolve_many(&common::queries(&["a", "b", "c", "d"])).await;

    assert_eq!(engine.mode(), FetchMode::Sequential);
    assert_eq!(results.len(), 4);
    assert_eq!(probe.peak(), 1);
}

#[tokio::test]
async fn test_new_withZeroLimit_shouldStillMakeProgress() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(1)));
    let engine = FetchEngine::new(probe.clone(), 0);

    let results = engine.resolve_many(&common::queries(&["a", "b"])).await;

    assert_eq!(results.len(), 2);
    assert_eq!(probe.peak(), 1);
}
