/*!
 * Bounded-concurrency image fetching.
 *
 * `FetchEngine` fans a list of queries out to a `Resolve` implementation and
 * returns one `(query, Option<path>)` pair per input, in input order. A
 * failing or panicking resolution only affects its own slot.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::images::resolver::Resolve;

/// Default pause between requests in sequential mode
pub const DEFAULT_SEQUENTIAL_DELAY: Duration = Duration::from_millis(500);

/// Progress callback receiving (completed, total)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// How the image phase schedules its requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Concurrent,
    Sequential,
}

/// Outcome of one fetch run
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// One entry per input query, in input order
    pub results: Vec<(String, Option<PathBuf>)>,
    /// Resolutions that errored or panicked
    pub failures: usize,
}

impl FetchReport {
    /// Number of queries that produced an image
    pub fn resolved_count(&self) -> usize {
        self.results.iter().filter(|(_, path)| path.is_some()).count()
    }
}

/// Image fan-out with a concurrency cap and per-item fault isolation
pub struct FetchEngine {
    resolver: Arc<dyn Resolve>,
    mode: FetchMode,
    max_concurrent: usize,
    sequential_delay: Duration,
    progress: Option<ProgressCallback>,
}

impl FetchEngine {
    /// Concurrent engine with at most `max_concurrent` resolutions in flight
    pub fn new(resolver: Arc<dyn Resolve>, max_concurrent: usize) -> Self {
        Self {
            resolver,
            mode: FetchMode::Concurrent,
            max_concurrent: max_concurrent.max(1),
            sequential_delay: DEFAULT_SEQUENTIAL_DELAY,
            progress: None,
        }
    }

    /// One-at-a-time engine pausing `delay` between queries
    pub fn sequential(resolver: Arc<dyn Resolve>, delay: Duration) -> Self {
        Self {
            resolver,
            mode: FetchMode::Sequential,
            max_concurrent: 1,
            sequential_delay: delay,
            progress: None,
        }
    }

    /// Report progress after each completed query
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Resolve every query, returning the paths in input order
    pub async fn resolve_many(&self, queries: &[String]) -> Vec<(String, Option<PathBuf>)> {
        self.fetch(queries).await.results
    }

    /// Resolve every query and count the absorbed failures
    pub async fn fetch(&self, queries: &[String]) -> FetchReport {
        if queries.is_empty() {
            return FetchReport::default();
        }

        info!(
            "Fetching images for {} queries ({:?}, max {} in flight)",
            queries.len(),
            self.mode,
            self.max_concurrent
        );

        let outcomes = match self.mode {
            FetchMode::Concurrent => self.fetch_concurrent(queries).await,
            FetchMode::Sequential => self.fetch_sequential(queries).await,
        };

        let mut report = FetchReport {
            results: Vec::with_capacity(outcomes.len()),
            failures: 0,
        };
        for (query, outcome) in outcomes {
            match outcome {
                Ok(path) => report.results.push((query, path)),
                Err(message) => {
                    error!("Image fetch failed for '{}': {}", query, message);
                    report.failures += 1;
                    report.results.push((query, None));
                }
            }
        }

        info!(
            "Image phase finished: {}/{} resolved, {} failed",
            report.resolved_count(),
            queries.len(),
            report.failures
        );
        report
    }

    async fn fetch_concurrent(&self, queries: &[String]) -> Vec<(String, Result<Option<PathBuf>, String>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let total = queries.len();
        let completed = Arc::new(AtomicUsize::new(0));

        let mut outcomes = stream::iter(queries.iter().cloned().enumerate())
            .map(|(index, query)| {
                let resolver = self.resolver.clone();
                let semaphore = semaphore.clone();
                let completed = completed.clone();
                let progress = self.progress.clone();

                async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(permit) => {
                            let outcome = resolve_isolated(resolver, query.clone()).await;
                            drop(permit);
                            outcome
                        }
                        Err(e) => Err(format!("concurrency limiter closed: {}", e)),
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(progress) = &progress {
                        progress(done, total);
                    }
                    (index, query, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;

        // Sort results by index to restore input order
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
            .into_iter()
            .map(|(_, query, outcome)| (query, outcome))
            .collect()
    }

    async fn fetch_sequential(&self, queries: &[String]) -> Vec<(String, Result<Option<PathBuf>, String>)> {
        let total = queries.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, query) in queries.iter().enumerate() {
            if index > 0 && !self.sequential_delay.is_zero() {
                debug!("Waiting {:?} before next image request", self.sequential_delay);
                tokio::time::sleep(self.sequential_delay).await;
            }

            let outcome = resolve_isolated(self.resolver.clone(), query.clone()).await;
            outcomes.push((query.clone(), outcome));

            if let Some(progress) = &self.progress {
                progress(index + 1, total);
            }
        }

        outcomes
    }
}

/// Run one resolution on its own task so a panic stays contained
async fn resolve_isolated(resolver: Arc<dyn Resolve>, query: String) -> Result<Option<PathBuf>, String> {
    let handle = tokio::spawn(async move { resolver.resolve(&query).await });

    match handle.await {
        Ok(Ok(path)) => Ok(path),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_error) if join_error.is_panic() => Err("resolver task panicked".to_string()),
        Err(join_error) => Err(format!("resolver task failed: {}", join_error)),
    }
}
