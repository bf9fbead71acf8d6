/*!
 * Generation orchestration.
 *
 * `GenerationOrchestrator` sequences one run:
 * authenticate, obtain terms (cache or provider), build draft records,
 * resolve images, assemble, then apply the partial-success policy.
 *
 * Per-item failures (one invalid record, one missing image) are absorbed and
 * counted. Run-level failures propagate as `GenerationError`s.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{error, info, warn};

use crate::errors::GenerationError;
use crate::export::Exporter;
use crate::file_utils::FileManager;
use crate::generation::cache::ContentCache;
use crate::generation::client::{MAX_TERMS_PER_REQUEST, TranslationClient};
use crate::generation::stats::RunStatistics;
use crate::images::fetch::{DEFAULT_SEQUENTIAL_DELAY, FetchEngine, FetchMode, ProgressCallback};
use crate::images::resolver::Resolve;
use crate::models::{CompletedRecord, IMAGE_EXTENSIONS, TermRecord};

/// Run-independent knobs of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Largest `count` accepted by `generate`
    pub max_records: usize,
    pub cache_enabled: bool,
    pub image_enabled: bool,
    pub fetch_mode: FetchMode,
    pub max_concurrent_images: usize,
    pub sequential_delay: Duration,
    /// Root of exported files, images and logs
    pub output_directory: PathBuf,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_records: 50,
            cache_enabled: true,
            image_enabled: true,
            fetch_mode: FetchMode::Concurrent,
            max_concurrent_images: 5,
            sequential_delay: DEFAULT_SEQUENTIAL_DELAY,
            output_directory: PathBuf::from("./flashcards"),
        }
    }
}

/// Files removed by `cleanup_old_files`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub images: usize,
    pub logs: usize,
    pub csv_files: usize,
}

impl CleanupStats {
    pub fn total(&self) -> usize {
        self.images + self.logs + self.csv_files
    }
}

/// Top-level generation state machine
pub struct GenerationOrchestrator {
    client: TranslationClient,
    terms_cache: Option<Arc<ContentCache<Vec<TermRecord>>>>,
    resolver: Option<Arc<dyn Resolve>>,
    exporter: Option<Arc<dyn Exporter>>,
    progress: Option<ProgressCallback>,
    options: OrchestratorOptions,
    stats: RunStatistics,
    /// Records produced so far in the current run
    produced: Vec<CompletedRecord>,
}

impl GenerationOrchestrator {
    pub fn new(client: TranslationClient, options: OrchestratorOptions) -> Self {
        Self {
            client,
            terms_cache: None,
            resolver: None,
            exporter: None,
            progress: None,
            options,
            stats: RunStatistics::default(),
            produced: Vec::new(),
        }
    }

    /// Cache generated term lists
    pub fn with_terms_cache(mut self, cache: Arc<ContentCache<Vec<TermRecord>>>) -> Self {
        self.terms_cache = Some(cache);
        self
    }

    /// Resolve images through `resolver`
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Export results and partial results through `exporter`
    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Report image-phase progress
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Snapshot of the statistics of the last run
    pub fn get_statistics(&self) -> RunStatistics {
        self.stats.clone()
    }

    /// Produce completed records for `topic`
    ///
    /// Fails with `PartialResults` when fewer than half of the requested
    /// records survive; the error carries the surviving records.
    pub async fn generate(
        &mut self,
        topic: &str,
        count: usize,
        context: Option<&str>,
    ) -> Result<Vec<CompletedRecord>, GenerationError> {
        let topic = topic.trim().to_string();
        self.stats = RunStatistics::start(&topic, count);
        self.produced.clear();

        info!("Starting generation: topic='{}', count={}", topic, count);
        let result = self.run_pipeline(&topic, count, context).await;
        self.stats.finish();

        match &result {
            Ok(records) => info!(
                "Generation finished: {} records, {} with images",
                records.len(),
                self.stats.images_downloaded
            ),
            Err(e) if e.is_recoverable() => warn!("Generation partially succeeded: {}", e),
            Err(e) => {
                error!("Generation failed: {}", e);
                if !self.produced.is_empty() {
                    self.persist_partial(&topic, &self.produced);
                }
            }
        }

        result
    }

    /// Generate and export in one step, returning the exported file
    ///
    /// On `PartialResults` the partial list is exported once as
    /// `partial_<topic>_<timestamp>.csv` and the error is returned.
    pub async fn run(
        &mut self,
        topic: &str,
        count: usize,
        filename: Option<&str>,
        context: Option<&str>,
    ) -> Result<PathBuf, GenerationError> {
        let exporter = self
            .exporter
            .clone()
            .ok_or_else(|| GenerationError::Configuration("no exporter configured".to_string()))?;

        match self.generate(topic, count, context).await {
            Ok(records) => exporter.export(&records, filename),
            Err(e) => {
                if let Some(partial) = e.partial_results() {
                    self.persist_partial(topic.trim(), partial);
                }
                Err(e)
            }
        }
    }

    /// Remove images, logs and CSV files older than `max_age_days`
    pub fn cleanup_old_files(&self, max_age_days: u64) -> Result<CleanupStats, GenerationError> {
        let max_age = Duration::from_secs(max_age_days * 24 * 60 * 60);
        let root = &self.options.output_directory;
        let remove = |dir: PathBuf, extensions: &[&str]| {
            FileManager::remove_files_older_than(&dir, extensions, max_age).map_err(|e| GenerationError::file(&dir, e))
        };

        let stats = CleanupStats {
            images: remove(root.join("images"), &IMAGE_EXTENSIONS[..])?,
            logs: remove(root.join("logs"), &["log"][..])?,
            csv_files: remove(root.clone(), &["csv"][..])?,
        };
        info!(
            "Cleanup removed {} files ({} images, {} logs, {} csv)",
            stats.total(),
            stats.images,
            stats.logs,
            stats.csv_files
        );
        Ok(stats)
    }

    async fn run_pipeline(
        &mut self,
        topic: &str,
        count: usize,
        context: Option<&str>,
    ) -> Result<Vec<CompletedRecord>, GenerationError> {
        self.validate_request(topic, count)?;

        // Start -> Authenticated
        self.client.authenticate().await?;

        // Authenticated -> TermsObtained
        let terms = self.obtain_terms(topic, count, context).await?;
        if terms.is_empty() {
            return Err(GenerationError::validation("terms", "no terms produced"));
        }
        self.stats.words_generated = terms.len();

        // TermsObtained -> RecordsValidated
        let mut dropped_terms = Vec::new();
        for term in terms {
            let label = term.source_term().to_string();
            match CompletedRecord::from_term(term, Some(topic)) {
                Ok(record) => self.produced.push(record),
                Err(e) => {
                    warn!("Dropping term '{}': {}", label, e);
                    self.stats.validation_errors += 1;
                    dropped_terms.push(label);
                }
            }
        }

        // RecordsValidated -> ImagesResolved
        if self.options.image_enabled && !self.produced.is_empty() {
            self.resolve_images().await;
        }

        // ImagesResolved -> Assembled
        let surviving = self.produced.len();
        self.stats.flashcards_created = surviving;

        if surviving == 0 {
            return Err(GenerationError::NoRecordsCreated {
                requested: count,
                dropped_terms,
            });
        }

        if surviving < count {
            if (surviving as f64) < 0.5 * count as f64 {
                return Err(GenerationError::PartialResults {
                    successful_count: surviving,
                    failed_count: count - surviving,
                    partial_results: std::mem::take(&mut self.produced),
                });
            }
            warn!("Only {} out of {} records were created", surviving, count);
        }

        Ok(std::mem::take(&mut self.produced))
    }

    fn validate_request(&self, topic: &str, count: usize) -> Result<(), GenerationError> {
        if topic.is_empty() {
            return Err(GenerationError::validation("topic", "Topic cannot be empty"));
        }
        if count == 0 {
            return Err(GenerationError::validation("count", "Count must be greater than 0"));
        }
        let limit = self.options.max_records.min(MAX_TERMS_PER_REQUEST);
        if count > limit {
            return Err(GenerationError::validation(
                "count",
                format!("Count cannot exceed {}", limit),
            ));
        }
        Ok(())
    }

    async fn obtain_terms(
        &mut self,
        topic: &str,
        count: usize,
        context: Option<&str>,
    ) -> Result<Vec<TermRecord>, GenerationError> {
        let cache_key = format!("{}:{}", topic, count);
        let cache = self.terms_cache.as_ref().filter(|_| self.options.cache_enabled);

        if let Some(terms) = cache.and_then(|cache| cache.get(&cache_key)) {
            info!("Using {} cached terms for topic '{}'", terms.len(), topic);
            self.stats.cache_hit = true;
            return Ok(terms);
        }

        match self.client.generate_terms(topic, count, context).await {
            Ok(terms) => {
                if let Some(cache) = cache {
                    if let Err(e) = cache.put(&cache_key, terms.clone()) {
                        warn!("Failed to cache terms for '{}': {}", topic, e);
                    }
                }
                Ok(terms)
            }
            Err(e) => {
                if matches!(e, GenerationError::Provider { .. } | GenerationError::Network { .. }) {
                    self.stats.api_errors += 1;
                }
                Err(e)
            }
        }
    }

    async fn resolve_images(&mut self) {
        let Some(resolver) = self.resolver.clone() else {
            warn!("Image resolution enabled but no resolver configured");
            return;
        };

        let mut engine = match self.options.fetch_mode {
            FetchMode::Concurrent => FetchEngine::new(resolver.clone(), self.options.max_concurrent_images),
            FetchMode::Sequential => FetchEngine::sequential(resolver.clone(), self.options.sequential_delay),
        };
        if let Some(progress) = &self.progress {
            engine = engine.with_progress(progress.clone());
        }

        let queries: Vec<String> = self
            .produced
            .iter()
            .map(|record| record.source_term().to_string())
            .collect();
        let report = engine.fetch(&queries).await;
        self.stats.image_errors += report.failures;

        for (record, (query, path)) in self.produced.iter_mut().zip(report.results) {
            let Some(path) = path else { continue };
            match record.attach_image(path) {
                Ok(()) => {
                    if let Some(url) = resolver.source_url(&query) {
                        record.set_image_remote_url(url);
                    }
                    self.stats.images_downloaded += 1;
                }
                Err(e) => {
                    warn!("Rejected image for '{}': {}", query, e);
                    self.stats.image_errors += 1;
                }
            }
        }
    }

    /// Best-effort export of a partial record list
    fn persist_partial(&self, topic: &str, records: &[CompletedRecord]) -> Option<PathBuf> {
        let exporter = self.exporter.as_ref()?;
        let filename = format!(
            "partial_{}_{}",
            FileManager::sanitize_filename(topic),
            Local::now().format("%Y%m%d_%H%M%S")
        );

        match exporter.export(records, Some(&filename)) {
            Ok(path) => {
                info!("Saved {} partial records to {:?}", records.len(), path);
                Some(path)
            }
            Err(e) => {
                error!("Failed to save partial results: {}", e);
                None
            }
        }
    }
}
