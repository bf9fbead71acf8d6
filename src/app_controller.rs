use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::app_config::Config;
use crate::errors::GenerationError;
use crate::export::CsvExporter;
use crate::file_utils::FileManager;
use crate::generation::cache::{ContentCache, IMAGE_CACHE_FILE, TERMS_CACHE_FILE};
use crate::generation::client::TranslationClient;
use crate::generation::orchestrator::{CleanupStats, GenerationOrchestrator};
use crate::generation::stats::RunStatistics;
use crate::images::fetch::ProgressCallback;
use crate::images::resolver::ImageResolver;
use crate::providers::Provider;
use crate::providers::gemini::Gemini;

// @module: Application controller wiring configuration into one generation run

/// What a single run should produce
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub topic: String,
    pub count: usize,
    pub context: Option<String>,
    /// Export file name, timestamped default when absent
    pub filename: Option<String>,
}

/// Main application controller for flashcard generation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Text-generation backend
    provider: Arc<dyn Provider>,
}

impl Controller {
    // @method: Create a controller talking to Gemini
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        if config.provider.api_key.trim().is_empty() {
            return Err(GenerationError::Configuration(
                "provider API key is missing (set provider.api_key or GEMINI_API_KEY)".to_string(),
            )
            .into());
        }

        let provider = Gemini::new(
            config.provider.api_key.clone(),
            config.provider.endpoint.clone(),
            config.provider.model.clone(),
            config.provider.timeout(),
        );
        Ok(Self {
            config,
            provider: Arc::new(provider),
        })
    }

    // @method: Create a controller around an explicit provider
    pub fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Assemble an orchestrator with caches, resolver and exporter
    pub fn build_orchestrator(&self, progress: Option<ProgressCallback>) -> Result<GenerationOrchestrator> {
        let output = &self.config.output_directory;
        FileManager::ensure_dir(output)?;

        let client = TranslationClient::new(self.provider.clone())
            .with_retry_policy(self.config.provider.retry_count, self.config.provider.retry_backoff())
            .with_temperature(Some(self.config.provider.temperature));

        let exporter = Arc::new(CsvExporter::new(output.clone()));
        let mut orchestrator =
            GenerationOrchestrator::new(client, self.config.to_orchestrator_options()).with_exporter(exporter);

        if self.config.cache_enabled {
            let cache_dir = self.config.cache_dir();
            FileManager::ensure_dir(&cache_dir)?;
            let terms_cache = ContentCache::open(cache_dir.join(TERMS_CACHE_FILE), self.config.terms_cache_ttl());
            orchestrator = orchestrator.with_terms_cache(Arc::new(terms_cache));
        }

        if self.config.image_enabled {
            let mut resolver = ImageResolver::http(
                self.config.image_dir(),
                self.config.image_api_key.clone(),
                std::time::Duration::from_secs(self.config.image_timeout_secs),
            );
            if self.config.cache_enabled {
                let image_cache = ContentCache::open(
                    self.config.cache_dir().join(IMAGE_CACHE_FILE),
                    self.config.image_cache_ttl(),
                );
                resolver = resolver.with_cache(Arc::new(image_cache));
            }
            orchestrator = orchestrator.with_resolver(Arc::new(resolver));
        }

        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }

        Ok(orchestrator)
    }

    /// Run one generation and export, returning the CSV path
    pub async fn run(&self, request: &GenerationRequest) -> Result<PathBuf> {
        let progress_bar = ProgressBar::new(request.count as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%)"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));

        let pb = progress_bar.clone();
        let progress: ProgressCallback = Arc::new(move |completed, total| {
            pb.set_length(total as u64);
            pb.set_position(completed as u64);
        });

        let mut orchestrator = self.build_orchestrator(Some(progress))?;

        info!(
            "🚀 lexicard: {} - {} ({} records about '{}')",
            orchestrator.client().provider_name(),
            self.config.provider.model,
            request.count,
            request.topic
        );

        let result = orchestrator
            .run(
                &request.topic,
                request.count,
                request.filename.as_deref(),
                request.context.as_deref(),
            )
            .await;
        progress_bar.finish_and_clear();

        let stats = orchestrator.get_statistics();
        Self::print_summary(&stats);

        match result {
            Ok(path) => {
                info!("Success: {}", path.display());
                Ok(path)
            }
            Err(e @ GenerationError::PartialResults { .. }) => {
                warn!("{}", e);
                Err(anyhow!(e))
            }
            Err(e) => {
                error!("{}", e);
                Err(anyhow!(e))
            }
        }
    }

    /// Remove generated files older than `max_age_days`
    pub fn cleanup(&self, max_age_days: u64) -> Result<CleanupStats> {
        let orchestrator = self.build_orchestrator(None)?;
        let stats = orchestrator.cleanup_old_files(max_age_days)?;
        Ok(stats)
    }

    fn print_summary(stats: &RunStatistics) {
        for line in stats.summary().lines() {
            info!("{}", line);
        }
        if let Some(duration) = stats.duration().and_then(|d| d.to_std().ok()) {
            info!("Total time: {}", Self::format_duration(duration));
        }
    }

    // Format duration in a human-readable format
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
