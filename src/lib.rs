/*!
 * # lexicard - English-Chinese vocabulary flashcards with AI
 *
 * A Rust library that generates topic-based vocabulary records with an AI
 * text-generation provider, illustrates them with images from public image
 * search APIs and exports them as CSV decks.
 *
 * ## Features
 *
 * - Term generation with authentication probing, retries and backoff
 * - Persistent TTL caches for term lists and image URLs
 * - Bounded-concurrency image resolution with per-item fault isolation
 * - Partial-success policy: a run succeeds when at least half of the
 *   requested records survive
 * - CSV export with a fixed column layout
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Main application controller
 * - `generation`: Term generation and run orchestration:
 *   - `generation::cache`: Persistent TTL cache
 *   - `generation::client`: Retrying translation client
 *   - `generation::orchestrator`: Per-run state machine
 * - `images`: Image search, download and concurrent fetching
 * - `providers`: Client implementations for text-generation backends:
 *   - `providers::gemini`: Google Generative Language API client
 *   - `providers::mock`: Scriptable in-process provider
 * - `models`: Term and flashcard records
 * - `export`: CSV export
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod export;
pub mod file_utils;
pub mod generation;
pub mod images;
pub mod models;
pub mod providers;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, GenerationRequest};
pub use errors::{AppError, GenerationError, ProviderError};
pub use export::{CsvExporter, Exporter};
pub use generation::{ContentCache, GenerationOrchestrator, OrchestratorOptions, RunStatistics, TranslationClient};
pub use images::{FetchEngine, FetchMode, ImageResolver, Resolve};
pub use models::{CompletedRecord, TermRecord};
