/*!
 * Term generation and run orchestration.
 *
 * - `cache`: persistent TTL cache shared by term and image lookups
 * - `client`: retrying wrapper around a text-generation provider
 * - `prompts`: prompt templates and response clean-up
 * - `orchestrator`: the per-run state machine
 * - `stats`: run statistics
 */

pub mod cache;
pub mod client;
pub mod orchestrator;
pub mod prompts;
pub mod stats;

pub use cache::{CacheStats, ContentCache};
pub use client::TranslationClient;
pub use orchestrator::{CleanupStats, GenerationOrchestrator, OrchestratorOptions};
pub use stats::RunStatistics;
