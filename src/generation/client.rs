/*!
 * Retrying client around a text-generation provider.
 *
 * `TranslationClient` owns the authentication probe, the retry policy and
 * the parsing of provider output into validated `TermRecord`s. Callers never
 * talk to a `Provider` directly.
 */

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::errors::{GenerationError, ProviderError};
use crate::generation::prompts::{self, AUTH_PROBE_MAX_TOKENS, AUTH_PROBE_PROMPT};
use crate::models::TermRecord;
use crate::providers::{CompletionRequest, Provider};

/// Largest term list a single request may ask for
pub const MAX_TERMS_PER_REQUEST: usize = 50;

/// Upper bound for a single retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Delay before the retry following `attempt` (zero-based): `base * 2^attempt`
///
/// Saturates instead of overflowing and never exceeds `MAX_RETRY_DELAY`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// One array item as returned by the provider
#[derive(Debug, Deserialize)]
struct RawTerm {
    #[serde(default, alias = "source")]
    english: Option<String>,
    #[serde(default, alias = "target")]
    chinese: Option<String>,
    #[serde(default, alias = "pronunciation")]
    pinyin: Option<String>,
    #[serde(default, alias = "example")]
    sentence: Option<String>,
}

/// Generation client with authentication probe and bounded retries
#[derive(Debug)]
pub struct TranslationClient {
    provider: Arc<dyn Provider>,
    authenticated: AtomicBool,
    max_attempts: u32,
    backoff_base: Duration,
    temperature: Option<f32>,
}

impl TranslationClient {
    /// Create a client with 3 attempts and a 1 second backoff base
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            authenticated: AtomicBool::new(false),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            temperature: None,
        }
    }

    /// Set the retry policy; `max_attempts` is clamped to at least 1
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }

    /// Set the sampling temperature for generation requests
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Verify credentials with a lightweight probe
    ///
    /// Only the first successful call issues a probe.
    pub async fn authenticate(&self) -> Result<bool, GenerationError> {
        if self.is_authenticated() {
            return Ok(true);
        }

        let request = CompletionRequest::new(AUTH_PROBE_PROMPT).max_output_tokens(AUTH_PROBE_MAX_TOKENS);
        match self.provider.complete(request).await {
            Ok(response) if !response.text.trim().is_empty() => {
                self.authenticated.store(true, Ordering::SeqCst);
                info!("Successfully authenticated with {}", self.provider.name());
                Ok(true)
            }
            Ok(_) => {
                error!("Authentication test failed - no response received");
                Err(GenerationError::Authentication {
                    provider: self.provider.name().to_string(),
                    message: "Authentication test failed - no response received".to_string(),
                })
            }
            Err(e) => Err(classify_probe_error(self.provider.name(), e)),
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), GenerationError> {
        if !self.is_authenticated() {
            self.authenticate().await?;
        }
        Ok(())
    }

    /// Generate up to `count` validated term records for a topic
    pub async fn generate_terms(
        &self,
        topic: &str,
        count: usize,
        context: Option<&str>,
    ) -> Result<Vec<TermRecord>, GenerationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(GenerationError::validation("topic", "Topic cannot be empty"));
        }
        if count == 0 {
            return Err(GenerationError::validation("count", "Count must be greater than 0"));
        }
        if count > MAX_TERMS_PER_REQUEST {
            return Err(GenerationError::validation(
                "count",
                format!("Count cannot exceed {} per request", MAX_TERMS_PER_REQUEST),
            ));
        }
        self.ensure_authenticated().await?;

        let prompt = prompts::term_generation_prompt(topic, count, context);
        let context = context.map(str::to_string);

        let result = self
            .with_retries(|| {
                let request = self.generation_request(&prompt);
                let context = context.clone();
                async move {
                    let response = self.provider.complete(request).await.map_err(|e| e.to_string())?;
                    let terms = parse_terms_response(&response.text, context.as_deref())?;
                    if terms.is_empty() {
                        return Err("no valid terms in response".to_string());
                    }
                    Ok(terms)
                }
            })
            .await;

        match result {
            Ok(mut terms) => {
                terms.truncate(count);
                info!("Successfully generated {} terms for topic: {}", terms.len(), topic);
                Ok(terms)
            }
            Err(last_error) => {
                error!("All {} attempts failed for topic: {}", self.max_attempts, topic);
                Err(GenerationError::Provider {
                    message: format!(
                        "Failed to generate terms for topic '{}' after {} attempts: {}",
                        topic, self.max_attempts, last_error
                    ),
                })
            }
        }
    }

    /// Translate a single English word into Simplified Chinese
    pub async fn translate_term(&self, word: &str) -> Result<String, GenerationError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(GenerationError::validation("word", "English word cannot be empty"));
        }
        self.ensure_authenticated().await?;

        let prompt = prompts::translation_prompt(word);
        let result = self
            .with_retries(|| {
                let request = self.generation_request(&prompt);
                async move {
                    let response = self.provider.complete(request).await.map_err(|e| e.to_string())?;
                    let translation = response.text.trim().to_string();
                    if translation.is_empty() {
                        return Err("empty translation".to_string());
                    }
                    Ok(translation)
                }
            })
            .await;

        match result {
            Ok(translation) => {
                info!("Successfully translated '{}' to '{}'", word, translation);
                Ok(translation)
            }
            Err(last_error) => Err(GenerationError::Provider {
                message: format!(
                    "Failed to translate '{}' after {} attempts: {}",
                    word, self.max_attempts, last_error
                ),
            }),
        }
    }

    fn generation_request(&self, prompt: &str) -> CompletionRequest {
        let request = CompletionRequest::new(prompt);
        match self.temperature {
            Some(temperature) => request.temperature(temperature),
            None => request,
        }
    }

    /// Run `operation` until it succeeds or attempts are exhausted
    ///
    /// Sleeps `backoff_base * 2^attempt` between attempts, never after the last.
    async fn with_retries<T, F, Fut>(&self, mut operation: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut last_error = String::new();

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt + 1, self.max_attempts, e);
                    last_error = e;
                }
            }

            if attempt + 1 < self.max_attempts {
                let delay = backoff_delay(self.backoff_base, attempt);
                debug!("Retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }
}

/// Map a probe failure onto the run-level error taxonomy
pub fn classify_probe_error(provider: &str, error: ProviderError) -> GenerationError {
    let text = error.to_string().to_lowercase();
    let is_auth = matches!(error, ProviderError::AuthenticationError(_))
        || ["api key", "authentication", "unauthorized", "permission denied"]
            .iter()
            .any(|needle| text.contains(needle));
    let is_network = matches!(error, ProviderError::ConnectionError(_))
        || ["network", "connection", "timed out"]
            .iter()
            .any(|needle| text.contains(needle));

    if is_auth {
        GenerationError::Authentication {
            provider: provider.to_string(),
            message: format!("Invalid API key or authentication failed: {}", error),
        }
    } else if is_network {
        GenerationError::Network {
            url: None,
            message: format!("Network error during authentication: {}", error),
        }
    } else {
        error!("Failed to authenticate with {}: {}", provider, error);
        GenerationError::Provider {
            message: format!("Authentication failed: {}", error),
        }
    }
}

/// Parse a provider response into term records
///
/// Items that are not objects, miss a required field or fail validation are
/// dropped with a warning. Only an unparseable document is an error.
pub fn parse_terms_response(response: &str, context: Option<&str>) -> Result<Vec<TermRecord>, String> {
    let cleaned = prompts::strip_code_fence(response);
    let items: Vec<serde_json::Value> = match serde_json::from_str(cleaned) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => return Err("response is not a JSON array".to_string()),
        Err(e) => return Err(format!("failed to parse JSON response: {}", e)),
    };

    let mut terms = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawTerm = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(_) => {
                warn!("Invalid term format: {}", item);
                continue;
            }
        };

        let (Some(english), Some(chinese), Some(pinyin)) = (raw.english, raw.chinese, raw.pinyin) else {
            warn!("Skipping incomplete term: {}", item);
            continue;
        };

        match TermRecord::new(english, chinese, pinyin) {
            Ok(term) => terms.push(
                term.with_example(raw.sentence)
                    .with_context(context.map(str::to_string)),
            ),
            Err(e) => warn!("Skipping invalid term {}: {}", item, e),
        }
    }

    Ok(terms)
}
