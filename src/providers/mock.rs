/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds with a fixed term list
 * - `MockProvider::intermittent()` - Fails every Nth request
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::unauthorized()` - Rejects every request as unauthenticated
 * - `MockProvider::scripted()` - Answers through a caller-supplied closure
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider};

/// Closure answering the n-th (zero-based) request
pub type Responder = Arc<dyn Fn(usize, &CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Clone)]
pub enum MockBehavior {
    /// Always succeeds with the configured text
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with a server error
    Failing,
    /// Always fails with an authentication error
    Unauthorized,
    /// Returns empty response
    Empty,
    /// Delegates to a closure
    Scripted(Responder),
}

impl fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "Working"),
            Self::Intermittent { fail_every } => write!(f, "Intermittent({})", fail_every),
            Self::Failing => write!(f, "Failing"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::Empty => write!(f, "Empty"),
            Self::Scripted(_) => write!(f, "Scripted"),
        }
    }
}

/// Mock provider for testing generation behavior
///
/// Clones share the request counter and the call log.
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Text returned by successful requests
    response_text: String,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    /// Prompt and instant of every request, in arrival order
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            response_text: Self::terms_json(&[
                ("cat", "猫", "mao1"),
                ("dog", "狗", "gou3"),
                ("bird", "鸟", "niao3"),
            ]),
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock provider
    ///
    /// `fail_every` is clamped to at least 1, which fails every request.
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that rejects the credentials
    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock driven by a closure over (request index, request)
    pub fn scripted<F>(responder: F) -> Self
    where
        F: Fn(usize, &CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(MockBehavior::Scripted(Arc::new(responder)))
    }

    /// Set the text returned by successful requests
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.response_text = text.into();
        self
    }

    /// Render term triples as the JSON array the generation prompt asks for
    pub fn terms_json(terms: &[(&str, &str, &str)]) -> String {
        let items: Vec<serde_json::Value> = terms
            .iter()
            .map(|(english, chinese, pinyin)| {
                serde_json::json!({
                    "english": english,
                    "chinese": chinese,
                    "pinyin": pinyin,
                    "sentence": format!("I like the {}.", english),
                })
            })
            .collect();
        serde_json::Value::Array(items).to_string()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(prompt, _)| prompt.clone()).collect()
    }

    /// Arrival instants of every request
    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    fn ok(&self, text: String) -> Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            completion_tokens: Some((text.len() / 4) as u64),
            text,
            prompt_tokens: Some(10),
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push((request.prompt.clone(), Instant::now()));

        match &self.behavior {
            MockBehavior::Working => self.ok(self.response_text.clone()),

            MockBehavior::Intermittent { fail_every } => {
                let fail_every = (*fail_every).max(1);
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    self.ok(self.response_text.clone())
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError(
                "API key not valid. Please pass a valid API key.".to_string(),
            )),

            MockBehavior::Empty => self.ok(String::new()),

            MockBehavior::Scripted(responder) => (responder.as_ref())(count, &request).and_then(|text| self.ok(text)),
        }
    }
}
