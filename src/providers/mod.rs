/*!
 * Provider implementations for text-generation services.
 *
 * This module contains client implementations for the generative backends
 * the application can talk to:
 * - Gemini: Google Generative Language REST API
 * - Mock: scriptable in-process provider for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// A single prompt sent to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Prompt text
    pub prompt: String,
    /// Upper bound on generated tokens
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request with provider defaults for sampling
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens: None,
            temperature: None,
        }
    }

    /// Set the output token cap
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text returned by a provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,
    /// Prompt tokens reported by the provider
    pub prompt_tokens: Option<u64>,
    /// Completion tokens reported by the provider
    pub completion_tokens: Option<u64>,
}

/// Common trait for all generation providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably by the translation client.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Human-readable provider name used in errors and logs
    fn name(&self) -> &str;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<CompletionResponse, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

pub mod gemini;
pub mod mock;
