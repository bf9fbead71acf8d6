/*!
 * Error types for the lexicard application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 *
 * - `ProviderError`: failures at the provider boundary (HTTP, parsing)
 * - `GenerationError`: run-level failures with a stable machine-readable code
 * - `AppError`: top-level wrapper used by the controller and the CLI
 */

use std::path::PathBuf;

use thiserror::Error;

use crate::models::CompletedRecord;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Map a reqwest transport error onto the provider error taxonomy
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::ConnectionError(format!("request timed out: {}", error))
        } else if error.is_connect() || error.is_body() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Connection drops, rate limiting, request timeouts and server errors
    /// are transient. Rejected content, client errors and parse failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::RequestFailed(_) | Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }

    /// Map a non-success HTTP status and body onto the provider error taxonomy
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors surfaced by a generation run.
///
/// Every variant carries a stable code (see [`GenerationError::code`]) and
/// renders as `[CODE] message`.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Caller-supplied input or configuration field out of contract
    #[error("[VALIDATION_ERROR] {field}: {message}")]
    Validation { field: String, message: String },

    /// Configuration could not be turned into working components
    #[error("[CONFIG_ERROR] {0}")]
    Configuration(String),

    /// The provider rejected credentials or the probe failed
    #[error("[AUTH_ERROR] {provider}: {message}")]
    Authentication { provider: String, message: String },

    /// The generation call failed after exhausting retries
    #[error("[PROVIDER_ERROR] {message}")]
    Provider { message: String },

    /// One query failed inside the image phase
    #[error("[IMAGE_FETCH_ERROR] '{query}': {message}")]
    ImageFetch { query: String, message: String },

    /// Fewer than half of the requested records were produced
    #[error("[PARTIAL_RESULTS_ERROR] Only {successful_count} out of {} records were created successfully", successful_count + failed_count)]
    PartialResults {
        successful_count: usize,
        failed_count: usize,
        partial_results: Vec<CompletedRecord>,
    },

    /// Terms were produced but none survived validation
    #[error("[NO_RECORDS_CREATED] No records were created out of {requested} requested (dropped: {})", dropped_terms.join(", "))]
    NoRecordsCreated {
        requested: usize,
        dropped_terms: Vec<String>,
    },

    /// Local filesystem failure
    #[error("[FILE_OPERATION_ERROR] {path:?}: {message}")]
    FileOperation { path: PathBuf, message: String },

    /// Network failure outside of the provider retry loop
    #[error("[NETWORK_ERROR] {message}")]
    Network { url: Option<String>, message: String },

    /// The exporter could not write its output
    #[error("[CSV_EXPORT_ERROR] {path:?}: {message}")]
    Export { path: Option<PathBuf>, message: String },
}

impl GenerationError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIG_ERROR",
            Self::Authentication { .. } => "AUTH_ERROR",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::ImageFetch { .. } => "IMAGE_FETCH_ERROR",
            Self::PartialResults { .. } => "PARTIAL_RESULTS_ERROR",
            Self::NoRecordsCreated { .. } => "NO_RECORDS_CREATED",
            Self::FileOperation { .. } => "FILE_OPERATION_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Export { .. } => "CSV_EXPORT_ERROR",
        }
    }

    /// Shorthand for a validation error on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a filesystem error on a path
    pub fn file(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        Self::FileOperation {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// Whether the caller may still use output attached to this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PartialResults { .. })
    }

    /// Actionable advice for the person running the tool
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Check the topic and count: the topic must not be empty and the count must be within the configured limit.",
            Self::Configuration(message) if message.to_lowercase().contains("api key") => {
                "Set your Gemini API key with `export GEMINI_API_KEY=your-key` or `provider.api_key` in the config file. Keys are issued at https://aistudio.google.com/app/apikey."
            }
            Self::Configuration(_) => "Fix the reported setting in the config file or remove it to fall back to the default.",
            Self::Authentication { .. } => {
                "Authentication failed. Check that the API key is valid and active and that the Gemini API is reachable."
            }
            Self::Provider { message } if message.to_lowercase().contains("rate limit") => {
                "Too many requests. Wait a moment and try again with fewer flashcards."
            }
            Self::Provider { .. } => "The AI service did not return usable terms. Try again or pick a different topic.",
            Self::ImageFetch { .. } => "Some images could not be downloaded. The flashcards are still usable without them.",
            Self::PartialResults { .. } => {
                "Fewer than half of the flashcards could be created. The partial deck was saved; try again or pick a different topic."
            }
            Self::NoRecordsCreated { .. } => {
                "The AI did not provide valid Chinese translations. Try a different topic or try again."
            }
            Self::FileOperation { message, .. } | Self::Export { message, .. } => file_hint(message),
            Self::Network { .. } => "Network error. Check your internet connection and try again.",
        }
    }

    /// Records that were completed before the error, if the error carries any
    pub fn partial_results(&self) -> Option<&[CompletedRecord]> {
        match self {
            Self::PartialResults { partial_results, .. } => Some(partial_results),
            _ => None,
        }
    }
}

fn file_hint(message: &str) -> &'static str {
    let message = message.to_lowercase();
    if message.contains("permission denied") {
        "Cannot write to the output directory. Check that you have write permission for it."
    } else if message.contains("no space left") {
        "Not enough disk space to save files. Free up some space and try again."
    } else {
        "A file could not be written. Check the output directory and try again."
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a generation run
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Actionable advice printed by the CLI next to the error
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::Generation(e) => e.user_hint(),
            Self::File(message) => file_hint(message),
            Self::Unknown(_) => "Unexpected error. Check the logs for details or try again.",
        }
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<GenerationError>() {
            Ok(generation) => return Self::Generation(generation),
            Err(error) => error,
        };
        match error.downcast::<std::io::Error>() {
            Ok(io) => Self::File(io.to_string()),
            Err(error) => Self::Unknown(format!("{:#}", error)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
