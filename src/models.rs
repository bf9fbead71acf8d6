/*!
 * Data models for generated study material.
 *
 * - `TermRecord`: one English/Chinese/pinyin triple as produced by the provider
 * - `CompletedRecord`: a term record enriched with image and topic metadata
 */

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Image file extensions accepted for a record's local image
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

static SOURCE_TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s\-']+$").expect("valid source term regex"));

static CJK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]").expect("valid CJK regex"));

static PRONUNCIATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s\d]+$").expect("valid pronunciation regex"));

/// A generated word pair with pronunciation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    source_term: String,
    target_term: String,
    pronunciation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl TermRecord {
    /// Create a validated term record
    ///
    /// Required fields are trimmed; the record is rejected with a
    /// `Validation` error naming the first offending field.
    pub fn new(
        source_term: impl Into<String>,
        target_term: impl Into<String>,
        pronunciation: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let record = Self {
            source_term: source_term.into().trim().to_string(),
            target_term: target_term.into().trim().to_string(),
            pronunciation: pronunciation.into().trim().to_string(),
            example: None,
            context: None,
        };
        record.validate()?;
        Ok(record)
    }

    /// Attach an example sentence
    pub fn with_example(mut self, example: Option<String>) -> Self {
        self.example = example
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        self
    }

    /// Attach the generation context
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    /// Check every field invariant
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.source_term.trim().is_empty() {
            return Err(GenerationError::validation("source_term", "English word cannot be empty"));
        }
        if self.target_term.trim().is_empty() {
            return Err(GenerationError::validation("target_term", "Chinese translation cannot be empty"));
        }
        if self.pronunciation.trim().is_empty() {
            return Err(GenerationError::validation("pronunciation", "Pinyin cannot be empty"));
        }
        if !SOURCE_TERM_RE.is_match(self.source_term.trim()) {
            return Err(GenerationError::validation(
                "source_term",
                format!("'{}' contains invalid characters", self.source_term),
            ));
        }
        if !CJK_RE.is_match(&self.target_term) {
            return Err(GenerationError::validation(
                "target_term",
                format!("'{}' must contain Chinese characters", self.target_term),
            ));
        }
        if !PRONUNCIATION_RE.is_match(self.pronunciation.trim()) {
            return Err(GenerationError::validation(
                "pronunciation",
                format!("'{}' contains invalid characters", self.pronunciation),
            ));
        }
        Ok(())
    }

    pub fn source_term(&self) -> &str {
        &self.source_term
    }

    pub fn target_term(&self) -> &str {
        &self.target_term
    }

    pub fn pronunciation(&self) -> &str {
        &self.pronunciation
    }

    pub fn example(&self) -> Option<&str> {
        self.example.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// A finished flashcard ready for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    term: TermRecord,
    image_remote_url: Option<String>,
    image_local_path: Option<PathBuf>,
    topic: Option<String>,
    created_at: DateTime<Local>,
}

impl CompletedRecord {
    /// Build a draft record from a term, re-validating the term
    pub fn from_term(term: TermRecord, topic: Option<&str>) -> Result<Self, GenerationError> {
        term.validate()?;
        Ok(Self {
            term,
            image_remote_url: None,
            image_local_path: None,
            topic: topic.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            created_at: Local::now(),
        })
    }

    /// Attach the resolved image
    ///
    /// The extension must be one of [`IMAGE_EXTENSIONS`].
    pub fn attach_image(&mut self, path: PathBuf) -> Result<(), GenerationError> {
        if !has_image_extension(&path) {
            return Err(GenerationError::validation(
                "image_local_path",
                format!("invalid image file extension: {:?}", path),
            ));
        }
        self.image_local_path = Some(path);
        Ok(())
    }

    /// Record where the image was found
    pub fn set_image_remote_url(&mut self, url: impl Into<String>) {
        self.image_remote_url = Some(url.into());
    }

    pub fn term(&self) -> &TermRecord {
        &self.term
    }

    pub fn source_term(&self) -> &str {
        self.term.source_term()
    }

    pub fn target_term(&self) -> &str {
        self.term.target_term()
    }

    pub fn pronunciation(&self) -> &str {
        self.term.pronunciation()
    }

    pub fn example(&self) -> Option<&str> {
        self.term.example()
    }

    pub fn image_remote_url(&self) -> Option<&str> {
        self.image_remote_url.as_deref()
    }

    pub fn image_local_path(&self) -> Option<&Path> {
        self.image_local_path.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

/// Whether a path ends in one of the accepted image extensions
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
