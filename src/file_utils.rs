use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

// @module: File and directory utilities

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s.-]").expect("valid filename regex"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Longest file stem produced by `sanitize_filename`
pub const MAX_FILENAME_CHARS: usize = 50;

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Find files with one of the given extensions in a directory tree
    pub fn find_files<P: AsRef<Path>>(dir: P, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        if !Self::dir_exists(&dir) {
            return Ok(result);
        }

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy();
                    if extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.'))) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        Ok(result)
    }

    /// Delete files with one of the given extensions whose mtime is older than `max_age`
    ///
    /// Returns the number of files removed. Files that cannot be inspected or
    /// removed are skipped.
    pub fn remove_files_older_than<P: AsRef<Path>>(dir: P, extensions: &[&str], max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for path in Self::find_files(&dir, extensions)? {
            let age = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if matches!(age, Some(age) if age > max_age) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        log::debug!("Removed old file {:?}", path);
                        removed += 1;
                    }
                    Err(e) => log::warn!("Failed to remove old file {:?}: {}", path, e),
                }
            }
        }

        Ok(removed)
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Make a string safe to use as a file name
    ///
    /// Drops characters other than word characters, whitespace, dots and
    /// hyphens, turns whitespace runs into underscores and caps the result
    /// at [`MAX_FILENAME_CHARS`] characters.
    pub fn sanitize_filename(name: &str) -> String {
        let stripped = UNSAFE_FILENAME_CHARS.replace_all(name, "");
        let underscored = WHITESPACE_RUN.replace_all(&stripped, "_");
        underscored
            .trim_matches('_')
            .chars()
            .take(MAX_FILENAME_CHARS)
            .collect()
    }
}
