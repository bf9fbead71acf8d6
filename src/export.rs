/*!
 * Export of completed records.
 *
 * `CsvExporter` writes UTF-8 CSV with minimal RFC 4180 quoting. The file is
 * written to a temporary sibling and renamed into place. Rows are validated
 * before anything touches the disk, and an exported deck can be read back
 * with [`CsvExporter::read`] or summarized with [`CsvExporter::stats`].
 */

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::errors::GenerationError;
use crate::file_utils::FileManager;
use crate::models::CompletedRecord;

/// Column header of every exported file
pub const CSV_COLUMNS: [&str; 7] = [
    "English",
    "Chinese",
    "Pinyin",
    "Example",
    "Image_Path",
    "Topic",
    "Created_Date",
];

/// Format of the `Created_Date` column
pub const CREATED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns every row must carry
pub const REQUIRED_COLUMNS: [&str; 3] = ["English", "Chinese", "Pinyin"];

static HAN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]").expect("valid han regex"));

/// A CSV document read back from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DeckTable {
    /// Value of `column` in row `row`, empty when the row is short
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|name| name == column)?;
        let row = self.rows.get(row)?;
        Some(row.get(index).map(String::as_str).unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_required_columns(&self) -> bool {
        REQUIRED_COLUMNS
            .iter()
            .all(|required| self.columns.iter().any(|column| column == required))
    }
}

/// Fill counts of one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStats {
    pub name: String,
    pub non_empty: usize,
    pub empty: usize,
}

/// Summary of an exported deck
#[derive(Debug, Clone)]
pub struct DeckStats {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub has_required_columns: bool,
    pub file_size_bytes: u64,
    pub column_stats: Vec<ColumnStats>,
}

/// Destination for finished records
pub trait Exporter: Send + Sync {
    /// Write `records`, returning the path of the created file
    ///
    /// Without a filename a timestamped default is used.
    fn export(&self, records: &[CompletedRecord], filename: Option<&str>) -> Result<PathBuf, GenerationError>;
}

/// Writes records as CSV files into an output directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_directory: PathBuf,
}

impl CsvExporter {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Resolve the final file name: default, `.csv` suffix, sanitized
    pub fn file_name(filename: Option<&str>) -> String {
        let name = match filename.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("flashcards_{}.csv", Local::now().format("%Y%m%d_%H%M%S")),
        };

        let split = name.len().saturating_sub(4);
        let stem = if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".csv") {
            name[..split].to_string()
        } else {
            name
        };
        let stem = FileManager::sanitize_filename(&stem);
        let stem = if stem.is_empty() { "flashcards".to_string() } else { stem };
        format!("{}.csv", stem)
    }

    /// Field values of one record in `CSV_COLUMNS` order
    pub fn row(record: &CompletedRecord) -> Vec<String> {
        let image = record
            .image_local_path()
            .map(|path| path.display().to_string())
            .or_else(|| record.image_remote_url().map(str::to_string))
            .unwrap_or_default();

        vec![
            record.source_term().to_string(),
            record.target_term().to_string(),
            record.pronunciation().to_string(),
            record.example().unwrap_or_default().to_string(),
            image,
            record.topic().unwrap_or_default().to_string(),
            record.created_at().format(CREATED_DATE_FORMAT).to_string(),
        ]
    }

    /// Render the CSV document
    pub fn render(records: &[CompletedRecord]) -> String {
        let rows: Vec<Vec<String>> = records.iter().map(Self::row).collect();
        render_rows(&rows)
    }

    /// Check every row of a table before it is written or after it is read
    ///
    /// English and Pinyin must be non-blank, Chinese must contain at least
    /// one Han character and a present `Created_Date` must parse.
    pub fn validate(table: &DeckTable) -> Result<(), GenerationError> {
        if table.is_empty() {
            return Err(GenerationError::validation("rows", "CSV data is empty"));
        }
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|required| !table.columns.iter().any(|column| column == *required))
        {
            return Err(GenerationError::validation(
                "columns",
                format!("Missing required column: {}", missing),
            ));
        }

        for index in 0..table.len() {
            let value = |column: &str| table.get(index, column).unwrap_or_default().trim();

            if value("English").is_empty() {
                return Err(row_error(index, "English word is empty"));
            }
            let chinese = value("Chinese");
            if chinese.is_empty() {
                return Err(row_error(index, "Chinese translation is empty"));
            }
            if !HAN_REGEX.is_match(chinese) {
                return Err(row_error(index, "Chinese translation does not contain Chinese characters"));
            }
            if value("Pinyin").is_empty() {
                return Err(row_error(index, "Pinyin is empty"));
            }
            let created = value("Created_Date");
            if !created.is_empty() && NaiveDateTime::parse_from_str(created, CREATED_DATE_FORMAT).is_err() {
                return Err(row_error(index, &format!("Invalid date format: {}", created)));
            }
        }

        Ok(())
    }

    /// Read an exported deck back into memory
    pub fn read(path: impl AsRef<Path>) -> Result<DeckTable, GenerationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GenerationError::file(path, e))?;

        let mut records = parse_csv(&content).map_err(|message| GenerationError::Export {
            path: Some(path.to_path_buf()),
            message,
        })?;
        if records.is_empty() {
            return Ok(DeckTable {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }
        let columns = records.remove(0);

        info!("Successfully read {} rows from {:?}", records.len(), path);
        Ok(DeckTable { columns, rows: records })
    }

    /// Row count, columns and per-column fill counts of an exported deck
    pub fn stats(path: impl AsRef<Path>) -> Result<DeckStats, GenerationError> {
        let path = path.as_ref();
        let table = Self::read(path)?;
        let file_size_bytes = std::fs::metadata(path).map_err(|e| GenerationError::file(path, e))?.len();

        let column_stats = table
            .columns
            .iter()
            .map(|column| {
                let non_empty = (0..table.len())
                    .filter(|&row| !table.get(row, column).unwrap_or_default().trim().is_empty())
                    .count();
                ColumnStats {
                    name: column.clone(),
                    non_empty,
                    empty: table.len() - non_empty,
                }
            })
            .collect();

        Ok(DeckStats {
            total_rows: table.len(),
            has_required_columns: !table.is_empty() && table.has_required_columns(),
            columns: table.columns,
            file_size_bytes,
            column_stats,
        })
    }
}

impl Exporter for CsvExporter {
    fn export(&self, records: &[CompletedRecord], filename: Option<&str>) -> Result<PathBuf, GenerationError> {
        if records.is_empty() {
            return Err(GenerationError::Export {
                path: None,
                message: "Cannot export empty record list".to_string(),
            });
        }

        let path = self.output_directory.join(Self::file_name(filename));
        let export_error = |message: String| {
            error!("Failed to export records to {:?}: {}", path, message);
            GenerationError::Export {
                path: Some(path.clone()),
                message,
            }
        };

        FileManager::ensure_dir(&self.output_directory).map_err(|e| export_error(e.to_string()))?;

        let table = DeckTable {
            columns: CSV_COLUMNS.iter().map(|column| column.to_string()).collect(),
            rows: records.iter().map(Self::row).collect(),
        };
        if let Err(e) = Self::validate(&table) {
            warn!("Refusing to export invalid rows: {}", e);
            return Err(export_error(e.to_string()));
        }

        let content = render_rows(&table.rows);
        let mut tmp = NamedTempFile::new_in(&self.output_directory).map_err(|e| export_error(e.to_string()))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| export_error(e.to_string()))?;
        tmp.persist(&path).map_err(|e| export_error(e.error.to_string()))?;

        info!("Successfully exported {} records to {:?}", records.len(), path);
        Ok(path)
    }
}

fn row_error(index: usize, message: &str) -> GenerationError {
    error!("Row {}: {}", index, message);
    GenerationError::validation(format!("row {}", index), message)
}

fn render_rows(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push_str("\r\n");

    for row in rows {
        let escaped: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        out.push_str(&escaped.join(","));
        out.push_str("\r\n");
    }
    out
}

/// Split a CSV document into records of fields
///
/// Accepts quoted fields with doubled quotes and embedded line breaks, and
/// both CRLF and LF record separators.
fn parse_csv(content: &str) -> Result<Vec<Vec<String>>, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// Quote a field when it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
