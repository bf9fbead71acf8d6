/*!
 * Tests for CSV export
 */

use std::path::PathBuf;

use lexicard::export::{CSV_COLUMNS, CsvExporter, DeckTable, Exporter};
use lexicard::models::{CompletedRecord, TermRecord};

use crate::common;

fn record(english: &str, chinese: &str, pinyin: &str, example: Option<&str>) -> CompletedRecord {
    let term = TermRecord::new(english, chinese, pinyin)
        .unwrap()
        .with_example(example.map(str::to_string));
    CompletedRecord::from_term(term, Some("animals")).unwrap()
}

#[test]
fn test_render_shouldWriteHeaderAndQuoteSpecialFields() {
    let mut with_image = record("cat", "猫", "mao1", Some("The cat sleeps, purring.<br>猫在睡觉。"));
    with_image.attach_image(PathBuf::from("images/cat_1234abcd.jpg")).unwrap();
    let mut remote_only = record("dog", "狗", "gou3", None);
    remote_only.set_image_remote_url("https://img.example/dog.jpg");

    let csv = CsvExporter::render(&[with_image, remote_only]);
    let lines: Vec<&str> = csv.split("\r\n").collect();

    assert_eq!(lines[0], CSV_COLUMNS.join(","));
    assert!(lines[1].starts_with("cat,猫,mao1,\"The cat sleeps, purring.<br>猫在睡觉。\",images/cat_1234abcd.jpg,animals,"));
    assert!(lines[2].starts_with("dog,狗,gou3,,https://img.example/dog.jpg,animals,"));
    assert_eq!(lines[3], "");
}

#[test]
fn test_export_shouldCreateNamedFileInOutputDirectory() {
    let dir = common::create_temp_dir();
    let exporter = CsvExporter::new(dir.path().join("out"));

    let path = exporter
        .export(&[record("bird", "鸟", "niao3", None)], Some("my deck"))
        .unwrap();

    assert_eq!(path, dir.path().join("out").join("my_deck.csv"));
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("English,Chinese,Pinyin,Example,Image_Path,Topic,Created_Date\r\n"));
    assert!(content.contains("bird,鸟,niao3,,,animals,"));
}

#[test]
fn test_export_withEmptyRecords_shouldFail() {
    let dir = common::create_temp_dir();
    let exporter = CsvExporter::new(dir.path());

    let err = exporter.export(&[], None).unwrap_err();

    assert_eq!(err.code(), "CSV_EXPORT_ERROR");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_export_withoutFilename_shouldUseTimestampedDefault() {
    let dir = common::create_temp_dir();
    let exporter = CsvExporter::new(dir.path());

    let path = exporter.export(&[record("cat", "猫", "mao1", None)], None).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();

    assert!(name.starts_with("flashcards_"));
    assert!(name.ends_with(".csv"));
}

#[test]
fn test_read_shouldRoundTripExportedDeck() {
    let dir = common::create_temp_dir();
    let exporter = CsvExporter::new(dir.path());
    let records = vec![
        record("cat", "猫", "mao1", Some("The cat sleeps, purring.")),
        record("dog", "狗", "gou3", None),
    ];

    let path = exporter.export(&records, Some("pets")).unwrap();
    let table = CsvExporter::read(&path).unwrap();

    assert_eq!(table.columns, CSV_COLUMNS.to_vec());
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "Example"), Some("The cat sleeps, purring."));
    assert_eq!(table.get(1, "Chinese"), Some("狗"));
    assert_eq!(table.get(1, "Example"), Some(""));
    assert!(CsvExporter::validate(&table).is_ok());
}

#[test]
fn test_stats_shouldCountFilledColumns() {
    let dir = common::create_temp_dir();
    let exporter = CsvExporter::new(dir.path());
    let records = vec![
        record("cat", "猫", "mao1", Some("A cat.")),
        record("dog", "狗", "gou3", None),
        record("bird", "鸟", "niao3", None),
    ];
    let path = exporter.export(&records, Some("stats")).unwrap();

    let stats = CsvExporter::stats(&path).unwrap();

    assert_eq!(stats.total_rows, 3);
    assert!(stats.has_required_columns);
    assert_eq!(stats.file_size_bytes, std::fs::metadata(&path).unwrap().len());
    let example = stats.column_stats.iter().find(|c| c.name == "Example").unwrap();
    assert_eq!((example.non_empty, example.empty), (1, 2));
    let english = stats.column_stats.iter().find(|c| c.name == "English").unwrap();
    assert_eq!(english.non_empty, 3);
}

#[test]
fn test_read_withMissingFile_shouldFailWithFileError() {
    let dir = common::create_temp_dir();

    let err = CsvExporter::read(dir.path().join("missing.csv")).unwrap_err();
    assert_eq!(err.code(), "FILE_OPERATION_ERROR");
}

#[test]
fn test_validate_withBadRows_shouldNameTheRow() {
    let columns: Vec<String> = CSV_COLUMNS.iter().map(|c| c.to_string()).collect();
    let row = |english: &str, chinese: &str, pinyin: &str, date: &str| -> Vec<String> {
        vec![english, chinese, pinyin, "", "", "", date]
            .into_iter()
            .map(str::to_string)
            .collect()
    };
    let good = row("cat", "猫", "mao1", "2024-01-02 03:04:05");

    for bad in [
        row("  ", "猫", "mao1", ""),
        row("cat", "cat", "mao1", ""),
        row("cat", "猫", "", ""),
        row("cat", "猫", "mao1", "yesterday"),
    ] {
        let table = DeckTable {
            columns: columns.clone(),
            rows: vec![good.clone(), bad],
        };
        let err = CsvExporter::validate(&table).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("row 1"), "{}", err);
    }

    let without_pinyin = DeckTable {
        columns: vec!["English".to_string(), "Chinese".to_string()],
        rows: vec![vec!["cat".to_string(), "猫".to_string()]],
    };
    assert!(CsvExporter::validate(&without_pinyin).is_err());
}
