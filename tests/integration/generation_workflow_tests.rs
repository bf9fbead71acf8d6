/*!
 * End-to-end generation runs against in-process providers and resolvers
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lexicard::app_config::Config;
use lexicard::errors::GenerationError;
use lexicard::export::CsvExporter;
use lexicard::generation::cache::{CACHE_FORMAT_VERSION, TERMS_CACHE_FILE, cache_key};
use lexicard::generation::{ContentCache, GenerationOrchestrator, OrchestratorOptions, TranslationClient};
use lexicard::images::FetchMode;
use lexicard::providers::mock::MockProvider;
use lexicard::{Controller, GenerationRequest};

use crate::common::{self, TableResolver};

fn options(output: &Path) -> OrchestratorOptions {
    OrchestratorOptions {
        output_directory: output.to_path_buf(),
        ..Default::default()
    }
}

fn orchestrator(provider: &MockProvider, output: &Path) -> GenerationOrchestrator {
    common::init_logging();
    let client = TranslationClient::new(Arc::new(provider.clone())).with_retry_policy(3, Duration::ZERO);
    GenerationOrchestrator::new(client, options(output)).with_exporter(Arc::new(CsvExporter::new(output)))
}

fn csv_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".csv"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_generate_animals_shouldAttachAvailableImages() {
    let dir = common::create_temp_dir();
    let cat = common::write_jpeg(dir.path(), "cat.jpg");
    let dog = common::write_jpeg(dir.path(), "dog.jpg");
    let resolver = TableResolver::new(&[("cat", cat.as_path()), ("dog", dog.as_path())]);

    let provider = MockProvider::working();
    let mut orchestrator = orchestrator(&provider, dir.path()).with_resolver(Arc::new(resolver));

    let records = orchestrator.generate("animals", 3, None).await.unwrap();

    let terms: Vec<&str> = records.iter().map(|r| r.source_term()).collect();
    assert_eq!(terms, vec!["cat", "dog", "bird"]);
    assert_eq!(records[0].image_local_path(), Some(cat.as_path()));
    assert_eq!(records[1].image_local_path(), Some(dog.as_path()));
    assert_eq!(records[2].image_local_path(), None);
    assert_eq!(records[0].image_remote_url(), Some("https://img.example/cat.jpg"));
    assert_eq!(records[2].image_remote_url(), None);
    assert!(records.iter().all(|r| r.topic() == Some("animals")));

    let stats = orchestrator.get_statistics();
    assert_eq!(stats.words_generated, 3);
    assert_eq!(stats.flashcards_created, 3);
    assert_eq!(stats.images_downloaded, 2);
    assert_eq!(stats.image_errors, 0);
    assert!(!stats.cache_hit);
    assert!(stats.duration().is_some());
}

#[tokio::test]
async fn test_run_animals_shouldExportOneRowPerRecord() {
    let dir = common::create_temp_dir();
    let provider = MockProvider::working();
    let mut orchestrator = orchestrator(&provider, dir.path()).with_resolver(Arc::new(TableResolver::default()));

    let path = orchestrator.run("animals", 3, Some("animals.csv"), None).await.unwrap();

    assert_eq!(path, dir.path().join("animals.csv"));
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 4);
    assert!(content.contains("dog,狗,gou3,I like the dog.,,animals,"));
}

#[tokio::test]
async fn test_generate_withLessThanHalfSurviving_shouldReturnPartialResults() {
    let dir = common::create_temp_dir();
    let provider = MockProvider::working().with_response(MockProvider::terms_json(&[
        ("cat", "猫", "mao1"),
        ("dog", "狗", "gou3"),
    ]));
    let mut orchestrator = orchestrator(&provider, dir.path());

    let err = orchestrator.generate("animals", 5, None).await.unwrap_err();

    match &err {
        GenerationError::PartialResults {
            successful_count,
            failed_count,
            partial_results,
        } => {
            assert_eq!(*successful_count, 2);
            assert_eq!(*failed_count, 3);
            assert_eq!(partial_results.len(), 2);
        }
        other => panic!("expected partial results, got {}", other),
    }
    assert!(err.is_recoverable());
    assert_eq!(err.code(), "PARTIAL_RESULTS_ERROR");
}

#[tokio::test]
async fn test_generate_withAtLeastHalfSurviving_shouldSucceedWithShortfall() {
    let dir = common::create_temp_dir();
    let provider = MockProvider::working();
    let mut orchestrator = orchestrator(&provider, dir.path());

    let records = orchestrator.generate("animals", 5, None).await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(orchestrator.get_statistics().flashcards_created, 3);
}

#[tokio::test]
async fn test_run_withPartialResults_shouldSavePartialFile() {
    let dir = common::create_temp_dir();
    let provider = MockProvider::working().with_response(MockProvider::terms_json(&[("cat", "猫", "mao1")]));
    let mut orchestrator = orchestrator(&provider, dir.path());

    let err = orchestrator.run("animals", 4, Some("deck"), None).await.unwrap_err();

    assert_eq!(err.code(), "PARTIAL_RESULTS_ERROR");
    let files = csv_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("partial_animals_"));
}

#[tokio::test]
async fn test_generate_withPersistentCache_shouldReuseTermsAcrossRuns() {
    let dir = common::create_temp_dir();
    let cache_path = dir.path().join("cache").join(TERMS_CACHE_FILE);
    let provider = MockProvider::working();

    {
        let cache = Arc::new(ContentCache::open(&cache_path, Duration::from_secs(3600)));
        let mut first = orchestrator(&provider, dir.path()).with_terms_cache(cache);
        first.generate("animals", 3, None).await.unwrap();
        assert!(!first.get_statistics().cache_hit);
    }
    assert_eq!(provider.request_count(), 2);

    let cache = Arc::new(ContentCache::open(&cache_path, Duration::from_secs(3600)));
    let mut second = orchestrator(&provider, dir.path()).with_terms_cache(cache);
    let records = second.generate("Animals", 3, None).await.unwrap();

    assert_eq!(records.len(), 3);
    assert!(second.get_statistics().cache_hit);
    // a new client probes once, generation is served from the cache
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn test_generate_withInvalidCachedTerms_shouldReportNoRecordsCreated() {
    let dir = common::create_temp_dir();
    let cache_path = dir.path().join(TERMS_CACHE_FILE);
    let document = serde_json::json!({
        "version": CACHE_FORMAT_VERSION,
        "created_at": chrono::Utc::now(),
        "entries": [{
            "key": cache_key("animals:2"),
            "payload": [
                { "source_term": "cat", "target_term": "cat", "pronunciation": "mao1" },
                { "source_term": "dog!", "target_term": "狗", "pronunciation": "gou3" }
            ],
            "written_at": chrono::Utc::now()
        }]
    });
    std::fs::write(&cache_path, document.to_string()).unwrap();

    let provider = MockProvider::working();
    let cache = Arc::new(ContentCache::open(&cache_path, Duration::from_secs(3600)));
    let mut orchestrator = orchestrator(&provider, dir.path()).with_terms_cache(cache);

    let err = orchestrator.generate("animals", 2, None).await.unwrap_err();

    match err {
        GenerationError::NoRecordsCreated { requested, dropped_terms } => {
            assert_eq!(requested, 2);
            assert_eq!(dropped_terms, vec!["cat".to_string(), "dog!".to_string()]);
        }
        other => panic!("expected no records, got {}", other),
    }
    assert_eq!(orchestrator.get_statistics().validation_errors, 2);
}

#[tokio::test]
async fn test_generate_withFailingProvider_shouldCountApiError() {
    let dir = common::create_temp_dir();
    let provider = MockProvider::scripted(|index, _| {
        if index == 0 {
            Ok("Hi".to_string())
        } else {
            Err(lexicard::ProviderError::ApiError {
                status_code: 500,
                message: "internal".to_string(),
            })
        }
    });
    let mut orchestrator = orchestrator(&provider, dir.path());

    let err = orchestrator.generate("animals", 3, None).await.unwrap_err();

    assert_eq!(err.code(), "PROVIDER_ERROR");
    assert_eq!(orchestrator.get_statistics().api_errors, 1);
    assert!(csv_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_generate_withSequentialFetch_shouldResolveInOrder() {
    let dir = common::create_temp_dir();
    let bird = common::write_jpeg(dir.path(), "bird.png");
    let resolver = TableResolver::new(&[("bird", bird.as_path())]);

    let provider = MockProvider::working();
    let client = TranslationClient::new(Arc::new(provider.clone()));
    let options = OrchestratorOptions {
        fetch_mode: FetchMode::Sequential,
        sequential_delay: Duration::from_millis(1),
        ..options(dir.path())
    };
    let mut orchestrator = GenerationOrchestrator::new(client, options).with_resolver(Arc::new(resolver));

    let records = orchestrator.generate("animals", 3, None).await.unwrap();

    assert_eq!(records[2].image_local_path(), Some(bird.as_path()));
    assert_eq!(orchestrator.get_statistics().images_downloaded, 1);
}

#[tokio::test]
async fn test_controller_withoutImages_shouldExportAndPersistCache() {
    let dir = common::create_temp_dir();
    let mut config = Config::default();
    config.output_directory = dir.path().join("decks");
    config.image_enabled = false;
    config.provider.retry_backoff_ms = 0;

    let provider = MockProvider::working();
    let controller = Controller::with_provider(config, Arc::new(provider.clone())).unwrap();
    let request = GenerationRequest {
        topic: "animals".to_string(),
        count: 3,
        context: Some("zoo".to_string()),
        filename: Some("zoo".to_string()),
    };

    let path = controller.run(&request).await.unwrap();

    assert_eq!(path, dir.path().join("decks").join("zoo.csv"));
    assert!(dir.path().join("decks").join("cache").join(TERMS_CACHE_FILE).exists());
    assert!(provider.prompts()[1].contains("zoo"));

    let cleaned = controller.cleanup(30).unwrap();
    assert_eq!(cleaned.total(), 0);
    assert!(path.exists());
}
