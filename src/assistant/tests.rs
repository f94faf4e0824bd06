use super::*;
use crate::AssistError;
use crate::config::{GenerationConfig, OllamaConfig, RetrievalConfig};
use crate::corpus::{CorpusItem, StaticCorpus};
use crate::synthesis::{GenerationOptions, SolutionSource};
use crate::test_support::{KeywordEmbedder, ScriptedGenerator, sample_corpus};
use tempfile::TempDir;

fn assistant_with(
    generator: Option<Arc<dyn GenerativeProvider>>,
    timeout: Duration,
) -> IncidentAssistant {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder::new());
    let engine = Arc::new(RetrievalEngine::new(Arc::clone(&embedder)));
    let monitor = FreshnessMonitor::new(
        Arc::new(StaticCorpus::new(sample_corpus())),
        IndexBuilder::new(embedder),
        Arc::clone(&engine),
    );
    let synthesizer = SolutionSynthesizer::new(generator).with_options(GenerationOptions {
        timeout,
        ..GenerationOptions::default()
    });
    IncidentAssistant::from_parts(engine, synthesizer, monitor)
}

#[tokio::test]
async fn solve_before_refresh_is_unavailable() {
    let assistant = assistant_with(None, Duration::from_secs(1));
    let error = assistant
        .solve("service down", None)
        .await
        .expect_err("no index yet");
    assert!(error.is_index_unavailable());
}

#[tokio::test]
async fn solve_with_failing_generator_aggregates_evidence() {
    let generator = Arc::new(ScriptedGenerator::failing("unreachable"));
    let assistant = assistant_with(Some(generator), Duration::from_secs(5));
    assistant.refresh().await.expect("refresh");

    let resolution = assistant
        .solve("payment service down", Some(1))
        .await
        .expect("solve");

    assert_eq!(resolution.evidence.len(), 1);
    assert_eq!(resolution.solution.source, SolutionSource::Aggregated);
    assert_eq!(resolution.solution.steps, vec!["INC1: Restart service A"]);
}

#[tokio::test]
async fn solve_with_working_generator_is_ai_generated() {
    let generator = Arc::new(ScriptedGenerator::replying(
        "Step 1: Restart service A\nStep 2: Watch error rates",
    ));
    let assistant = assistant_with(
        Some(Arc::clone(&generator) as Arc<dyn GenerativeProvider>),
        Duration::from_secs(5),
    );
    assistant.refresh().await.expect("refresh");

    let resolution = assistant.solve("service down", None).await.expect("solve");

    assert_eq!(resolution.query, "service down");
    assert_eq!(resolution.evidence.len(), 4);
    assert_eq!(resolution.solution.source, SolutionSource::AiGenerated);
    assert_eq!(resolution.solution.steps.len(), 2);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn slow_generator_times_out_into_aggregation() {
    let generator = Arc::new(
        ScriptedGenerator::replying("Step 1: too late").with_delay(Duration::from_millis(500)),
    );
    let assistant = assistant_with(Some(generator), Duration::from_millis(50));
    assistant.refresh().await.expect("refresh");

    let evidence = assistant.search("payment service down", 2).await.expect("search");
    let solution = assistant.synthesize("payment service down", &evidence).await;

    assert_eq!(solution.source, SolutionSource::Aggregated);
    assert_eq!(solution.steps.len(), 2);
    assert_eq!(solution.steps[0], "INC1: Restart service A");
}

#[tokio::test]
async fn empty_evidence_never_reaches_the_generator() {
    let generator = Arc::new(ScriptedGenerator::replying("Step 1: anything"));
    let assistant = assistant_with(
        Some(Arc::clone(&generator) as Arc<dyn GenerativeProvider>),
        Duration::from_secs(1),
    );

    let solution = assistant.synthesize("query", &[]).await;
    assert_eq!(solution, SolutionResponse::empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn restore_activates_matching_persisted_index() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = IndexStore::open(temp_dir.path().join("index.db"))
        .await
        .expect("store opens");
    let persisted = IndexBuilder::new(Arc::new(KeywordEmbedder::new()))
        .with_store(store.clone())
        .build(sample_corpus())
        .await
        .expect("build");

    let assistant = assistant_with(None, Duration::from_secs(1));
    assert!(assistant.restore(&store).await.expect("restore"));
    assert_eq!(
        assistant.engine().snapshot().map(|s| s.id()),
        Some(persisted.id())
    );

    let status = assistant.status().await.expect("status");
    assert!(status.fresh);
}

#[tokio::test]
async fn restore_ignores_index_from_another_model() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = IndexStore::open(temp_dir.path().join("index.db"))
        .await
        .expect("store opens");
    let foreign = Index::new(
        "fp".to_string(),
        "other-model".to_string(),
        sample_corpus(),
        vec![vec![1.0, 0.0]; 4],
    )
    .expect("valid index");
    store.persist(&foreign).await.expect("persist");

    let assistant = assistant_with(None, Duration::from_secs(1));
    assert!(!assistant.restore(&store).await.expect("restore"));
    assert!(assistant.engine().snapshot().is_none());
}

#[tokio::test]
async fn open_without_corpus_starts_with_no_index() {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = Config {
        ollama: OllamaConfig::default(),
        generation: GenerationConfig {
            enabled: false,
            ..GenerationConfig::default()
        },
        retrieval: RetrievalConfig {
            default_k: 3,
            auto_rebuild: true,
            ..RetrievalConfig::default()
        },
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let assistant = IncidentAssistant::open(&config).await.expect("opens");

    assert_eq!(assistant.default_k(), 3);
    assert!(assistant.engine().snapshot().is_none());
    assert!(matches!(
        assistant.search("service down", 1).await,
        Err(AssistError::IndexUnavailable)
    ));
    assert!(config.index_path().exists());
}

#[test]
fn mapped_articles_need_an_active_index() {
    let assistant = assistant_with(None, Duration::from_secs(1));
    assert!(matches!(
        assistant.mapped_kb_articles(&[]),
        Err(AssistError::IndexUnavailable)
    ));
}

#[tokio::test]
async fn search_results_map_to_linked_articles() {
    let corpus = vec![
        CorpusItem::incident("INC1", "Payment gateway down", "Restart the gateway")
            .with_application("payments")
            .with_root_cause("gateway"),
        CorpusItem::kb_article("KB1", "Gateway restart runbook", "Restart the gateway service")
            .with_application("payments"),
        CorpusItem::kb_article("KB2", "Gateway login errors", "Reset the password")
            .with_application("auth"),
    ];
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder::new());
    let engine = Arc::new(RetrievalEngine::new(Arc::clone(&embedder)));
    let monitor = FreshnessMonitor::new(
        Arc::new(StaticCorpus::new(corpus)),
        IndexBuilder::new(embedder),
        Arc::clone(&engine),
    );
    let assistant = IncidentAssistant::from_parts(engine, SolutionSynthesizer::new(None), monitor);
    assistant.refresh().await.expect("refresh");

    let results = assistant
        .search("payment gateway down", 1)
        .await
        .expect("search");
    assert_eq!(results[0].id, "INC1");

    let mapped = assistant.mapped_kb_articles(&results).expect("mapped");
    let ids: Vec<&str> = mapped.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["KB1"]);
}
