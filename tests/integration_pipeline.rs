#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use std::path::Path;
use std::sync::Arc;

use incident_assist::assistant::IncidentAssistant;
use incident_assist::corpus::{
    CorpusKind, CorpusSource, INCIDENTS_FILE, JsonCorpusSource, KB_ARTICLES_FILE,
};
use incident_assist::embeddings::EmbeddingProvider;
use incident_assist::freshness::FreshnessMonitor;
use incident_assist::index::{IndexBuilder, IndexStore};
use incident_assist::retrieval::{RetrievalEngine, filter_by_kind};
use incident_assist::synthesis::{
    GenerationOptions, GenerativeProvider, SolutionSource, SolutionSynthesizer,
};
use incident_assist::{AssistError, Result};
use serde_json::json;
use tempfile::TempDir;

const TERMS: &[&str] = &[
    "payment", "gateway", "down", "restart", "cache", "stale", "disk", "full", "vpn", "login",
    "password", "latency",
];

/// Term-count embedder: deterministic and cheap
struct TermEmbedder;

impl EmbeddingProvider for TermEmbedder {
    fn model_name(&self) -> &str {
        "term-embedder"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; TERMS.len() + 1];
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if let Some(position) = TERMS.iter().position(|term| *term == token) {
                vector[position] += 1.0;
            }
        }
        vector[TERMS.len()] = 0.1;
        Ok(vector)
    }
}

struct Unreachable;

impl GenerativeProvider for Unreachable {
    fn model_name(&self) -> &str {
        "unreachable"
    }

    fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(AssistError::Generation("connection refused".to_string()))
    }
}

fn write_corpus(dir: &Path, incidents: serde_json::Value, articles: serde_json::Value) {
    std::fs::write(dir.join(INCIDENTS_FILE), incidents.to_string()).expect("write incidents");
    std::fs::write(dir.join(KB_ARTICLES_FILE), articles.to_string()).expect("write articles");
}

fn base_incidents() -> serde_json::Value {
    json!([
        {
            "incident_id": "INC1",
            "issue_description": "Payment gateway down for all users",
            "resolution": "Restart service A",
            "application": "payments",
            "severity": "P1"
        },
        {
            "incident_id": "INC2",
            "issue_description": "Stale cache on payment gateway",
            "resolution": "Clear cache B"
        },
        {
            "incident_id": "INC3",
            "issue_description": "VPN latency spikes",
            "resolution": "Move users to the secondary concentrator"
        }
    ])
}

fn base_articles() -> serde_json::Value {
    json!([
        {
            "kb_id": "KB1",
            "title": "Disk full on database hosts",
            "content": "Rotate and compress logs, then expand the volume"
        },
        {
            "kb_id": "KB2",
            "title": "Login password resets",
            "content": "Reset the password from the identity portal"
        }
    ])
}

struct Pipeline {
    _temp_dir: TempDir,
    corpus_dir: std::path::PathBuf,
    store: IndexStore,
    assistant: IncidentAssistant,
}

async fn pipeline(generator: Option<Arc<dyn GenerativeProvider>>) -> Pipeline {
    let temp_dir = TempDir::new().expect("temp dir");
    let corpus_dir = temp_dir.path().join("corpus");
    std::fs::create_dir_all(&corpus_dir).expect("corpus dir");
    write_corpus(&corpus_dir, base_incidents(), base_articles());

    let store = IndexStore::open(temp_dir.path().join("index.db"))
        .await
        .expect("store opens");
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TermEmbedder);
    let engine = Arc::new(RetrievalEngine::new(Arc::clone(&embedder)));
    let source: Arc<dyn CorpusSource> = Arc::new(JsonCorpusSource::new(&corpus_dir));
    let monitor = FreshnessMonitor::new(
        source,
        IndexBuilder::new(embedder).with_store(store.clone()),
        Arc::clone(&engine),
    );
    let assistant =
        IncidentAssistant::from_parts(engine, SolutionSynthesizer::new(generator), monitor);

    Pipeline {
        _temp_dir: temp_dir,
        corpus_dir,
        store,
        assistant,
    }
}

#[tokio::test]
async fn search_returns_bounded_ranked_results() {
    let pipeline = pipeline(None).await;
    pipeline.assistant.refresh().await.expect("refresh");

    for k in 1..=7 {
        let results = pipeline
            .assistant
            .search("payment gateway down", k)
            .await
            .expect("search");
        assert_eq!(results.len(), k.min(5));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    let results = pipeline
        .assistant
        .search("payment gateway down", 5)
        .await
        .expect("search");
    assert_eq!(results[0].id, "INC1");
    assert_eq!(results[0].application.as_deref(), Some("payments"));

    let articles = filter_by_kind(&results, CorpusKind::KbArticle);
    assert_eq!(articles.len(), 2);
}

#[tokio::test]
async fn failed_generation_falls_back_to_evidence() {
    let pipeline = pipeline(Some(Arc::new(Unreachable))).await;
    pipeline.assistant.refresh().await.expect("refresh");

    let resolution = pipeline
        .assistant
        .solve("stale cache on the payment gateway", Some(2))
        .await
        .expect("solve");

    let ids: Vec<&str> = resolution.evidence.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["INC2", "INC1"]);
    assert_eq!(resolution.solution.source, SolutionSource::Aggregated);
    assert_eq!(
        resolution.solution.steps,
        vec!["INC2: Clear cache B", "INC1: Restart service A"]
    );
}

#[tokio::test]
async fn rebuild_of_unchanged_corpus_is_identical() {
    let pipeline = pipeline(None).await;

    let first = pipeline.assistant.refresh().await.expect("first refresh");
    let second = pipeline.assistant.refresh().await.expect("second refresh");

    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first.same_content(&second));

    let persisted = pipeline
        .store
        .load_active()
        .await
        .expect("store readable")
        .expect("snapshot stored");
    assert_eq!(persisted.id(), second.id());
    assert!(persisted.same_content(&first));
}

#[tokio::test]
async fn corpus_edits_are_detected_until_refresh() {
    let pipeline = pipeline(None).await;
    pipeline.assistant.refresh().await.expect("refresh");
    assert!(pipeline.assistant.status().await.expect("status").fresh);

    let mut incidents = base_incidents();
    if let Some(list) = incidents.as_array_mut() {
        list.push(json!({
            "incident_id": "INC4",
            "issue_description": "Login failures after password rotation",
            "resolution": "Resync the directory"
        }));
    }
    write_corpus(&pipeline.corpus_dir, incidents, base_articles());

    let stale = pipeline.assistant.status().await.expect("status");
    assert!(!stale.fresh);
    assert_eq!(stale.corpus_count, 6);
    assert_eq!(stale.item_count, 5);

    pipeline.assistant.refresh().await.expect("refresh");
    let fresh = pipeline.assistant.status().await.expect("status");
    assert!(fresh.fresh);
    assert_eq!(fresh.item_count, 6);

    let results = pipeline
        .assistant
        .search("login password", 1)
        .await
        .expect("search");
    assert!(results[0].id == "INC4" || results[0].id == "KB2");
}

#[tokio::test]
async fn emptied_corpus_keeps_previous_index() {
    let pipeline = pipeline(None).await;
    let first = pipeline.assistant.refresh().await.expect("refresh");

    write_corpus(&pipeline.corpus_dir, json!([]), json!([]));
    let result = pipeline.assistant.refresh().await;
    assert!(matches!(result, Err(AssistError::EmptyCorpus)));

    let active = pipeline.assistant.engine().snapshot().expect("still active");
    assert_eq!(active.id(), first.id());
    let persisted = pipeline
        .store
        .load_active()
        .await
        .expect("store readable")
        .expect("snapshot stored");
    assert_eq!(persisted.id(), first.id());
}

#[tokio::test]
async fn restored_index_serves_searches_without_rebuild() {
    let pipeline = pipeline(None).await;
    pipeline.assistant.refresh().await.expect("refresh");

    let restarted = assistant_over(&pipeline);
    assert!(restarted.restore(&pipeline.store).await.expect("restore"));

    let results = restarted.search("disk full", 1).await.expect("search");
    assert_eq!(results[0].id, "KB1");
}

/// A second assistant over the same corpus and store, as after a restart
fn assistant_over(pipeline: &Pipeline) -> IncidentAssistant {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TermEmbedder);
    let engine = Arc::new(RetrievalEngine::new(Arc::clone(&embedder)));
    let monitor = FreshnessMonitor::new(
        Arc::new(JsonCorpusSource::new(&pipeline.corpus_dir)),
        IndexBuilder::new(embedder).with_store(pipeline.store.clone()),
        Arc::clone(&engine),
    );
    IncidentAssistant::from_parts(engine, SolutionSynthesizer::new(None), monitor)
}
