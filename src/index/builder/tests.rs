use super::*;
use crate::test_support::{KeywordEmbedder, sample_corpus};
use std::time::Duration;
use tempfile::TempDir;

fn builder_with(embedder: KeywordEmbedder) -> IndexBuilder {
    IndexBuilder::new(Arc::new(embedder))
}

#[tokio::test]
async fn empty_corpus_is_rejected() {
    let builder = builder_with(KeywordEmbedder::new());
    let result = builder.build(Vec::new()).await;
    assert!(matches!(result, Err(AssistError::EmptyCorpus)));
    assert!(!builder.is_building());
}

#[tokio::test]
async fn build_embeds_every_item_in_order() {
    let builder = builder_with(KeywordEmbedder::new()).with_batch_size(3);
    let corpus = sample_corpus();
    let expected_fingerprint = corpus::fingerprint(&corpus);

    let index = builder.build(corpus).await.expect("build succeeds");

    let ids: Vec<&str> = index.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["INC1", "INC2", "KB1", "KB2"]);
    assert_eq!(index.fingerprint(), expected_fingerprint);
    assert_eq!(index.embedding_model(), "keyword-test");
    for vector in index.vectors() {
        assert!((crate::embeddings::l2_norm(vector) - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn degenerate_and_failing_items_are_skipped() {
    let builder = builder_with(KeywordEmbedder::failing_on("poison")).with_batch_size(2);
    let mut corpus = sample_corpus();
    corpus.push(CorpusItem::incident("INC3", "Unrelated words only", "Nothing here"));
    corpus.push(CorpusItem::incident("INC4", "poison disk", "Never embedded"));
    let expected_fingerprint = corpus::fingerprint(&corpus);

    let index = builder.build(corpus).await.expect("build succeeds");

    let ids: Vec<&str> = index.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["INC1", "INC2", "KB1", "KB2"]);
    assert_eq!(index.fingerprint(), expected_fingerprint);
}

#[tokio::test]
async fn build_fails_when_nothing_embeds() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = IndexStore::open(temp_dir.path().join("index.db"))
        .await
        .expect("store opens");
    let builder = builder_with(KeywordEmbedder::failing_on("")).with_store(store.clone());

    let result = builder.build(sample_corpus()).await;

    assert!(matches!(result, Err(AssistError::Embedding(_))));
    assert!(store.load_active().await.expect("store readable").is_none());
}

#[tokio::test]
async fn successful_build_is_persisted() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = IndexStore::open(temp_dir.path().join("index.db"))
        .await
        .expect("store opens");
    let builder = builder_with(KeywordEmbedder::new()).with_store(store.clone());

    let index = builder.build(sample_corpus()).await.expect("build succeeds");
    let loaded = store
        .load_active()
        .await
        .expect("store readable")
        .expect("snapshot stored");

    assert!(loaded.same_content(&index));
}

#[tokio::test]
async fn rebuilding_unchanged_corpus_is_idempotent() {
    let builder = builder_with(KeywordEmbedder::new());

    let first = builder.build(sample_corpus()).await.expect("first build");
    let second = builder.build(sample_corpus()).await.expect("second build");

    assert_ne!(first.id(), second.id());
    assert!(first.same_content(&second));
}

#[tokio::test]
async fn concurrent_build_is_rejected() {
    let embedder = KeywordEmbedder::new().with_delay(Duration::from_millis(50));
    let builder = builder_with(embedder).with_batch_size(1);

    let running = builder.clone();
    let first = tokio::spawn(async move { running.build(sample_corpus()).await });

    while !builder.is_building() {
        tokio::task::yield_now().await;
    }

    let second = builder.build(sample_corpus()).await;
    assert!(matches!(second, Err(AssistError::BuildInProgress)));

    first
        .await
        .expect("build task joins")
        .expect("first build succeeds");
    assert!(!builder.is_building());
}

#[tokio::test]
async fn duplicate_ids_fail_the_build() {
    let builder = builder_with(KeywordEmbedder::new());
    let corpus = vec![
        CorpusItem::incident("INC1", "service down", "restart"),
        CorpusItem::kb_article("INC1", "disk", "clear"),
    ];

    let result = builder.build(corpus).await;
    assert!(result.is_err());
    assert!(!builder.is_building());
}
