//! Query-time semantic retrieval over the active index.


use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::corpus::{self, CorpusItem, CorpusKind};
use crate::embeddings::{EmbeddingProvider, dot, normalize};
use crate::index::Index;
use crate::{AssistError, Result};

/// One ranked corpus item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub id: String,
    pub kind: CorpusKind,
    pub score: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

impl RetrievalResult {
    #[inline]
    pub fn from_item(item: &CorpusItem, score: f32) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind(),
            score,
            text: item.text.clone(),
            resolution: item.resolution().map(str::to_string),
            title: item.title().map(str::to_string),
            content: item.content().map(str::to_string),
            application: item.application.clone(),
            severity: item.severity.clone(),
            root_cause: item.root_cause.clone(),
        }
    }

    /// The remediation text this item contributes: a resolution or KB content
    #[inline]
    pub fn payload_text(&self) -> Option<&str> {
        match self.kind {
            CorpusKind::Incident => self.resolution.as_deref(),
            CorpusKind::KbArticle => self.content.as_deref(),
        }
    }
}

/// Keep only results of `kind`, preserving rank order
#[inline]
pub fn filter_by_kind(results: &[RetrievalResult], kind: CorpusKind) -> Vec<RetrievalResult> {
    results
        .iter()
        .filter(|result| result.kind == kind)
        .cloned()
        .collect()
}

/// KB articles linked to the incidents among `results`.
///
/// An article is linked when its application equals an incident's
/// application and the incident's root cause appears in the article title,
/// ignoring case. Articles come back in corpus order with a score of 1.0,
/// each at most once.
#[inline]
pub fn mapped_kb_articles(index: &Index, results: &[RetrievalResult]) -> Vec<RetrievalResult> {
    let links: Vec<(&str, String)> = results
        .iter()
        .filter(|result| result.kind == CorpusKind::Incident)
        .filter_map(|result| {
            let application = result.application.as_deref()?;
            let root_cause = result.root_cause.as_deref()?.trim();
            (!root_cause.is_empty()).then(|| (application, root_cause.to_lowercase()))
        })
        .unique()
        .collect();

    if links.is_empty() {
        return Vec::new();
    }

    index
        .items()
        .iter()
        .filter(|item| {
            let (Some(application), Some(title)) = (item.application.as_deref(), item.title())
            else {
                return false;
            };
            let title = title.to_lowercase();
            links
                .iter()
                .any(|(app, root_cause)| *app == application && title.contains(root_cause.as_str()))
        })
        .map(|item| RetrievalResult::from_item(item, 1.0))
        .collect()
}

/// Score every entry of `index` against a unit query vector and keep the best `k`.
///
/// Ties keep corpus order. Results under `min_score` are dropped after the cut.
#[inline]
pub fn rank(index: &Index, query: &[f32], k: usize, min_score: Option<f32>) -> Vec<RetrievalResult> {
    index
        .vectors()
        .iter()
        .map(|vector| dot(vector, query))
        .enumerate()
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .take(k)
        .filter(|(_, score)| min_score.is_none_or(|floor| *score >= floor))
        .map(|(position, score)| RetrievalResult::from_item(&index.items()[position], score))
        .collect()
}

/// Holds the active index and answers similarity queries against it
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    active: RwLock<Option<Arc<Index>>>,
    min_score: Option<f32>,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            active: RwLock::new(None),
            min_score: None,
        }
    }

    #[inline]
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Make `index` the active snapshot, returning the one it replaces
    #[inline]
    pub fn install(&self, index: Arc<Index>) -> Option<Arc<Index>> {
        let id = index.id();
        let len = index.len();
        let previous = self.active.write().replace(index);
        info!(
            "Activated index {} ({} items), replacing {}",
            id,
            len,
            previous
                .as_ref()
                .map_or_else(|| "nothing".to_string(), |p| p.id().to_string())
        );
        previous
    }

    #[inline]
    pub fn snapshot(&self) -> Option<Arc<Index>> {
        self.active.read().clone()
    }

    /// Rank the `k` corpus items most similar to `query`
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Err(AssistError::InvalidRequest(
                "k must be at least 1".to_string(),
            ));
        }

        let cleaned = corpus::clean_text(query);
        if cleaned.is_empty() {
            return Err(AssistError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let snapshot = self.snapshot().ok_or(AssistError::IndexUnavailable)?;

        let embedder = Arc::clone(&self.embedder);
        let raw = tokio::task::spawn_blocking(move || embedder.embed(&cleaned))
            .await
            .map_err(|e| AssistError::QueryEmbedding(format!("embedding task failed: {}", e)))?
            .map_err(|e| AssistError::QueryEmbedding(e.to_string()))?;

        self.search_snapshot(&snapshot, &raw, k)
    }

    /// Rank against a caller-held snapshot with an already embedded query
    #[inline]
    pub fn search_snapshot(
        &self,
        snapshot: &Index,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Err(AssistError::InvalidRequest(
                "k must be at least 1".to_string(),
            ));
        }

        let unit = normalize(query_vector).ok_or_else(|| {
            AssistError::QueryEmbedding("query embedding is degenerate".to_string())
        })?;

        if unit.len() != snapshot.dimension() {
            return Err(AssistError::QueryEmbedding(format!(
                "query has {} dimensions but index {} has {}",
                unit.len(),
                snapshot.id(),
                snapshot.dimension()
            )));
        }

        let results = rank(snapshot, &unit, k, self.min_score);
        debug!(
            "Ranked {} items from index {}, returning {}",
            snapshot.len(),
            snapshot.id(),
            results.len()
        );
        Ok(results)
    }
}
