//! Staleness detection and index refresh.


use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::corpus::{self, CorpusItem, CorpusSource};
use crate::index::{Index, IndexBuilder};
use crate::retrieval::RetrievalEngine;
use crate::{AssistError, Result};

/// Point-in-time comparison of the corpus with the active index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub fresh: bool,
    pub built_at: Option<DateTime<Utc>>,
    pub corpus_fingerprint: String,
    pub index_fingerprint: Option<String>,
    pub corpus_count: usize,
    pub item_count: usize,
    pub embedding_model: Option<String>,
}

impl IndexStatus {
    #[inline]
    pub fn exists(&self) -> bool {
        self.index_fingerprint.is_some()
    }

    /// One-line human description
    #[inline]
    pub fn summary(&self) -> String {
        match (&self.built_at, self.fresh) {
            (None, _) => "Index not built yet".to_string(),
            (Some(built_at), true) => format!(
                "Index is current ({} items, built {})",
                self.item_count,
                built_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            (Some(built_at), false) => format!(
                "Index is stale: corpus changed since {}",
                built_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
}

/// Compares the corpus against the active index and rebuilds on demand
#[derive(Clone)]
pub struct FreshnessMonitor {
    source: Arc<dyn CorpusSource>,
    builder: IndexBuilder,
    engine: Arc<RetrievalEngine>,
}

impl FreshnessMonitor {
    #[inline]
    pub fn new(
        source: Arc<dyn CorpusSource>,
        builder: IndexBuilder,
        engine: Arc<RetrievalEngine>,
    ) -> Self {
        Self {
            source,
            builder,
            engine,
        }
    }

    #[inline]
    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    #[inline]
    pub async fn status(&self) -> Result<IndexStatus> {
        let items = load_corpus(Arc::clone(&self.source)).await?;
        let corpus_fingerprint = corpus::fingerprint(&items);
        let snapshot = self.engine.snapshot();

        let status = match snapshot {
            Some(index) => IndexStatus {
                fresh: index.fingerprint() == corpus_fingerprint,
                built_at: Some(index.built_at()),
                index_fingerprint: Some(index.fingerprint().to_string()),
                corpus_fingerprint,
                corpus_count: items.len(),
                item_count: index.len(),
                embedding_model: Some(index.embedding_model().to_string()),
            },
            None => IndexStatus {
                fresh: false,
                built_at: None,
                index_fingerprint: None,
                corpus_fingerprint,
                corpus_count: items.len(),
                item_count: 0,
                embedding_model: None,
            },
        };

        debug!("Index status: {}", status.summary());
        Ok(status)
    }

    /// Rebuild from the current corpus and activate the result.
    ///
    /// The rebuild runs on its own task, so it completes even if the
    /// returned future is dropped.
    #[inline]
    pub async fn refresh(&self) -> Result<Arc<Index>> {
        let source = Arc::clone(&self.source);
        let builder = self.builder.clone();
        let engine = Arc::clone(&self.engine);

        tokio::spawn(async move {
            info!("Refreshing index from {}", source.describe());
            let items = load_corpus(source).await?;
            let index = builder.build(items).await?;
            engine.install(Arc::clone(&index));
            Ok(index)
        })
        .await
        .map_err(|e| AssistError::Other(anyhow::anyhow!("Refresh task failed: {}", e)))?
    }
}

async fn load_corpus(source: Arc<dyn CorpusSource>) -> Result<Vec<CorpusItem>> {
    tokio::task::spawn_blocking(move || source.load())
        .await
        .map_err(|e| AssistError::Corpus(format!("Corpus loading task failed: {}", e)))?
}
