//! Caller-facing facade tying retrieval, synthesis and freshness together.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{AssistError, Result};
use crate::config::Config;
use crate::corpus::{CorpusSource, JsonCorpusSource};
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::freshness::{FreshnessMonitor, IndexStatus};
use crate::index::{Index, IndexBuilder, IndexStore};
use crate::retrieval::{RetrievalEngine, RetrievalResult, mapped_kb_articles};
use crate::synthesis::{
    GenerativeProvider, OllamaGenerator, SolutionResponse, SolutionSynthesizer, aggregate,
};

const DEFAULT_K: usize = 10;

/// Evidence retrieved for a query and the remediation built from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub query: String,
    pub evidence: Vec<RetrievalResult>,
    pub solution: SolutionResponse,
}

pub struct IncidentAssistant {
    engine: Arc<RetrievalEngine>,
    synthesizer: Arc<SolutionSynthesizer>,
    monitor: FreshnessMonitor,
    default_k: usize,
}

impl IncidentAssistant {
    /// Wire the Ollama backends, JSON corpus and SQLite store described by `config`.
    ///
    /// The persisted index is activated when it was built with the configured
    /// embedding model. With `retrieval.auto_rebuild` set, a missing or stale
    /// index is rebuilt; a failed rebuild is logged and leaves whatever index
    /// was loaded in place.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaClient::new(&config.ollama)?);

        let generator: Option<Arc<dyn GenerativeProvider>> = if config.generation.enabled {
            Some(Arc::new(OllamaGenerator::new(
                &config.ollama,
                &config.generation,
            )?))
        } else {
            info!("Generation disabled, solutions will be aggregated");
            None
        };

        let store = IndexStore::open(config.index_path()).await?;
        let source: Arc<dyn CorpusSource> = Arc::new(JsonCorpusSource::new(config.corpus_dir()));

        let engine = Arc::new(
            RetrievalEngine::new(Arc::clone(&embedder)).with_min_score(config.retrieval.min_score),
        );
        let builder = IndexBuilder::new(embedder)
            .with_store(store.clone())
            .with_batch_size(config.ollama.batch_size as usize)
            .with_progress(true);
        let synthesizer = SolutionSynthesizer::new(generator)
            .with_options(config.generation.options())
            .with_limits(config.generation.limits());
        let monitor = FreshnessMonitor::new(source, builder, Arc::clone(&engine));

        let assistant = Self::from_parts(engine, synthesizer, monitor)
            .with_default_k(config.retrieval.default_k);

        assistant.restore(&store).await?;
        if config.retrieval.auto_rebuild {
            assistant.rebuild_if_stale().await;
        }

        Ok(assistant)
    }

    /// Assemble from already wired components.
    ///
    /// `monitor` must install into the same `engine`.
    #[inline]
    pub fn from_parts(
        engine: Arc<RetrievalEngine>,
        synthesizer: SolutionSynthesizer,
        monitor: FreshnessMonitor,
    ) -> Self {
        Self {
            engine,
            synthesizer: Arc::new(synthesizer),
            monitor,
            default_k: DEFAULT_K,
        }
    }

    #[inline]
    pub fn with_default_k(mut self, default_k: usize) -> Self {
        self.default_k = default_k.max(1);
        self
    }

    #[inline]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    #[inline]
    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    /// Activate the persisted index if it matches the configured embedding model
    #[inline]
    pub async fn restore(&self, store: &IndexStore) -> Result<bool> {
        let Some(index) = store.load_active().await? else {
            info!("No persisted index found");
            return Ok(false);
        };

        let model = self.monitor.builder().embedder().model_name();
        if index.embedding_model() != model {
            warn!(
                "Ignoring persisted index built with {} (configured model is {})",
                index.embedding_model(),
                model
            );
            return Ok(false);
        }

        self.engine.install(Arc::new(index));
        Ok(true)
    }

    async fn rebuild_if_stale(&self) {
        match self.monitor.status().await {
            Ok(status) if status.fresh => debug!("{}", status.summary()),
            Ok(status) => {
                info!("{}, rebuilding", status.summary());
                if let Err(e) = self.monitor.refresh().await {
                    warn!("Automatic rebuild failed, keeping the current index: {}", e);
                }
            }
            Err(e) => warn!("Could not check index freshness: {}", e),
        }
    }

    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.engine.search(query, k).await
    }

    /// KB articles linked by application and root cause to the incidents in `results`
    #[inline]
    pub fn mapped_kb_articles(&self, results: &[RetrievalResult]) -> Result<Vec<RetrievalResult>> {
        let snapshot = self.engine.snapshot().ok_or(AssistError::IndexUnavailable)?;
        Ok(mapped_kb_articles(&snapshot, results))
    }

    /// Synthesize a solution without blocking the runtime.
    ///
    /// Bounded by the generation timeout; overrunning it yields the
    /// aggregated fallback.
    #[inline]
    pub async fn synthesize(&self, query: &str, evidence: &[RetrievalResult]) -> SolutionResponse {
        if evidence.is_empty() {
            return SolutionResponse::empty();
        }

        let budget: Duration = self.synthesizer.options().timeout;
        let synthesizer = Arc::clone(&self.synthesizer);
        let owned_query = query.to_string();
        let owned_evidence = evidence.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            synthesizer.synthesize(&owned_query, &owned_evidence)
        });

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Synthesis task failed, aggregating evidence: {}", e);
                aggregate(evidence)
            }
            Err(_) => self.synthesizer.timed_out(evidence, budget),
        }
    }

    #[inline]
    pub async fn status(&self) -> Result<IndexStatus> {
        self.monitor.status().await
    }

    #[inline]
    pub async fn refresh(&self) -> Result<Arc<Index>> {
        self.monitor.refresh().await
    }

    /// Search with `k` (or the configured default) and synthesize from the results
    #[inline]
    pub async fn solve(&self, query: &str, k: Option<usize>) -> Result<Resolution> {
        let evidence = self.search(query, k.unwrap_or(self.default_k)).await?;
        let solution = self.synthesize(query, &evidence).await;
        Ok(Resolution {
            query: query.to_string(),
            evidence,
            solution,
        })
    }
}
