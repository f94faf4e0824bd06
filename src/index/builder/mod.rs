#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::corpus::{self, CorpusItem};
use crate::embeddings::{EmbeddingProvider, normalize};
use crate::index::{Index, IndexStore};
use crate::{AssistError, Result};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Builds index snapshots from a full corpus.
///
/// Only one build may run at a time per builder; a second caller gets
/// [`AssistError::BuildInProgress`] instead of waiting.
#[derive(Clone)]
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Option<IndexStore>,
    batch_size: usize,
    building: Arc<AtomicBool>,
    show_progress: bool,
}

/// Clears the in-progress flag when dropped
struct BuildGuard {
    flag: Arc<AtomicBool>,
}

impl BuildGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AssistError::BuildInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Output of the embedding pass: surviving items and their unit vectors
struct EmbeddedCorpus {
    items: Vec<CorpusItem>,
    vectors: Vec<Vec<f32>>,
    skipped: usize,
}

impl IndexBuilder {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: None,
            batch_size: DEFAULT_BATCH_SIZE,
            building: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    /// Persist every successful build to `store`
    #[inline]
    pub fn with_store(mut self, store: IndexStore) -> Self {
        self.store = Some(store);
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a progress bar on an attended terminal
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self) -> Option<&IndexStore> {
        self.store.as_ref()
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `corpus` into a new index and persist it.
    ///
    /// The fingerprint covers the whole input, including items whose
    /// embedding was skipped.
    #[inline]
    pub async fn build(&self, corpus: Vec<CorpusItem>) -> Result<Arc<Index>> {
        if corpus.is_empty() {
            return Err(AssistError::EmptyCorpus);
        }

        let _guard = BuildGuard::acquire(&self.building)?;

        corpus::ensure_unique_ids(&corpus)?;
        let fingerprint = corpus::fingerprint(&corpus);
        let total = corpus.len();
        info!(
            "Building index over {} corpus items with {}",
            total,
            self.embedder.model_name()
        );

        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.batch_size;
        let show_progress = self.show_progress;
        let embedded = tokio::task::spawn_blocking(move || {
            embed_corpus(embedder.as_ref(), corpus, batch_size, show_progress)
        })
        .await
        .map_err(|e| AssistError::Embedding(format!("Embedding task failed: {}", e)))?;

        if embedded.items.is_empty() {
            return Err(AssistError::Embedding(format!(
                "All {} corpus items failed to embed",
                total
            )));
        }

        let index = Index::new(
            fingerprint,
            self.embedder.model_name().to_string(),
            embedded.items,
            embedded.vectors,
        )?;

        if let Some(store) = &self.store {
            store.persist(&index).await?;
        }

        info!(
            "Built index {} with {} items ({} skipped)",
            index.id(),
            index.len(),
            embedded.skipped
        );
        Ok(Arc::new(index))
    }
}

fn embed_corpus(
    embedder: &dyn EmbeddingProvider,
    corpus: Vec<CorpusItem>,
    batch_size: usize,
    show_progress: bool,
) -> EmbeddedCorpus {
    let bar = if show_progress && console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(corpus.len() as u64).with_style(style)
    } else {
        ProgressBar::hidden()
    };

    let mut embedded = EmbeddedCorpus {
        items: Vec::with_capacity(corpus.len()),
        vectors: Vec::with_capacity(corpus.len()),
        skipped: 0,
    };
    let mut expected_dimension: Option<usize> = None;

    for batch in corpus.chunks(batch_size) {
        let inputs: Vec<String> = batch.iter().map(CorpusItem::embedding_input).collect();

        let raw: Vec<Result<Vec<f32>>> = match embedder.embed_batch(&inputs) {
            Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Ok).collect(),
            outcome => {
                if let Err(e) = outcome {
                    debug!("Batch embedding failed, retrying items one by one: {}", e);
                }
                inputs.iter().map(|text| embedder.embed(text)).collect()
            }
        };

        for (item, vector) in batch.iter().zip(raw) {
            bar.set_message(item.id.clone());
            bar.inc(1);

            let vector = match vector {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Skipping {}: embedding failed: {}", item.id, e);
                    embedded.skipped += 1;
                    continue;
                }
            };

            let Some(unit) = normalize(&vector) else {
                warn!("Skipping {}: degenerate embedding vector", item.id);
                embedded.skipped += 1;
                continue;
            };

            let dimension = *expected_dimension.get_or_insert(unit.len());
            if unit.len() != dimension {
                warn!(
                    "Skipping {}: embedding has {} dimensions, expected {}",
                    item.id,
                    unit.len(),
                    dimension
                );
                embedded.skipped += 1;
                continue;
            }

            embedded.items.push(item.clone());
            embedded.vectors.push(unit);
        }
    }

    bar.finish_and_clear();
    embedded
}
