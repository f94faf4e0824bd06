//! Vector index snapshots.
//!
//! An [`Index`] is immutable once constructed: an ordered list of corpus items
//! aligned one-to-one with their unit-normalized embedding vectors, stamped
//! with the fingerprint of the corpus it was built from. A rebuild always
//! produces a new `Index`; nothing edits one in place.

pub mod builder;
pub mod store;


pub use builder::IndexBuilder;
pub use store::IndexStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::corpus::CorpusItem;
use crate::embeddings::l2_norm;
use crate::{AssistError, Result};

const UNIT_NORM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    id: Uuid,
    fingerprint: String,
    built_at: DateTime<Utc>,
    embedding_model: String,
    dimension: usize,
    items: Vec<CorpusItem>,
    vectors: Vec<Vec<f32>>,
}

impl Index {
    /// Assemble a freshly built index
    #[inline]
    pub fn new(
        fingerprint: String,
        embedding_model: String,
        items: Vec<CorpusItem>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        Self::from_parts(
            Uuid::new_v4(),
            fingerprint,
            Utc::now(),
            embedding_model,
            items,
            vectors,
        )
    }

    /// Reassemble an index from stored parts, re-checking every invariant
    #[inline]
    pub fn from_parts(
        id: Uuid,
        fingerprint: String,
        built_at: DateTime<Utc>,
        embedding_model: String,
        items: Vec<CorpusItem>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(AssistError::EmptyCorpus);
        }

        if items.len() != vectors.len() {
            return Err(AssistError::Embedding(format!(
                "Index has {} items but {} vectors",
                items.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        for (item, vector) in items.iter().zip(&vectors) {
            if vector.len() != dimension || dimension == 0 {
                return Err(AssistError::Embedding(format!(
                    "Vector for {} has {} dimensions, expected {}",
                    item.id,
                    vector.len(),
                    dimension
                )));
            }

            let norm = l2_norm(vector);
            if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
                return Err(AssistError::Embedding(format!(
                    "Vector for {} is not unit length (norm {})",
                    item.id, norm
                )));
            }
        }

        Ok(Self {
            id,
            fingerprint,
            built_at,
            embedding_model,
            dimension,
            items,
            vectors,
        })
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[inline]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn items(&self) -> &[CorpusItem] {
        &self.items
    }

    #[inline]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Items paired with their vectors, in corpus order
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = (&CorpusItem, &[f32])> {
        self.items
            .iter()
            .zip(self.vectors.iter().map(Vec::as_slice))
    }

    /// Same fingerprint, metadata and vectors, ignoring snapshot id and build time
    #[inline]
    pub fn same_content(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.embedding_model == other.embedding_model
            && self.items == other.items
            && self.vectors == other.vectors
    }
}
