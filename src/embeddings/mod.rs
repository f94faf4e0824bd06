//! Embedding provider abstraction and vector math.
//!
//! The index and the retrieval engine only ever see an [`EmbeddingProvider`];
//! the concrete backend is the Ollama client in [`ollama`]. Every vector is
//! L2-normalized with [`normalize`] before it is stored or compared, so the
//! inner product of two stored vectors is their cosine similarity.

pub mod ollama;


pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to a fixed-length dense vector.
///
/// Implementations must be deterministic for identical input and model.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the model producing the vectors
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts at once, preserving order.
    ///
    /// The default implementation calls [`EmbeddingProvider::embed`] per text.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length.
///
/// Returns `None` for degenerate vectors (empty, zero norm, or containing
/// non-finite values), which can't be compared meaningfully.
#[inline]
pub fn normalize(vector: &[f32]) -> Option<Vec<f32>> {
    if vector.is_empty() || vector.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let norm = l2_norm(vector);
    if norm <= f32::EPSILON {
        return None;
    }

    Some(vector.iter().map(|x| x / norm).collect())
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two raw vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty, mismatched or zero-norm inputs.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let denom = l2_norm(a) * l2_norm(b);
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot(a, b) / denom
}

/// Encode a vector as little-endian `f32` bytes
#[inline]
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[inline]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
