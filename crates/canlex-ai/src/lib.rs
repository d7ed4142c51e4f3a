//! Embedding inference layer.
//!
//! The pipeline depends only on [`EmbeddingProvider`]; the ONNX-backed
//! implementation lives behind the `onnx` feature so parsing and storage
//! build without a C++ toolchain.

use thiserror::Error;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::{Embedder, ExactTokenCounter};

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedder returned something other than a finite vector of the
    /// expected dimensionality.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Worth retrying with backoff.
    #[error("transient embedder error: {0}")]
    Transient(String),

    /// Not worth retrying; surfaces to the caller.
    #[error("embedder error: {0}")]
    Fatal(String),
}

/// A batch text-embedding backend.
pub trait EmbeddingProvider: Send {
    /// Model tag persisted alongside each vector.
    fn model_name(&self) -> &str;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order.
    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Normalize text before embedding: collapse whitespace runs and trim.
/// Keeps resource content byte-stable across ingest runs.
pub fn normalize_for_embedding(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate one returned vector: finite values, exact dimensionality.
pub fn validate_embedding(embedding: &[f32], dimensions: usize) -> Result<(), EmbedError> {
    if embedding.len() != dimensions {
        return Err(EmbedError::InvalidEmbedding(format!(
            "expected {dimensions} dimensions, got {}",
            embedding.len()
        )));
    }
    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(EmbedError::InvalidEmbedding(format!(
            "non-finite value at index {pos}"
        )));
    }
    Ok(())
}
