//! ONNX Runtime embedding pipeline for multilingual sentence models.
//!
//! Targets BGE-M3-class models (XLM-RoBERTa tokenizer, 1024-dimensional
//! dense output, CLS pooling). The model directory must contain `model.onnx`
//! and `tokenizer.json`.

use std::path::Path;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use canlex_core::token::TokenCounter;

use crate::{EmbedError, EmbeddingProvider};

/// Token budget for model input; chunking keeps content well under this.
const MAX_INPUT_TOKENS: usize = 1024;

/// Sentence embedding generator using ONNX Runtime.
pub struct Embedder {
    session: Session,
    tokenizer: Tokenizer,
    model_name: String,
    dim: usize,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and
    /// `tokenizer.json`.
    pub fn load(model_dir: &Path, model_name: &str) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;

        // Infer the embedding dimension from the model's output shape.
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(1024);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_INPUT_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            ..Default::default()
        }));

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            session,
            tokenizer,
            model_name: model_name.to_string(),
            dim,
        })
    }

    /// Embed a single text, returning a normalized vector.
    pub fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let results = self.embed_batch(&[text])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Fatal("empty embedding batch".into()))
    }

    /// A deterministic token counter sharing this model's tokenizer.
    pub fn token_counter(&self) -> Result<ExactTokenCounter, EmbedError> {
        // Counting must see true lengths, so strip truncation/padding.
        let mut tokenizer = self.tokenizer.clone();
        tokenizer
            .with_truncation(None)
            .map_err(|e| EmbedError::Fatal(format!("reset truncation: {e}")))?;
        tokenizer.with_padding(None);
        Ok(ExactTokenCounter { tokenizer })
    }

    fn run_batch(&mut self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = texts.len();
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * seq_len;
            for (j, &id) in encoding.get_ids().iter().enumerate() {
                input_ids[offset + j] = id as i64;
            }
            for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
                attention_mask[offset + j] = mask as i64;
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
        ])?;

        // Token embeddings: [batch_size, seq_len, dim].
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch_size && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [{batch_size}, {seq_len}, {}]",
            self.dim
        );
        let actual_seq_len = dims[1] as usize;

        // CLS pooling, then L2 normalization.
        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let offset = i * actual_seq_len * self.dim;
            let mut pooled = output_data[offset..offset + self.dim].to_vec();
            normalize(&mut pooled);
            embeddings.push(pooled);
        }
        Ok(embeddings)
    }
}

impl EmbeddingProvider for Embedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.run_batch(texts)
            .map_err(|e| EmbedError::Fatal(e.to_string()))
    }
}

/// Token counting backed by the embedding model's own tokenizer.
pub struct ExactTokenCounter {
    tokenizer: Tokenizer,
}

impl TokenCounter for ExactTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer
            .encode(text, false)
            .map(|e| e.get_ids().len())
            .unwrap_or(0)
    }
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Infer the embedding dimension from the ONNX model output type.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
