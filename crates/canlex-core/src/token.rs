//! Deterministic token counting for chunk budgeting.
//!
//! The chunker needs a counter that is stable across runs and compatible with
//! the embedding model's tokenizer. The exact counter (backed by the model's
//! `tokenizers` file) lives in `canlex-ai` behind the `onnx` feature; this
//! module carries the trait and a model-free heuristic so chunking stays
//! testable without model files on disk.

/// A deterministic text-to-token-count function.
///
/// Implementations must be pure: the same input always yields the same count.
pub trait TokenCounter {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Word-and-length based token estimate.
///
/// Counts one token per short word and one per 4 characters of longer words,
/// which tracks sentence-piece tokenizers closely enough for budget purposes
/// on English and French legislative prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace()
            .map(|word| {
                let chars = word.chars().count();
                if chars <= 4 { 1 } else { chars.div_ceil(4) }
            })
            .sum()
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for &T {
    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }
}
