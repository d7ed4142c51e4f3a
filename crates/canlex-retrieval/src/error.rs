use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("store error: {0}")]
    Store(#[from] canlex_store::StoreError),

    #[error("embedding error: {0}")]
    Embed(#[from] canlex_ai::EmbedError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
