#[cfg(feature = "duckdb")]
mod duck;
mod error;
#[cfg(feature = "lancedb")]
mod lance;
mod progress;

#[cfg(feature = "duckdb")]
pub use duck::{DocumentMeta, DuckStore, ResourceRow};
pub use error::StoreError;
#[cfg(feature = "lancedb")]
pub use lance::{EmbeddedChunk, EmbeddingRow, LanceStore};
pub use progress::ProgressTracker;
