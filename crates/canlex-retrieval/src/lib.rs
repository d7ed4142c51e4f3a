//! Embedding pipeline and request-time retrieval for the legislation corpus.

mod error;
pub mod hydrate;
pub mod pipeline;
pub mod search;
pub mod slots;

pub use error::RetrievalError;
pub use hydrate::{Bilingual, Hydrated, hydrate_result};
pub use pipeline::{
    PipelineOptions, PipelineStats, ReembedOptions, run_embed_pipeline, run_reembed,
};
pub use search::{SearchOptions, SearchResult, deduplicate_results, execute_vector_search};
pub use slots::{SlotConfig, allocate_citation_slots, build_citations, enforce_balance, get_slot_config};
