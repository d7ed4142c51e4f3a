pub mod chunk;
pub mod citation;
pub mod schema;
pub mod token;
pub mod types;
pub mod util;

pub use chunk::{Chunk, ChunkOptions, chunk_section, should_skip_section};
pub use citation::{AmendmentCitation, parse_amendment_citation};
pub use token::{HeuristicTokenCounter, TokenCounter};
pub use types::{
    Act, CrossReference, DefinedTerm, Document, DocumentStatus, Language, Regulation, Section,
    SourceType,
};
