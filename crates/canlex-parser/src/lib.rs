//! Parser for Justice Canada legislation XML (LIMS2HTML / regulation_web
//! lineage): acts and regulations → structured documents with sections,
//! defined terms, and cross-references.

pub mod audit;
pub mod body;
pub mod dates;
pub mod definitions;
pub mod document;
pub mod dom;
mod error;
pub mod history;
pub mod html;
pub mod lookup;
pub mod tables;
pub mod text;
pub mod xrefs;

pub use document::{parse_legislation_str, parse_legislation_xml};
pub use error::ParseError;
pub use lookup::{LookupIndex, file_safe_name};
