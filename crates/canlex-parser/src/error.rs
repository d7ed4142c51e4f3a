use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// The parser never yields a partial document: any structural failure
    /// (malformed XML, missing Identification, missing chapter/instrument
    /// number) reports the file and the reason.
    #[error("failed to parse {path}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    #[error("invalid subset '{name}': acts not in catalog: {missing:?}")]
    InvalidSubset { name: String, missing: Vec<String> },

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Wrap any reason into a `ParseFailure` pinned to a file.
    pub fn failure(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ParseFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
