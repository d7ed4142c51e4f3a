//! Citation URLs and amendment-citation parsing for laws-lois.justice.gc.ca.
//!
//! Citations always carry both languages; the renderer picks one at display
//! time. Numbering is assigned by the context builder at query time, with
//! `L{n}` / `P{n}` prefixes keeping legislation and parliament ids disjoint.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Language;

/// Base URL for the Justice Canada consolidated laws site.
pub const JUSTICE_BASE_URL: &str = "https://laws-lois.justice.gc.ca";

/// Language-specific path segments: `(site_lang, acts, regulations, annual_statutes)`.
const EN_PATHS: (&str, &str, &str, &str) = ("eng", "acts", "regulations", "AnnualStatutes");
const FR_PATHS: (&str, &str, &str, &str) = ("fra", "lois", "reglements", "LoisAnnuelles");

fn paths(language: Language) -> (&'static str, &'static str, &'static str, &'static str) {
    match language {
        Language::En => EN_PATHS,
        Language::Fr => FR_PATHS,
    }
}

/// `"YYYY, c. N[, s. M]"` — annual statute citation as printed in historical
/// notes and amendment lists. `ch.`/`art.` accepted for French citations.
static AMENDMENT_CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{4}),\s*c(?:h)?\.\s*(\d+)(?:,\s*(?:s|art)\.\s*(\d+))?\s*$")
        .expect("amendment citation regex")
});

/// A numbered citation ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: u32,
    /// `L{n}` for legislation, `P{n}` for parliament sources.
    pub prefixed_id: String,
    pub text_en: String,
    pub text_fr: String,
    pub url_en: String,
    pub url_fr: String,
    pub title_en: String,
    pub title_fr: String,
    pub source_type: String,
}

/// Parsed `"YYYY, c. N[, s. M]"` citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentCitation {
    pub year: u16,
    pub chapter: u32,
    pub section: Option<u32>,
}

/// Parse an amendment citation. Returns `None` on non-match, never errors.
pub fn parse_amendment_citation(text: &str) -> Option<AmendmentCitation> {
    let caps = AMENDMENT_CITATION_RE.captures(text)?;
    Some(AmendmentCitation {
        year: caps.get(1)?.as_str().parse().ok()?,
        chapter: caps.get(2)?.as_str().parse().ok()?,
        section: caps.get(3).and_then(|m| m.as_str().parse().ok()),
    })
}

/// URL of an act's consolidated page, e.g. `…/eng/acts/C-46/`.
pub fn act_url(act_id: &str, language: Language) -> String {
    let (lang, acts, _, _) = paths(language);
    format!("{JUSTICE_BASE_URL}/{lang}/{acts}/{act_id}/")
}

/// URL of a regulation's consolidated page, e.g. `…/eng/regulations/SOR-2007-151/`.
pub fn regulation_url(regulation_id: &str, language: Language) -> String {
    let (lang, _, regulations, _) = paths(language);
    format!(
        "{JUSTICE_BASE_URL}/{lang}/{regulations}/{}/",
        file_safe_id(regulation_id)
    )
}

/// URL of an annual statute chapter, e.g. `…/eng/AnnualStatutes/2023_8/`.
pub fn annual_statute_url(year: u16, chapter: u32, language: Language) -> String {
    let (lang, _, _, annual) = paths(language);
    format!("{JUSTICE_BASE_URL}/{lang}/{annual}/{year}_{chapter}/")
}

/// URL of a section within a document page.
pub fn section_url(document_url: &str, section_label: &str) -> String {
    format!(
        "{}page-1.html#{}",
        document_url,
        section_anchor(section_label)
    )
}

/// Section anchor: strip non-alphanumerics from the label and prefix `sec`.
pub fn section_anchor(section_label: &str) -> String {
    let stripped: String = section_label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("sec{stripped}")
}

/// Instrument numbers are not URL-safe: `SOR/2007-151` → `SOR-2007-151`,
/// spaces → underscores.
pub fn file_safe_id(id: &str) -> String {
    id.replace('/', "-").replace(' ', "_")
}
