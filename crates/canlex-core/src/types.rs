//! Domain types for the bilingual Canadian federal legislation corpus.
//!
//! Every document exists as two parallel rows, one per language — there is no
//! bilingual merging inside a row. Sections belong to exactly one act or one
//! regulation; cross-document links are stored as IDs, never owning pointers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Official language of a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    /// The other official language.
    pub fn other(&self) -> Self {
        match self {
            Self::En => Self::Fr,
            Self::Fr => Self::En,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid language '{0}' (expected 'en' or 'fr')")]
pub struct InvalidLanguage(pub String);

impl FromStr for Language {
    type Err = InvalidLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" | "eng" => Ok(Self::En),
            "fr" | "fra" => Ok(Self::Fr),
            other => Err(InvalidLanguage(other.to_string())),
        }
    }
}

/// Consolidation status of a document or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    InForce,
    NotInForce,
    Repealed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InForce => "in-force",
            Self::NotInForce => "not-in-force",
            Self::Repealed => "repealed",
        }
    }
}

/// Chamber a bill originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillOrigin {
    Commons,
    Senate,
}

/// Kind of section produced by the body walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Section,
    Schedule,
    Amending,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Schedule => "schedule",
            Self::Amending => "amending",
        }
    }
}

/// Scope of a defined term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Act,
    Part,
    Section,
}

/// Source type of an embedded legislation resource.
///
/// Retrieval additionally sees parliament source types (`bill`, `vote`,
/// `politician`, ...) as plain strings; those resources are produced by an
/// external ingester and only flow through slot allocation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Act,
    Regulation,
    ActSection,
    RegulationSection,
    DefinedTerm,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Regulation => "regulation",
            Self::ActSection => "act_section",
            Self::RegulationSection => "regulation_section",
            Self::DefinedTerm => "defined_term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "act" => Some(Self::Act),
            "regulation" => Some(Self::Regulation),
            "act_section" => Some(Self::ActSection),
            "regulation_section" => Some(Self::RegulationSection),
            "defined_term" => Some(Self::DefinedTerm),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Documents ──

/// An act or a regulation, one language row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Document {
    Act(Act),
    Regulation(Regulation),
}

impl Document {
    /// Corpus-wide document identifier (chapter id or instrument-derived id).
    pub fn document_id(&self) -> &str {
        match self {
            Self::Act(a) => &a.act_id,
            Self::Regulation(r) => &r.regulation_id,
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Self::Act(a) => a.language,
            Self::Regulation(r) => r.language,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Act(a) => &a.title,
            Self::Regulation(r) => &r.title,
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Act(_) => SourceType::Act,
            Self::Regulation(_) => SourceType::Regulation,
        }
    }
}

/// Primary legislation, identified by an alphanumeric chapter id (e.g. `C-46`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Act {
    pub act_id: String,
    #[serde(default = "default_language")]
    pub language: Language,
    pub title: String,
    pub long_title: Option<String>,
    pub running_head: Option<String>,
    /// `official` or `unofficial`, from `ShortTitle[@status]`.
    pub short_title_status: Option<String>,
    pub status: DocumentStatus,
    pub in_force_date: Option<String>,
    pub enacted_date: Option<String>,
    pub last_amended_date: Option<String>,
    pub consolidation_date: Option<String>,
    pub bill_origin: Option<BillOrigin>,
    pub bill_type: Option<String>,
    pub consolidated_number: Option<String>,
    /// `yes`/`no` from `ConsolidatedNumber[@official]`.
    pub consolidated_number_official: Option<String>,
    pub annual_statute_year: Option<i32>,
    pub annual_statute_chapter: Option<String>,
    pub bill_history: Option<String>,
    pub recent_amendments: Vec<Amendment>,
    pub preamble: Option<String>,
    pub related_provisions: Vec<RelatedProvision>,
    pub signature_blocks: Option<String>,
    pub table_of_provisions: Option<String>,
    pub has_previous_version: Option<bool>,
}

/// Secondary legislation issued under an enabling act, identified by an
/// instrument number (e.g. `SOR/2007-151`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Regulation {
    pub regulation_id: String,
    #[serde(default = "default_language")]
    pub language: Language,
    pub instrument_number: String,
    /// `SOR`, `SI`, `CRC`, ...
    pub regulation_type: Option<String>,
    pub gazette_part: Option<String>,
    pub title: String,
    pub long_title: Option<String>,
    pub enabling_authorities: Vec<String>,
    pub enabling_act_id: Option<String>,
    pub enabling_act_title: Option<String>,
    pub status: DocumentStatus,
    pub registration_date: Option<String>,
    pub consolidation_date: Option<String>,
    pub last_amended_date: Option<String>,
    pub regulation_maker_order: Option<String>,
    pub recent_amendments: Vec<Amendment>,
    pub related_provisions: Vec<RelatedProvision>,
    pub has_previous_version: Option<bool>,
}

fn default_language() -> Language {
    Language::En
}

impl Default for DocumentStatus {
    fn default() -> Self {
        Self::InForce
    }
}

// ── Sections ──

/// Semantic flags carried per section as a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    pub const HAS_TABLE: u32 = 1 << 0;
    pub const HAS_LIST: u32 = 1 << 1;
    pub const HAS_IMAGE: u32 = 1 << 2;
    pub const HAS_FORMULA: u32 = 1 << 3;
    pub const HAS_FOOTNOTES: u32 = 1 << 4;
    pub const HAS_DEFINITIONS: u32 = 1 << 5;
    pub const HAS_BILINGUAL: u32 = 1 << 6;
    pub const HAS_MATH: u32 = 1 << 7;
    pub const HAS_OATH: u32 = 1 << 8;

    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

/// A footnote attached to a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    pub label: String,
    pub text: String,
}

/// One historical note item (e.g. "2019, c. 29, s. 102").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalNote {
    pub citation: String,
    pub enacted_date: Option<String>,
    pub in_force_date: Option<String>,
}

/// A recent amendment entry from document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    pub citation: String,
    pub date: Option<String>,
}

/// A related-provision pointer from document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedProvision {
    pub citation: String,
    pub text: String,
}

/// An `XRefInternal` captured per section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalReference {
    pub target_label: String,
    pub target_id: Option<String>,
    pub reference_text: String,
}

/// Heading captured from a schedule `Provision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionHeading {
    pub text: String,
    pub format_ref: Option<String>,
    pub lims_metadata: Option<serde_json::Value>,
}

/// One ordered section of a document.
///
/// Exactly one of `act_id` / `regulation_id` is set. `section_order` is
/// strictly increasing within a `(document, language)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    pub act_id: Option<String>,
    pub regulation_id: Option<String>,
    pub language: Language,
    pub section_label: String,
    pub section_order: i64,
    pub section_type: SectionType,
    /// Ordered ancestor headings (Part, Division, ... labels and titles).
    pub hierarchy_path: Vec<String>,
    pub marginal_note: Option<String>,
    /// Plain-text content (whitespace-normalized).
    pub content: String,
    /// Rendered HTML content.
    pub content_html: Option<String>,
    pub status: DocumentStatus,
    pub xml_type: Option<String>,
    pub xml_target: Option<String>,
    pub change_type: Option<String>,
    pub in_force_start_date: Option<String>,
    pub last_amended_date: Option<String>,
    pub historical_notes: Vec<HistoricalNote>,
    pub footnotes: Vec<Footnote>,
    pub schedule_id: Option<String>,
    pub schedule_bilingual: Option<bool>,
    pub content_flags: ContentFlags,
    pub formatting_attributes: Option<serde_json::Value>,
    pub provision_heading: Option<ProvisionHeading>,
    pub internal_references: Vec<InternalReference>,
}

impl Default for SectionType {
    fn default() -> Self {
        Self::Section
    }
}

impl Section {
    /// The owning document's id, whichever side is set.
    pub fn document_id(&self) -> &str {
        self.act_id
            .as_deref()
            .or(self.regulation_id.as_deref())
            .unwrap_or("")
    }

    /// Natural key: `{docId}/{lang}/s{label}`.
    pub fn canonical_id(&self) -> String {
        format!(
            "{}/{}/s{}",
            self.document_id(),
            self.language,
            self.section_label
        )
    }

    pub fn source_type(&self) -> SourceType {
        if self.act_id.is_some() {
            SourceType::ActSection
        } else {
            SourceType::RegulationSection
        }
    }
}

// ── Defined terms and cross-references ──

/// A term formally defined inside a `Definition` wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinedTerm {
    pub language: Language,
    pub term: String,
    pub act_id: Option<String>,
    pub regulation_id: Option<String>,
    pub section_label: Option<String>,
    pub scope_type: ScopeType,
    pub scope_sections: Vec<String>,
    /// Other-language equivalent, extracted from the same `Definition` wrapper.
    pub paired_term: Option<String>,
}

/// Target kind of an external or internal cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceTargetType {
    Act,
    Regulation,
    Agreement,
    CanadaGazette,
    Citation,
    Standard,
    Section,
    Other,
}

impl ReferenceTargetType {
    /// Recognize an `XRefExternal[@reference-type]` value. Unknown values
    /// yield `None` and the reference is dropped.
    pub fn from_reference_type(s: &str) -> Option<Self> {
        match s {
            "act" => Some(Self::Act),
            "regulation" => Some(Self::Regulation),
            "agreement" => Some(Self::Agreement),
            "canada-gazette" => Some(Self::CanadaGazette),
            "citation" => Some(Self::Citation),
            "standard" => Some(Self::Standard),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Regulation => "regulation",
            Self::Agreement => "agreement",
            Self::CanadaGazette => "canada-gazette",
            Self::Citation => "citation",
            Self::Standard => "standard",
            Self::Section => "section",
            Self::Other => "other",
        }
    }
}

/// A cross-reference harvested from a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    pub source_act_id: Option<String>,
    pub source_regulation_id: Option<String>,
    pub source_section_label: String,
    pub language: Language,
    pub target_type: ReferenceTargetType,
    pub target_ref: String,
    pub reference_text: String,
}

/// Everything the parser produces for one XML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub document: Document,
    pub sections: Vec<Section>,
    pub defined_terms: Vec<DefinedTerm>,
    pub cross_references: Vec<CrossReference>,
}

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}
