//! `lookup.xml` catalog index: act↔regulation relationships and bilingual ids.

use std::collections::HashMap;
use std::path::Path;

use canlex_core::citation::file_safe_id;
use canlex_core::types::Language;

use crate::dom::{self, XmlElement};
use crate::error::ParseError;
use crate::text::extract_text;

/// One `Statute` entry from the catalog.
#[derive(Debug, Clone)]
pub struct StatuteEntry {
    pub chapter_number: String,
    pub language: Language,
    pub consolidate: bool,
    pub last_consolidation_date: Option<String>,
    /// Alpha-numbers of regulations made under this act.
    pub regulations: Vec<String>,
}

/// One `Regulation` entry from the catalog.
#[derive(Debug, Clone)]
pub struct RegulationEntry {
    pub alpha_number: String,
    pub language: Language,
    pub consolidate: bool,
    pub last_consolidation_date: Option<String>,
}

/// In-memory catalog maps, keyed by `(id, language)`.
#[derive(Debug, Default)]
pub struct LookupIndex {
    statutes: HashMap<(String, Language), StatuteEntry>,
    regulations: HashMap<(String, Language), RegulationEntry>,
}

impl LookupIndex {
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        let root = dom::parse_xml_file(path)?;
        Ok(Self::from_root(&root))
    }

    pub fn from_str(xml: &str) -> Result<Self, ParseError> {
        let root = dom::parse_xml_str(xml)?;
        Ok(Self::from_root(&root))
    }

    fn from_root(root: &XmlElement) -> Self {
        let mut index = Self::default();
        for element in root.descendants() {
            match element.local_name() {
                "Statute" => {
                    if let Some(entry) = statute_entry(element) {
                        index
                            .statutes
                            .insert((entry.chapter_number.clone(), entry.language), entry);
                    }
                }
                "Regulation" => {
                    if let Some(entry) = regulation_entry(element) {
                        index
                            .regulations
                            .insert((entry.alpha_number.clone(), entry.language), entry);
                    }
                }
                _ => {}
            }
        }
        index
    }

    pub fn lookup_statute(&self, chapter_number: &str, language: Language) -> Option<&StatuteEntry> {
        self.statutes.get(&(chapter_number.to_string(), language))
    }

    pub fn lookup_regulation(
        &self,
        alpha_number: &str,
        language: Language,
    ) -> Option<&RegulationEntry> {
        self.regulations.get(&(alpha_number.to_string(), language))
    }

    pub fn statute_count(&self) -> usize {
        self.statutes.len()
    }

    pub fn regulation_count(&self) -> usize {
        self.regulations.len()
    }

    /// Alpha-numbers of the regulations made under an act.
    pub fn related_regulations(&self, act_id: &str, language: Language) -> Vec<String> {
        self.lookup_statute(act_id, language)
            .map(|s| s.regulations.clone())
            .unwrap_or_default()
    }

    /// Expand a named subset of acts into the regulation filenames to ingest.
    ///
    /// Every requested act must exist in the catalog; any miss fails the
    /// whole subset so a typo cannot silently shrink an import.
    pub fn resolve_subset(
        &self,
        name: &str,
        act_ids: &[String],
        language: Language,
    ) -> Result<Vec<String>, ParseError> {
        let missing: Vec<String> = act_ids
            .iter()
            .filter(|id| self.lookup_statute(id, language).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::InvalidSubset {
                name: name.to_string(),
                missing,
            });
        }

        let mut files = Vec::new();
        for act_id in act_ids {
            for alpha in self.related_regulations(act_id, language) {
                let file = file_safe_name(&alpha);
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }
}

/// Filesystem-safe name for an alpha-number: `SOR/2007-151` → `SOR-2007-151`,
/// spaces → underscores.
pub fn file_safe_name(alpha_number: &str) -> String {
    file_safe_id(alpha_number)
}

fn statute_entry(element: &XmlElement) -> Option<StatuteEntry> {
    let chapter_number = child_text(element, "ChapterNumber")?;
    Some(StatuteEntry {
        chapter_number,
        language: entry_language(element)?,
        consolidate: consolidate_flag(element),
        last_consolidation_date: child_text(element, "LastConsolidationDate"),
        regulations: related(element),
    })
}

fn regulation_entry(element: &XmlElement) -> Option<RegulationEntry> {
    let alpha_number = child_text(element, "AlphaNumber")?;
    Some(RegulationEntry {
        alpha_number,
        language: entry_language(element)?,
        consolidate: consolidate_flag(element),
        last_consolidation_date: child_text(element, "LastConsolidationDate"),
    })
}

fn entry_language(element: &XmlElement) -> Option<Language> {
    child_text(element, "Language")?.parse().ok()
}

fn consolidate_flag(element: &XmlElement) -> bool {
    matches!(
        child_text(element, "ConsolidateFlag").as_deref(),
        Some("Y") | Some("yes") | Some("true")
    )
}

/// Alpha-numbers listed under `Relationships`.
fn related(element: &XmlElement) -> Vec<String> {
    let Some(relationships) = element.child("Relationships") else {
        return Vec::new();
    };
    relationships
        .child_elements()
        .map(extract_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn child_text(parent: &XmlElement, name: &str) -> Option<String> {
    parent
        .child(name)
        .map(extract_text)
        .filter(|t| !t.is_empty())
}
