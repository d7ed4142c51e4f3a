//! Hydration: canonical-record markdown previews for primary results.
//!
//! The hydrator dispatches on the result's `sourceType`, fetches the
//! canonical record, and renders a markdown card. Content falls back to the
//! other language when the requested one is missing, and the fallback is
//! recorded in `note`. Hydration is best-effort: any failure yields `None`.

use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use tracing::debug;

use canlex_core::types::Language;
use canlex_store::{DocumentMeta, DuckStore};

/// A hydrated preview of one primary result.
#[derive(Debug, Clone)]
pub struct Hydrated {
    pub markdown: String,
    pub language_used: Language,
    pub id: String,
    /// Present when the requested language was unavailable.
    pub note: Option<String>,
}

/// Bilingual field pair with a deterministic pick.
#[derive(Debug, Clone, Default)]
pub struct Bilingual<T> {
    pub en: Option<T>,
    pub fr: Option<T>,
}

impl<T> Bilingual<T> {
    /// Pick the requested language, falling back to the other. The second
    /// tuple element says which language was actually used.
    pub fn pick(&self, requested: Language) -> Option<(&T, Language)> {
        let (first, second) = match requested {
            Language::En => (&self.en, &self.fr),
            Language::Fr => (&self.fr, &self.en),
        };
        first
            .as_ref()
            .map(|v| (v, requested))
            .or_else(|| second.as_ref().map(|v| (v, requested.other())))
    }
}

/// Format a timestamp in local time, `YYYY-MM-DD HH:MM`.
pub fn format_local_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Hydrate one search-result metadata object.
///
/// Legislation source types read the canonical row family; parliament source
/// types belong to an external ingester and yield `None` here.
pub fn hydrate_result(
    duck: &DuckStore,
    metadata: &Value,
    requested: Language,
) -> Option<Hydrated> {
    let source_type = metadata["sourceType"].as_str()?;
    match source_type {
        "act" | "regulation" => hydrate_document(duck, metadata, requested),
        "act_section" | "regulation_section" => hydrate_section(duck, metadata, requested),
        "defined_term" => hydrate_defined_term(duck, metadata, requested),
        other => {
            debug!(source_type = other, "no hydrator for source type");
            None
        }
    }
}

fn document_id_of(metadata: &Value) -> Option<&str> {
    metadata["actId"]
        .as_str()
        .or_else(|| metadata["regulationId"].as_str())
}

/// Fetch the requested language row, falling back to the other language.
fn meta_with_fallback(
    duck: &DuckStore,
    document_id: &str,
    requested: Language,
) -> Option<(DocumentMeta, Language, Option<String>)> {
    match duck.get_document_meta(document_id, requested) {
        Ok(Some(meta)) => Some((meta, requested, None)),
        _ => {
            let other = requested.other();
            let meta = duck.get_document_meta(document_id, other).ok()??;
            let note = Some(format!(
                "content served in '{other}' ('{requested}' unavailable)"
            ));
            Some((meta, other, note))
        }
    }
}

fn labels(language: Language) -> (&'static str, &'static str, &'static str, &'static str) {
    match language {
        Language::En => ("Status", "Last amended", "Consolidated to", "Section"),
        Language::Fr => ("Statut", "Dernière modification", "À jour au", "Article"),
    }
}

fn hydrate_document(
    duck: &DuckStore,
    metadata: &Value,
    requested: Language,
) -> Option<Hydrated> {
    let document_id = document_id_of(metadata)?;
    let (meta, used, note) = meta_with_fallback(duck, document_id, requested)?;
    let (status_label, amended_label, consolidated_label, _) = labels(used);

    let mut markdown = format!("# {}\n", meta.title);
    if let Some(long) = &meta.long_title {
        markdown.push_str(&format!("\n*{long}*\n"));
    }
    markdown.push('\n');
    markdown.push_str(&format!("- **{status_label}:** {}\n", meta.status));
    if let Some(instrument) = &meta.instrument_number {
        markdown.push_str(&format!("- **{}:** {instrument}\n", match used {
            Language::En => "Instrument number",
            Language::Fr => "Numéro d'enregistrement",
        }));
    }
    if let Some(date) = &meta.last_amended_date {
        markdown.push_str(&format!("- **{amended_label}:** {date}\n"));
    }
    if let Some(date) = &meta.consolidation_date {
        markdown.push_str(&format!("- **{consolidated_label}:** {date}\n"));
    }
    if let Some(enabling) = &meta.enabling_act_id {
        markdown.push_str(&format!(
            "- **{}:** {enabling}\n",
            match used {
                Language::En => "Enabling act",
                Language::Fr => "Loi habilitante",
            }
        ));
    }

    Some(Hydrated {
        markdown,
        language_used: used,
        id: document_id.to_string(),
        note,
    })
}

fn hydrate_section(duck: &DuckStore, metadata: &Value, requested: Language) -> Option<Hydrated> {
    let document_id = document_id_of(metadata)?;
    let label = metadata["sectionLabel"].as_str()?;

    let (section, used, note) = match duck.get_section(document_id, requested, label) {
        Ok(Some(section)) => (section, requested, None),
        _ => {
            let other = requested.other();
            let section = duck.get_section(document_id, other, label).ok()??;
            (
                section,
                other,
                Some(format!(
                    "content served in '{other}' ('{requested}' unavailable)"
                )),
            )
        }
    };

    let title = duck
        .get_document_meta(document_id, used)
        .ok()
        .flatten()
        .map(|m| m.title)
        .unwrap_or_else(|| document_id.to_string());
    let (status_label, amended_label, _, section_label) = labels(used);

    let mut markdown = format!("# {title} — {section_label} {label}\n\n");
    if let Some(marginal) = &section.marginal_note {
        markdown.push_str(&format!("**{marginal}**\n\n"));
    }
    if !section.hierarchy_path.is_empty() {
        markdown.push_str(&format!("> {}\n\n", section.hierarchy_path.join(" › ")));
    }
    markdown.push_str(&section.content);
    markdown.push('\n');
    markdown.push_str(&format!(
        "\n- **{status_label}:** {}\n",
        section.status.as_str()
    ));
    if let Some(date) = &section.last_amended_date {
        markdown.push_str(&format!("- **{amended_label}:** {date}\n"));
    }
    if !section.historical_notes.is_empty() {
        let items: Vec<String> = section
            .historical_notes
            .iter()
            .map(|n| n.citation.clone())
            .collect();
        markdown.push_str(&format!(
            "- **{}:** {}\n",
            match used {
                Language::En => "History",
                Language::Fr => "Historique",
            },
            items.join("; ")
        ));
    }

    Some(Hydrated {
        markdown,
        language_used: used,
        id: format!("{document_id}/s{label}"),
        note,
    })
}

fn hydrate_defined_term(
    duck: &DuckStore,
    metadata: &Value,
    requested: Language,
) -> Option<Hydrated> {
    let document_id = document_id_of(metadata)?;
    let term = metadata["term"].as_str()?;
    let (meta, used, note) = meta_with_fallback(duck, document_id, requested)?;

    let mut markdown = match used {
        Language::En => format!("# \u{201c}{term}\u{201d}\n\nDefined in *{}*", meta.title),
        Language::Fr => format!("# \u{ab} {term} \u{bb}\n\nDéfini dans *{}*", meta.title),
    };
    if let Some(label) = metadata["sectionLabel"].as_str() {
        let (_, _, _, section_label) = labels(used);
        markdown.push_str(&format!(", {} {label}", section_label.to_lowercase()));
    }
    markdown.push('\n');
    if let Some(paired) = metadata["pairedTerm"].as_str() {
        markdown.push_str(&match used {
            Language::En => format!("\n- **French equivalent:** \u{201c}{paired}\u{201d}\n"),
            Language::Fr => format!("\n- **Équivalent anglais :** \u{ab} {paired} \u{bb}\n"),
        });
    }

    Some(Hydrated {
        markdown,
        language_used: used,
        id: format!("{document_id}/{term}"),
        note,
    })
}
