//! Intent-aware citation slot allocation and citation construction.
//!
//! An intent tag selects which source types fill citation slots first, which
//! may follow, and which are shut out entirely. The `general` intent has no
//! primaries and instead balances source types so no single type floods the
//! context.

use serde_json::Value;

use canlex_core::citation::{
    Citation, act_url, annual_statute_url, regulation_url, section_url,
};
use canlex_core::types::{Language, SourceType};

use crate::search::SearchResult;

/// Share of the slot budget any one source type may take under `general`.
pub const BALANCE_MAX_RATIO: f32 = 0.4;

/// Slot policy for one retrieval intent.
#[derive(Debug, Clone)]
pub struct SlotConfig {
    /// Source types that fill first, in order.
    pub primary: Vec<&'static str>,
    /// Source types allowed after primaries.
    pub secondary: Vec<&'static str>,
    /// Total picks allowed from `secondary`.
    pub secondary_cap: usize,
    /// Source types never selected under this intent.
    pub excluded: Vec<&'static str>,
}

/// Slot policy per intent tag. Unknown intents fall back to `general`.
pub fn get_slot_config(intent: &str) -> SlotConfig {
    match intent {
        "bill_focused" => SlotConfig {
            primary: vec!["bill", "vote", "hansard"],
            secondary: vec!["politician", "committee"],
            secondary_cap: 2,
            excluded: vec![],
        },
        "vote_focused" => SlotConfig {
            primary: vec!["vote", "bill", "politician"],
            secondary: vec!["hansard", "party"],
            secondary_cap: 2,
            excluded: vec![],
        },
        "mp_info" => SlotConfig {
            primary: vec!["politician", "riding", "party"],
            secondary: vec!["bill", "vote", "committee"],
            secondary_cap: 2,
            // MP profiles drown in debate transcripts; hansard is capped to zero.
            excluded: vec!["hansard"],
        },
        _ => SlotConfig {
            primary: vec![],
            secondary: vec![],
            secondary_cap: 0,
            excluded: vec![],
        },
    }
}

fn source_type_of(result: &SearchResult) -> &str {
    result.metadata["sourceType"].as_str().unwrap_or("")
}

/// Fill citation slots according to the intent policy.
///
/// Primaries fill first in config order; secondaries follow up to
/// `secondary_cap` picks. With no primaries the balancer decides.
pub fn allocate_citation_slots(
    results: &[SearchResult],
    config: &SlotConfig,
    limit: usize,
) -> Vec<SearchResult> {
    let eligible: Vec<&SearchResult> = results
        .iter()
        .filter(|r| !config.excluded.contains(&source_type_of(r)))
        .collect();

    if config.primary.is_empty() {
        return enforce_balance(&eligible, limit, BALANCE_MAX_RATIO);
    }

    let mut picked: Vec<SearchResult> = Vec::with_capacity(limit);
    for source_type in &config.primary {
        for result in &eligible {
            if picked.len() >= limit {
                return picked;
            }
            if source_type_of(result) == *source_type {
                picked.push((*result).clone());
            }
        }
    }

    let mut secondary_picks = 0usize;
    for result in &eligible {
        if picked.len() >= limit || secondary_picks >= config.secondary_cap {
            break;
        }
        let st = source_type_of(result);
        if config.secondary.contains(&st) {
            picked.push((*result).clone());
            secondary_picks += 1;
        }
    }
    picked
}

/// Take results in score order but cap each source type at
/// `⌊limit · max_ratio⌋`, spilling overflow only when no unsaturated type has
/// results left.
pub fn enforce_balance(
    results: &[&SearchResult],
    limit: usize,
    max_ratio: f32,
) -> Vec<SearchResult> {
    let cap = ((limit as f32) * max_ratio).floor() as usize;
    let mut counts: std::collections::HashMap<String, usize> = Default::default();
    let mut picked: Vec<SearchResult> = Vec::with_capacity(limit);
    let mut overflow: Vec<&SearchResult> = Vec::new();

    for result in results {
        if picked.len() >= limit {
            break;
        }
        let st = source_type_of(result).to_string();
        let count = counts.entry(st).or_insert(0);
        if *count < cap {
            *count += 1;
            picked.push((*result).clone());
        } else {
            overflow.push(result);
        }
    }

    // Only saturated types remain: spill in score order.
    for result in overflow {
        if picked.len() >= limit {
            break;
        }
        picked.push(result.clone());
    }
    picked
}

// ── Citations ──

/// Build numbered citations for chosen results. Legislation results count on
/// the `L` series, parliament results on `P`, so ids never collide when both
/// sets appear in one context.
pub fn build_citations(results: &[SearchResult]) -> Vec<Citation> {
    let mut legislation_n = 0u32;
    let mut parliament_n = 0u32;
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let source_type = source_type_of(result).to_string();
            let legislation = SourceType::parse(&source_type).is_some();
            let prefixed_id = if legislation {
                legislation_n += 1;
                format!("L{legislation_n}")
            } else {
                parliament_n += 1;
                format!("P{parliament_n}")
            };
            let (url_en, url_fr) = result_urls(&result.metadata, &source_type);
            let title = result.metadata["title"].as_str().unwrap_or("").to_string();
            let (text_en, text_fr) = citation_texts(&result.metadata, &title);
            Citation {
                id: (i + 1) as u32,
                prefixed_id,
                text_en,
                text_fr,
                url_en,
                url_fr,
                title_en: title.clone(),
                title_fr: title,
                source_type,
            }
        })
        .collect()
}

fn citation_texts(metadata: &Value, title: &str) -> (String, String) {
    match metadata["sectionLabel"].as_str() {
        Some(label) => (
            format!("{title}, s. {label}"),
            format!("{title}, art. {label}"),
        ),
        None => match metadata["term"].as_str() {
            Some(term) => (
                format!("\u{201c}{term}\u{201d}, {title}"),
                format!("\u{ab} {term} \u{bb}, {title}"),
            ),
            None => (title.to_string(), title.to_string()),
        },
    }
}

/// Document URLs for both languages, with a section anchor when the result
/// points inside a document.
fn result_urls(metadata: &Value, source_type: &str) -> (String, String) {
    let section_label = metadata["sectionLabel"].as_str();

    let doc_urls = if let Some(act_id) = metadata["actId"].as_str() {
        Some((act_url(act_id, Language::En), act_url(act_id, Language::Fr)))
    } else if let Some(regulation_id) = metadata["regulationId"].as_str() {
        Some((
            regulation_url(regulation_id, Language::En),
            regulation_url(regulation_id, Language::Fr),
        ))
    } else if let (Some(year), Some(chapter)) = (
        metadata["annualStatuteYear"].as_u64(),
        metadata["annualStatuteChapter"].as_str(),
    ) {
        chapter.parse::<u32>().ok().map(|c| {
            (
                annual_statute_url(year as u16, c, Language::En),
                annual_statute_url(year as u16, c, Language::Fr),
            )
        })
    } else {
        None
    };

    match doc_urls {
        Some((en, fr)) => match (source_type, section_label) {
            ("act_section" | "regulation_section", Some(label)) => {
                (section_url(&en, label), section_url(&fr, label))
            }
            _ => (en, fr),
        },
        // Parliament sources carry their own URLs in metadata.
        None => (
            metadata["urlEn"].as_str().unwrap_or("").to_string(),
            metadata["urlFr"].as_str().unwrap_or("").to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(source_type: &str, score: f32) -> SearchResult {
        SearchResult {
            content: String::new(),
            metadata: json!({"sourceType": source_type, "sourceId": format!("{source_type}-{score}")}),
            similarity: score,
        }
    }

    #[test]
    fn mp_info_excludes_hansard_entirely() {
        let config = get_slot_config("mp_info");
        let results = vec![
            result("hansard", 0.99),
            result("politician", 0.9),
            result("riding", 0.8),
            result("hansard", 0.7),
            result("party", 0.6),
            result("bill", 0.5),
        ];
        let picked = allocate_citation_slots(&results, &config, 10);
        assert!(picked.iter().all(|r| r.metadata["sourceType"] != "hansard"));
        // Primaries populate in order: politician, riding, party.
        assert_eq!(picked[0].metadata["sourceType"], "politician");
        assert_eq!(picked[1].metadata["sourceType"], "riding");
        assert_eq!(picked[2].metadata["sourceType"], "party");
        assert_eq!(picked[3].metadata["sourceType"], "bill");
    }

    #[test]
    fn primaries_fill_until_limit() {
        let config = get_slot_config("bill_focused");
        let results = vec![
            result("bill", 0.9),
            result("bill", 0.8),
            result("vote", 0.7),
            result("politician", 0.6),
        ];
        let picked = allocate_citation_slots(&results, &config, 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].metadata["sourceType"], "bill");
        assert_eq!(picked[1].metadata["sourceType"], "bill");
    }

    #[test]
    fn secondary_cap_respected() {
        let config = get_slot_config("bill_focused");
        let results = vec![
            result("bill", 0.9),
            result("politician", 0.8),
            result("politician", 0.7),
            result("committee", 0.6),
        ];
        let picked = allocate_citation_slots(&results, &config, 10);
        // One primary, then at most secondary_cap = 2 secondaries.
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn general_balances_source_types() {
        let config = get_slot_config("general");
        let mut results = Vec::new();
        for i in 0..8 {
            results.push(result("hansard", 0.9 - i as f32 * 0.01));
        }
        results.push(result("bill", 0.5));
        results.push(result("vote", 0.4));

        let picked = allocate_citation_slots(&results, &config, 10);
        // cap = ⌊10·0.4⌋ = 4 per type in the first pass; hansard overflow
        // spills only into otherwise-unfilled slots.
        let hansard = picked
            .iter()
            .filter(|r| r.metadata["sourceType"] == "hansard")
            .count();
        assert!(picked.len() <= 10);
        assert!(hansard >= 4);
        assert!(picked.iter().any(|r| r.metadata["sourceType"] == "bill"));
        assert!(picked.iter().any(|r| r.metadata["sourceType"] == "vote"));
    }

    #[test]
    fn balance_cap_not_exceeded_while_alternatives_exist() {
        let results: Vec<SearchResult> = (0..5)
            .map(|i| result("hansard", 0.9 - i as f32 * 0.01))
            .chain((0..5).map(|i| result("bill", 0.5 - i as f32 * 0.01)))
            .chain((0..5).map(|i| result("vote", 0.3 - i as f32 * 0.01)))
            .collect();
        let refs: Vec<&SearchResult> = results.iter().collect();
        let picked = enforce_balance(&refs, 10, 0.4);
        for st in ["hansard", "bill", "vote"] {
            let count = picked
                .iter()
                .filter(|r| r.metadata["sourceType"] == st)
                .count();
            assert!(count <= 4, "{st} exceeded cap: {count}");
        }
    }

    #[test]
    fn unknown_intent_is_general() {
        let config = get_slot_config("anything_else");
        assert!(config.primary.is_empty());
        assert!(config.excluded.is_empty());
    }

    #[test]
    fn citations_numbered_with_disjoint_prefixes() {
        let mut leg = result("act_section", 0.9);
        leg.metadata = json!({
            "sourceType": "act_section",
            "sourceId": "C-46/s318",
            "actId": "C-46",
            "sectionLabel": "318",
            "title": "Criminal Code",
        });
        let parl = SearchResult {
            content: String::new(),
            metadata: json!({
                "sourceType": "bill",
                "sourceId": 123,
                "title": "An Act to amend something",
                "urlEn": "https://example.org/bills/123",
            }),
            similarity: 0.8,
        };
        let mut leg2 = result("act", 0.7);
        leg2.metadata = json!({
            "sourceType": "act",
            "sourceId": "A-1",
            "actId": "A-1",
            "title": "Access to Information Act",
        });

        let citations = build_citations(&[leg, parl, leg2]);
        assert_eq!(citations[0].prefixed_id, "L1");
        assert_eq!(citations[1].prefixed_id, "P1");
        assert_eq!(citations[2].prefixed_id, "L2");
        assert_eq!(citations[0].id, 1);
        assert_eq!(citations[2].id, 3);

        assert_eq!(
            citations[0].url_en,
            "https://laws-lois.justice.gc.ca/eng/acts/C-46/page-1.html#sec318"
        );
        assert_eq!(
            citations[0].url_fr,
            "https://laws-lois.justice.gc.ca/fra/lois/C-46/page-1.html#sec318"
        );
        assert_eq!(citations[0].text_en, "Criminal Code, s. 318");
        assert_eq!(citations[0].text_fr, "Criminal Code, art. 318");
        assert_eq!(citations[1].url_en, "https://example.org/bills/123");
        assert_eq!(
            citations[2].url_en,
            "https://laws-lois.justice.gc.ca/eng/acts/A-1/"
        );
    }
}
