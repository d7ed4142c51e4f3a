//! Token-bounded, legal-boundary-aware chunking of section content.
//!
//! Large sections are split at legal unit markers — subsection `(1)`,
//! paragraph `(a)`, subparagraph `(i)`, clause `(A)` — so a chunk never cuts
//! a provision mid-marker. Chunks carry a document/section context prefix and
//! overlap whole trailing units from the previous chunk.

use std::sync::LazyLock;

use regex::Regex;

use crate::token::TokenCounter;
use crate::types::{HistoricalNote, Language, Section};

/// Token budget for a chunk, prefix included.
pub const TARGET_CHUNK_TOKENS: usize = 512;

/// Token budget carried over from the tail of the previous chunk.
pub const OVERLAP_TOKENS: usize = 64;

/// Slack reserved against tokenizer drift between the heuristic and exact counters.
const SAFETY_MARGIN_TOKENS: usize = 10;

/// Smallest usable body budget, applied when a pathological prefix would
/// otherwise consume the whole target.
const MIN_BODY_TOKENS: usize = 32;

/// Legal unit marker: a parenthesized label at start-of-text or after
/// whitespace. Anchoring avoids matching parenthesized asides inside words
/// or formulas.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)\((\d+(?:\.\d+)*|[a-z]+(?:\.\d+)*|[A-Z]+)\)").expect("marker regex")
});

/// A token-bounded slice of a section, the unit of embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// `{sourceType}:{id}:{lang}:{chunkIndex}` — globally unique.
    pub resource_key: String,
}

/// Per-call chunking options.
#[derive(Debug, Clone, Default)]
pub struct ChunkOptions {
    pub language: Language,
    /// Appended to the section content under a `History:` / `Historique:` label.
    pub historical_notes: Vec<HistoricalNote>,
}

/// Kind of legal unit marker, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Subsection,
    Paragraph,
    Subparagraph,
    Clause,
}

/// Classify a marker label. Single `i`, `v`, `x` are ambiguous between
/// paragraph and roman subparagraph; legislative drafting order makes the
/// roman reading overwhelmingly more likely, so they classify as subparagraphs.
fn classify_marker(label: &str) -> MarkerKind {
    let first = label.chars().next().unwrap_or('0');
    if first.is_ascii_digit() {
        return MarkerKind::Subsection;
    }
    if first.is_ascii_uppercase() {
        return MarkerKind::Clause;
    }
    let roman = label.chars().all(|c| matches!(c, 'i' | 'v' | 'x' | 'l' | 'c' | 'd' | 'm'));
    if roman && (label.len() > 1 || matches!(label, "i" | "v" | "x")) {
        MarkerKind::Subparagraph
    } else {
        MarkerKind::Paragraph
    }
}

/// True iff the section has nothing to embed. Repealed sections that still
/// carry text are kept — the repeal record is part of the legal record.
pub fn should_skip_section(section: &Section) -> bool {
    section.content.trim().is_empty()
}

/// Split a section into token-bounded chunks.
///
/// Every chunk begins with a context prefix naming the document and section.
/// If the whole content fits in [`TARGET_CHUNK_TOKENS`], one chunk is emitted;
/// otherwise content splits at legal unit boundaries, packed greedily, with
/// whole-unit overlap between consecutive chunks.
pub fn chunk_section<C: TokenCounter>(
    section: &Section,
    document_title: &str,
    options: &ChunkOptions,
    counter: &C,
) -> Vec<Chunk> {
    let prefix = chunk_prefix(section, document_title);
    let content = content_with_history(section, options);

    let prefix_tokens = counter.count_tokens(&prefix);
    let content_tokens = counter.count_tokens(&content);

    let bodies: Vec<String> = if prefix_tokens + content_tokens <= TARGET_CHUNK_TOKENS {
        vec![content]
    } else {
        let budget = TARGET_CHUNK_TOKENS
            .saturating_sub(prefix_tokens + SAFETY_MARGIN_TOKENS)
            .max(MIN_BODY_TOKENS);
        pack_units(&split_legal_units(&content), budget, counter)
    };

    let total = bodies.len();
    let resource_prefix = section_resource_prefix(section, options.language);
    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| Chunk {
            content: format!("{prefix}{body}"),
            chunk_index: i,
            total_chunks: total,
            resource_key: format!("{resource_prefix}:{i}"),
        })
        .collect()
}

/// `{sourceType}:{docId}/s{label}:{lang}` — the chunk index completes the key.
fn section_resource_prefix(section: &Section, language: Language) -> String {
    format!(
        "{}:{}/s{}:{}",
        section.source_type(),
        section.document_id(),
        section.section_label,
        language
    )
}

fn chunk_prefix(section: &Section, document_title: &str) -> String {
    match &section.marginal_note {
        Some(note) if !note.trim().is_empty() => format!(
            "{document_title}\nSection {}: {}\n\n",
            section.section_label, note
        ),
        _ => format!("{document_title}\nSection {}\n\n", section.section_label),
    }
}

fn content_with_history(section: &Section, options: &ChunkOptions) -> String {
    if options.historical_notes.is_empty() {
        return section.content.clone();
    }
    let label = match options.language {
        Language::En => "History:",
        Language::Fr => "Historique:",
    };
    let items: Vec<String> = options
        .historical_notes
        .iter()
        .map(|note| format_history_item(note, options.language))
        .collect();
    format!("{}\n\n{} {}", section.content, label, items.join("; "))
}

fn format_history_item(note: &HistoricalNote, language: Language) -> String {
    let (enacted, in_force) = match language {
        Language::En => ("enacted", "in force"),
        Language::Fr => ("édicté", "en vigueur"),
    };
    let mut dates = Vec::new();
    if let Some(d) = &note.enacted_date {
        dates.push(format!("{enacted} {d}"));
    }
    if let Some(d) = &note.in_force_date {
        dates.push(format!("{in_force} {d}"));
    }
    if dates.is_empty() {
        note.citation.clone()
    } else {
        format!("{} ({})", note.citation, dates.join(", "))
    }
}

/// A legal unit: text from one marker up to the next. `kind` is `None` for
/// preamble text before the first marker.
#[derive(Debug)]
struct LegalUnit {
    text: String,
    #[allow(dead_code)]
    kind: Option<MarkerKind>,
}

/// Split content into legal units at marker boundaries. Text between markers
/// belongs to the preceding unit; preamble before the first marker becomes an
/// initial unmarked unit.
fn split_legal_units(content: &str) -> Vec<LegalUnit> {
    let mut boundaries: Vec<(usize, MarkerKind)> = Vec::new();
    for caps in MARKER_RE.captures_iter(content) {
        let label = caps.get(1).expect("marker label group");
        // The '(' immediately precedes the label; '(' is one byte.
        boundaries.push((label.start() - 1, classify_marker(label.as_str())));
    }

    if boundaries.is_empty() {
        return vec![LegalUnit {
            text: content.trim().to_string(),
            kind: None,
        }];
    }

    let mut units = Vec::with_capacity(boundaries.len() + 1);
    let preamble = content[..boundaries[0].0].trim();
    if !preamble.is_empty() {
        units.push(LegalUnit {
            text: preamble.to_string(),
            kind: None,
        });
    }
    for (i, &(start, kind)) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).map_or(content.len(), |&(e, _)| e);
        let text = content[start..end].trim();
        if !text.is_empty() {
            units.push(LegalUnit {
                text: text.to_string(),
                kind: Some(kind),
            });
        }
    }
    units
}

/// Greedily pack units into bodies of at most `budget` tokens, carrying
/// whole-unit overlap between consecutive bodies.
fn pack_units<C: TokenCounter>(units: &[LegalUnit], budget: usize, counter: &C) -> Vec<String> {
    // The carried overlap must leave room for new material.
    let overlap_budget = OVERLAP_TOKENS.min(budget / 2);
    let mut bodies: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for unit in units {
        let unit_tokens = counter.count_tokens(&unit.text);

        if unit_tokens > budget {
            // Oversized unit: flush what we have, then force-split by words.
            if !current.is_empty() {
                bodies.push(current.join("\n"));
                current.clear();
                current_tokens = 0;
            }
            bodies.extend(force_split_words(&unit.text, budget, counter));
            continue;
        }

        if current_tokens + unit_tokens > budget && !current.is_empty() {
            let body = current.join("\n");
            let overlap = trailing_overlap(&current, overlap_budget, counter);
            bodies.push(body);
            current = overlap;
            current_tokens = current
                .iter()
                .map(|u| counter.count_tokens(u))
                .sum();
        }

        current.push(&unit.text);
        current_tokens += unit_tokens;
    }

    if !current.is_empty() {
        bodies.push(current.join("\n"));
    }
    bodies
}

/// Whole trailing units of `current` that fit inside `overlap_budget`.
fn trailing_overlap<'a, C: TokenCounter>(
    current: &[&'a str],
    overlap_budget: usize,
    counter: &C,
) -> Vec<&'a str> {
    let mut overlap: Vec<&str> = Vec::new();
    let mut tokens = 0usize;
    for unit in current.iter().rev() {
        let t = counter.count_tokens(unit);
        if tokens + t > overlap_budget {
            break;
        }
        overlap.push(unit);
        tokens += t;
    }
    overlap.reverse();
    overlap
}

/// Last-resort split of a single oversized unit by words, with word-level
/// overlap between consecutive pieces.
fn force_split_words<C: TokenCounter>(text: &str, budget: usize, counter: &C) -> Vec<String> {
    let overlap_budget = OVERLAP_TOKENS.min(budget / 2);
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut bodies = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for word in words {
        let t = counter.count_tokens(word).max(1);
        if current_tokens + t > budget && !current.is_empty() {
            bodies.push(current.join(" "));

            // Word-level overlap from the tail.
            let mut overlap: Vec<&str> = Vec::new();
            let mut tokens = 0usize;
            for w in current.iter().rev() {
                let wt = counter.count_tokens(w).max(1);
                if tokens + wt > overlap_budget {
                    break;
                }
                overlap.push(w);
                tokens += wt;
            }
            overlap.reverse();
            current = overlap;
            current_tokens = tokens;
        }
        current.push(word);
        current_tokens += t;
    }

    if !current.is_empty() {
        bodies.push(current.join(" "));
    }
    bodies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::HeuristicTokenCounter;
    use crate::types::DocumentStatus;

    const COUNTER: HeuristicTokenCounter = HeuristicTokenCounter;

    fn section(label: &str, content: &str) -> Section {
        Section {
            act_id: Some("C-46".into()),
            section_label: label.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn small_section_single_chunk() {
        let s = section("2", "Every one commits an offence who does the thing.");
        let chunks = chunk_section(&s, "Criminal Code", &ChunkOptions::default(), &COUNTER);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert!(chunks[0].content.starts_with("Criminal Code\nSection 2\n\n"));
        assert_eq!(chunks[0].resource_key, "act_section:C-46/s2:en:0");
    }

    #[test]
    fn marginal_note_in_prefix() {
        let mut s = section("3", "Some content.");
        s.marginal_note = Some("Interpretation".into());
        let chunks = chunk_section(&s, "Criminal Code", &ChunkOptions::default(), &COUNTER);
        assert!(
            chunks[0]
                .content
                .starts_with("Criminal Code\nSection 3: Interpretation\n\n")
        );
    }

    #[test]
    fn history_appended_with_dates() {
        let s = section("5", "Content here.");
        let options = ChunkOptions {
            language: Language::En,
            historical_notes: vec![
                HistoricalNote {
                    citation: "2019, c. 29, s. 102".into(),
                    enacted_date: Some("2019-06-21".into()),
                    in_force_date: None,
                },
                HistoricalNote {
                    citation: "2021, c. 4, s. 7".into(),
                    enacted_date: None,
                    in_force_date: Some("2021-09-01".into()),
                },
            ],
        };
        let chunks = chunk_section(&s, "Some Act", &options, &COUNTER);
        assert!(chunks[0].content.contains(
            "History: 2019, c. 29, s. 102 (enacted 2019-06-21); 2021, c. 4, s. 7 (in force 2021-09-01)"
        ));
    }

    #[test]
    fn french_history_label() {
        let mut s = section("5", "Contenu.");
        s.language = Language::Fr;
        let options = ChunkOptions {
            language: Language::Fr,
            historical_notes: vec![HistoricalNote {
                citation: "2019, ch. 29, art. 102".into(),
                enacted_date: None,
                in_force_date: None,
            }],
        };
        let chunks = chunk_section(&s, "Loi", &options, &COUNTER);
        assert!(chunks[0].content.contains("Historique: 2019, ch. 29, art. 102"));
    }

    #[test]
    fn marker_classification() {
        assert_eq!(classify_marker("1"), MarkerKind::Subsection);
        assert_eq!(classify_marker("2.1"), MarkerKind::Subsection);
        assert_eq!(classify_marker("a"), MarkerKind::Paragraph);
        assert_eq!(classify_marker("aa"), MarkerKind::Paragraph);
        // Ambiguous single romans read as subparagraphs.
        assert_eq!(classify_marker("i"), MarkerKind::Subparagraph);
        assert_eq!(classify_marker("v"), MarkerKind::Subparagraph);
        assert_eq!(classify_marker("x"), MarkerKind::Subparagraph);
        assert_eq!(classify_marker("ii"), MarkerKind::Subparagraph);
        assert_eq!(classify_marker("iv"), MarkerKind::Subparagraph);
        assert_eq!(classify_marker("A"), MarkerKind::Clause);
    }

    #[test]
    fn marker_anchored_to_whitespace() {
        // "(1)" inside a word must not split.
        let units = split_legal_units("subsection(1) of the Act applies");
        assert_eq!(units.len(), 1);

        let units = split_legal_units("Intro text. (1) First rule. (2) Second rule.");
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "Intro text.");
        assert!(units[1].text.starts_with("(1)"));
        assert!(units[2].text.starts_with("(2)"));
    }

    #[test]
    fn inter_marker_text_stays_with_preceding_unit() {
        let units = split_legal_units("(1) First rule. Trailing rider sentence. (2) Second.");
        assert_eq!(units.len(), 2);
        assert!(units[0].text.contains("Trailing rider sentence."));
    }

    /// Large marked-up content splits at legal boundaries, never mid-marker.
    #[test]
    fn large_section_splits_at_unit_boundaries() {
        let mut content = String::new();
        for n in 1..=12 {
            content.push_str(&format!(
                "({n}) Every person who contravenes a provision of the regulations made \
                 under this section is guilty of an offence punishable on summary conviction \
                 and liable to the penalty established for the purposes of this subsection. "
            ));
            for letter in ["a", "b", "c"] {
                content.push_str(&format!(
                    "({letter}) in the case of a first offence committed by the person, \
                     a fine of not more than the prescribed amount determined in the manner \
                     set out in the applicable schedule to these regulations; "
                ));
            }
        }
        let s = section("7", content.trim());
        let chunks = chunk_section(&s, "Some Act", &ChunkOptions::default(), &COUNTER);
        assert!(chunks.len() > 1, "expected multiple chunks");

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, chunks.len());
            assert!(
                COUNTER.count_tokens(&chunk.content) <= TARGET_CHUNK_TOKENS + 50,
                "chunk {i} over budget"
            );
            // Every body line starts at a unit boundary (all units here are marked).
            let body = chunk.content.splitn(2, "\n\n").nth(1).unwrap();
            for line in body.lines().filter(|l| !l.is_empty()) {
                assert!(line.starts_with('('), "split mid-unit: {line:?}");
            }
        }
    }

    #[test]
    fn overlap_is_whole_units() {
        let current = vec!["(a) short unit one.", "(b) short unit two."];
        let overlap = trailing_overlap(&current, OVERLAP_TOKENS, &COUNTER);
        // Both fit well under the overlap budget, so both carry over, in order.
        assert_eq!(overlap, current);
    }

    #[test]
    fn oversized_unit_force_splits_by_words() {
        let word = "jurisdiction";
        let huge = vec![word; 2000].join(" ");
        let bodies = force_split_words(&huge, 100, &COUNTER);
        assert!(bodies.len() > 1);
        for body in &bodies {
            assert!(COUNTER.count_tokens(body) <= 100 + OVERLAP_TOKENS);
        }
        // Consecutive pieces share overlapping words.
        assert!(bodies[1].starts_with(word));
    }

    #[test]
    fn chunk_indexes_dense_and_shared_total() {
        let content = ["(1) rule one text that goes on for a while with many additional words to inflate the count; "; 60].concat();
        let s = section("9", &content);
        let chunks = chunk_section(&s, "Some Act", &ChunkOptions::default(), &COUNTER);
        let total = chunks.len();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, total);
        }
    }

    #[test]
    fn resource_keys_deterministic() {
        let content = "(1) A rule. (a) a paragraph. (i) a subparagraph.";
        let s = section("12", content);
        let a = chunk_section(&s, "Some Act", &ChunkOptions::default(), &COUNTER);
        let b = chunk_section(&s, "Some Act", &ChunkOptions::default(), &COUNTER);
        let keys_a: Vec<_> = a.iter().map(|c| c.resource_key.clone()).collect();
        let keys_b: Vec<_> = b.iter().map(|c| c.resource_key.clone()).collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn skip_policy() {
        assert!(should_skip_section(&section("1", "")));
        assert!(should_skip_section(&section("1", "   \n ")));
        let mut repealed = section("1", "[Repealed, 2019, c. 29, s. 1]");
        repealed.status = DocumentStatus::Repealed;
        assert!(!should_skip_section(&repealed));
    }
}
