//! Footnotes, historical notes, and amendment metadata.

use canlex_core::types::{Amendment, Footnote, HistoricalNote, RelatedProvision};

use crate::dates::find_date;
use crate::dom::XmlElement;
use crate::text::extract_text;

/// Collect `Footnote` bodies from a section subtree.
pub fn collect_footnotes(section: &XmlElement) -> Vec<Footnote> {
    section
        .descendants()
        .into_iter()
        .filter(|e| e.is("Footnote"))
        .filter_map(|footnote| {
            let label = footnote
                .child("Label")
                .map(extract_text)
                .or_else(|| footnote.attr("id").map(str::to_string))?;
            let text = match footnote.child("Text") {
                Some(t) => extract_text(t),
                None => extract_text(footnote),
            };
            if text.is_empty() {
                return None;
            }
            Some(Footnote { label, text })
        })
        .collect()
}

/// Collect `HistoricalNote/HistoricalNoteSubItem` citations with any LIMS
/// dates carried on the sub-item.
pub fn collect_historical_notes(section: &XmlElement) -> Vec<HistoricalNote> {
    let mut notes = Vec::new();
    for historical in section
        .descendants()
        .into_iter()
        .filter(|e| e.is("HistoricalNote"))
    {
        let sub_items: Vec<&XmlElement> = historical
            .descendants()
            .into_iter()
            .filter(|e| e.is("HistoricalNoteSubItem"))
            .collect();
        if sub_items.is_empty() {
            // Bare note text without sub-items.
            let citation = extract_text(historical);
            if !citation.is_empty() {
                notes.push(HistoricalNote {
                    citation,
                    enacted_date: historical.lims_attr("enacted-date").map(str::to_string),
                    in_force_date: historical
                        .lims_attr("inforce-start-date")
                        .map(str::to_string),
                });
            }
            continue;
        }
        for item in sub_items {
            let citation = extract_text(item);
            if citation.is_empty() {
                continue;
            }
            notes.push(HistoricalNote {
                citation,
                enacted_date: item.lims_attr("enacted-date").map(str::to_string),
                in_force_date: item.lims_attr("inforce-start-date").map(str::to_string),
            });
        }
    }
    notes
}

/// Parse `RecentAmendments/Amendment(AmendmentCitation, AmendmentDate)`.
pub fn parse_recent_amendments(container: &XmlElement) -> Vec<Amendment> {
    container
        .descendants()
        .into_iter()
        .filter(|e| e.is("Amendment"))
        .filter_map(|amendment| {
            let citation = amendment.child("AmendmentCitation").map(extract_text)?;
            if citation.is_empty() {
                return None;
            }
            let date = amendment
                .child("AmendmentDate")
                .and_then(|d| find_date(d).or_else(|| non_empty(extract_text(d))));
            Some(Amendment { citation, date })
        })
        .collect()
}

/// Parse `RelatedProvisions/RelatedProvision` pointers.
pub fn parse_related_provisions(container: &XmlElement) -> Vec<RelatedProvision> {
    container
        .descendants()
        .into_iter()
        .filter(|e| e.is("RelatedProvision"))
        .filter_map(|provision| {
            let citation = provision
                .attr("link")
                .map(str::to_string)
                .or_else(|| provision.child("XRefExternal").map(extract_text))
                .or_else(|| provision.child("Citation").map(extract_text))?;
            let text = extract_text(provision);
            if citation.is_empty() {
                return None;
            }
            Some(RelatedProvision { citation, text })
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
