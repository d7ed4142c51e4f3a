//! Top-level legislation XML parsing: one file → one `ParsedDocument`.
//!
//! The parser never yields a partial document. Malformed XML, a missing
//! `Identification` block, or a missing chapter/instrument number fail the
//! whole file; unrecognized inline elements merely pass through as text.

use std::path::{Path, PathBuf};

use canlex_core::citation::file_safe_id;
use canlex_core::types::{
    Act, BillOrigin, Document, DocumentStatus, Language, ParsedDocument, Regulation,
};

use crate::body::BodyWalker;
use crate::dates::find_date;
use crate::dom::{self, XmlElement};
use crate::error::ParseError;
use crate::history::{parse_recent_amendments, parse_related_provisions};
use crate::text::extract_text;

/// Parse a legislation XML file for the given language row.
pub fn parse_legislation_xml(
    path: &Path,
    language: Language,
) -> Result<ParsedDocument, ParseError> {
    let xml = std::fs::read_to_string(path)
        .map_err(|e| ParseError::failure(path, format!("read failed: {e}")))?;
    parse_legislation_str(&xml, language).map_err(|e| match e {
        ParseError::ParseFailure { reason, .. } => ParseError::failure(path, reason),
        other => ParseError::failure(path, other.to_string()),
    })
}

/// Parse legislation XML from memory. Structural failures report the
/// placeholder path `<inline>`.
pub fn parse_legislation_str(
    xml: &str,
    language: Language,
) -> Result<ParsedDocument, ParseError> {
    let root = dom::parse_xml_str(xml)?;
    match root.local_name() {
        "Statute" => parse_statute(&root, language),
        "Regulation" => parse_regulation(&root, language),
        other => Err(failure(format!(
            "unexpected root element '{other}' (expected Statute or Regulation)"
        ))),
    }
}

fn failure(reason: String) -> ParseError {
    ParseError::ParseFailure {
        path: PathBuf::from("<inline>"),
        reason,
    }
}

// ── Statutes ──

fn parse_statute(root: &XmlElement, language: Language) -> Result<ParsedDocument, ParseError> {
    let ident = root
        .child("Identification")
        .ok_or_else(|| failure("missing Identification".into()))?;

    let consolidated = ident
        .child("Chapter")
        .and_then(|c| c.child("ConsolidatedNumber"));
    let annual = ident.child("AnnualStatuteId");

    let (annual_statute_year, annual_statute_chapter) = match annual {
        Some(a) => (
            a.child("StatuteYear")
                .and_then(|y| y.raw_text().trim().parse::<i32>().ok()),
            a.child("Chapter").map(extract_text).filter(|c| !c.is_empty()),
        ),
        None => (None, None),
    };

    let act_id = match consolidated.map(extract_text).filter(|t| !t.is_empty()) {
        Some(number) => number,
        None => match (annual_statute_year, annual_statute_chapter.as_deref()) {
            (Some(year), Some(chapter)) => format!("{year}_c{chapter}"),
            _ => return Err(failure("missing ChapterNumber".into())),
        },
    };

    let short_title = ident.child("ShortTitle");
    let long_title = ident
        .child("LongTitle")
        .map(extract_text)
        .filter(|t| !t.is_empty());
    let title = short_title
        .map(extract_text)
        .filter(|t| !t.is_empty())
        .or_else(|| long_title.clone())
        .ok_or_else(|| failure("missing ShortTitle and LongTitle".into()))?;

    let act = Act {
        act_id: act_id.clone(),
        language,
        title,
        long_title,
        running_head: child_text(ident, "RunningHead"),
        short_title_status: short_title
            .and_then(|s| s.attr("status"))
            .map(str::to_string),
        status: document_status(root),
        in_force_date: root.lims_attr("inforce-start-date").map(str::to_string),
        enacted_date: ident.child("Date").and_then(find_date),
        last_amended_date: last_amended(root),
        consolidation_date: ident
            .child("ConsolidationDate")
            .and_then(find_date)
            .or_else(|| root.lims_attr("current-date").map(str::to_string)),
        bill_origin: bill_origin(root),
        bill_type: root.attr("bill-type").map(str::to_string),
        consolidated_number: consolidated
            .map(extract_text)
            .filter(|t| !t.is_empty()),
        consolidated_number_official: consolidated
            .and_then(|c| c.attr("official"))
            .map(str::to_string),
        annual_statute_year,
        annual_statute_chapter,
        bill_history: child_text(ident, "BillHistory"),
        recent_amendments: root
            .find_descendant("RecentAmendments")
            .map(parse_recent_amendments)
            .unwrap_or_default(),
        preamble: preamble_text(root),
        related_provisions: root
            .find_descendant("RelatedProvisions")
            .map(parse_related_provisions)
            .unwrap_or_default(),
        signature_blocks: signature_blocks(root),
        table_of_provisions: root
            .find_descendant("TableOfProvisions")
            .map(extract_text)
            .filter(|t| !t.is_empty()),
        has_previous_version: flag_attr(root, "has-previous-version"),
    };

    let mut walker = BodyWalker::new(language, Some(act_id), None);
    walk_structure(root, &mut walker);

    Ok(ParsedDocument {
        document: Document::Act(act),
        sections: walker.sections,
        defined_terms: walker.defined_terms,
        cross_references: walker.cross_references,
    })
}

// ── Regulations ──

fn parse_regulation(root: &XmlElement, language: Language) -> Result<ParsedDocument, ParseError> {
    let ident = root
        .child("Identification")
        .ok_or_else(|| failure("missing Identification".into()))?;

    let instrument_number = child_text(ident, "InstrumentNumber")
        .ok_or_else(|| failure("missing InstrumentNumber".into()))?;
    let regulation_id = file_safe_id(&instrument_number);

    let enabling = ident
        .children_named("EnablingAuthority")
        .collect::<Vec<_>>();
    let enabling_authorities: Vec<String> = enabling
        .iter()
        .map(|e| extract_text(e))
        .filter(|t| !t.is_empty())
        .collect();
    let enabling_act = enabling.iter().find_map(|e| {
        e.descendants().into_iter().find(|x| {
            x.is("XRefExternal")
                && x.attr("reference-type") == Some("act")
                && x.attr("link").is_some()
        })
    });

    let long_title = ident
        .child("LongTitle")
        .map(extract_text)
        .filter(|t| !t.is_empty());
    let title = ident
        .child("ShortTitle")
        .map(extract_text)
        .filter(|t| !t.is_empty())
        .or_else(|| long_title.clone())
        .unwrap_or_else(|| instrument_number.clone());

    let regulation = Regulation {
        regulation_id: regulation_id.clone(),
        language,
        regulation_type: regulation_type(&instrument_number),
        instrument_number,
        gazette_part: root.attr("gazette-part").map(str::to_string),
        title,
        long_title,
        enabling_authorities,
        enabling_act_id: enabling_act
            .and_then(|x| x.attr("link"))
            .map(str::to_string),
        enabling_act_title: enabling_act.map(|x| extract_text(x)),
        status: document_status(root),
        registration_date: ident.child("RegistrationDate").and_then(find_date),
        consolidation_date: ident
            .child("ConsolidationDate")
            .and_then(find_date)
            .or_else(|| root.lims_attr("current-date").map(str::to_string)),
        last_amended_date: last_amended(root),
        regulation_maker_order: child_text(ident, "RegulationMakerOrder"),
        recent_amendments: root
            .find_descendant("RecentAmendments")
            .map(parse_recent_amendments)
            .unwrap_or_default(),
        related_provisions: root
            .find_descendant("RelatedProvisions")
            .map(parse_related_provisions)
            .unwrap_or_default(),
        has_previous_version: flag_attr(root, "has-previous-version"),
    };

    let mut walker = BodyWalker::new(language, None, Some(regulation_id));
    walk_structure(root, &mut walker);

    Ok(ParsedDocument {
        document: Document::Regulation(regulation),
        sections: walker.sections,
        defined_terms: walker.defined_terms,
        cross_references: walker.cross_references,
    })
}

// ── Shared helpers ──

fn walk_structure(root: &XmlElement, walker: &mut BodyWalker) {
    if let Some(body) = root.child("Body") {
        walker.walk_body(body);
    }
    // Schedules frequently sit beside the body, not inside it.
    for child in root.child_elements() {
        match child.local_name() {
            "Schedules" => walker.walk_schedules(child),
            "Schedule" => walker.walk_schedule(child),
            _ => {}
        }
    }
}

fn child_text(parent: &XmlElement, name: &str) -> Option<String> {
    parent
        .child(name)
        .map(extract_text)
        .filter(|t| !t.is_empty())
}

fn document_status(root: &XmlElement) -> DocumentStatus {
    match root.attr("status") {
        Some("repealed") => DocumentStatus::Repealed,
        Some("not-in-force") => DocumentStatus::NotInForce,
        _ => match root.attr("in-force") {
            Some("no") | Some("false") => DocumentStatus::NotInForce,
            _ => DocumentStatus::InForce,
        },
    }
}

fn bill_origin(root: &XmlElement) -> Option<BillOrigin> {
    match root.attr("bill-origin") {
        Some("commons") => Some(BillOrigin::Commons),
        Some("senate") => Some(BillOrigin::Senate),
        _ => None,
    }
}

fn last_amended(root: &XmlElement) -> Option<String> {
    root.lims_attr("lastAmendedDate")
        .or_else(|| root.lims_attr("last-amended-date"))
        .map(str::to_string)
}

fn flag_attr(root: &XmlElement, name: &str) -> Option<bool> {
    root.attr(name)
        .or_else(|| root.lims_attr(name))
        .map(|v| matches!(v, "true" | "yes"))
}

fn preamble_text(root: &XmlElement) -> Option<String> {
    let body = root.child("Body")?;
    let preamble = body
        .child("Introduction")
        .and_then(|i| i.child("Preamble"))
        .or_else(|| body.child("Preamble"))?;
    let text = extract_text(preamble);
    if text.is_empty() { None } else { Some(text) }
}

fn signature_blocks(root: &XmlElement) -> Option<String> {
    let blocks: Vec<String> = root
        .descendants()
        .into_iter()
        .filter(|e| e.is("SignatureBlock"))
        .map(extract_text)
        .filter(|t| !t.is_empty())
        .collect();
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

/// `SOR/2007-151` → `SOR`; `C.R.C., c. 870` → `CRC`; `SI/2010-1` → `SI`.
fn regulation_type(instrument_number: &str) -> Option<String> {
    let head: String = instrument_number
        .chars()
        .take_while(|c| *c != '/' && !c.is_whitespace() && *c != ',')
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if head.is_empty() || head.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(head)
    }
}
