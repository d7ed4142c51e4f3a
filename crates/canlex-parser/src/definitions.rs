//! Defined-term harvesting from `Definition` wrappers.
//!
//! Terms are harvested only inside a `Definition` element. When a section
//! carries `Definition` wrappers, any other in-body `DefinedTermEn`/`Fr`
//! occurrence is a cross-reference to an existing term and must not be
//! harvested.

use std::sync::LazyLock;

use regex::Regex;

use canlex_core::types::{DefinedTerm, Language, ScopeType};

use crate::dom::XmlElement;
use crate::text::extract_text;

/// "In this Act" / "la présente loi" — marks a whole-act definitions scope.
static ACT_SCOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(in this Act\b|la présente loi|du présent règlement|in these Regulations\b)")
        .expect("act scope regex")
});

/// "In this Part" / "la présente partie".
static PART_SCOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(in this (Part|Division)\b|la présente (partie|section)\b)")
        .expect("part scope regex")
});

/// Section lists like "sections 3 to 9" / "articles 3 à 9".
static SCOPE_SECTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sections?|articles?)\s+(\d+(?:\.\d+)?)(?:\s+(?:to|à)\s+(\d+(?:\.\d+)?))?")
        .expect("scope sections regex")
});

/// Harvest every defined term of a section.
///
/// `section_intro` is the section's leading text (before the wrappers), used
/// to decide scope. Owner ids follow the section's owner.
pub fn extract_defined_terms(
    section: &XmlElement,
    section_intro: &str,
    language: Language,
    act_id: Option<&str>,
    regulation_id: Option<&str>,
    section_label: &str,
) -> Vec<DefinedTerm> {
    let (scope_type, scope_sections) = classify_scope(section_intro);

    definition_wrappers(section)
        .into_iter()
        .filter_map(|wrapper| {
            let term = first_term(wrapper, language)?;
            Some(DefinedTerm {
                language,
                term,
                act_id: act_id.map(str::to_string),
                regulation_id: regulation_id.map(str::to_string),
                section_label: Some(section_label.to_string()),
                scope_type,
                scope_sections: scope_sections.clone(),
                paired_term: paired_term(wrapper, language),
            })
        })
        .collect()
}

/// All `Definition` wrappers in the section, in document order, without
/// descending into a wrapper to find nested wrappers twice.
fn definition_wrappers(section: &XmlElement) -> Vec<&XmlElement> {
    let mut out = Vec::new();
    fn walk<'a>(e: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
        for child in e.child_elements() {
            if child.is("Definition") {
                out.push(child);
            } else {
                walk(child, out);
            }
        }
    }
    walk(section, &mut out);
    out
}

/// The defined term itself: the first same-language `DefinedTerm*` inside the
/// wrapper.
fn first_term(wrapper: &XmlElement, language: Language) -> Option<String> {
    let name = same_language_tag(language);
    let term = extract_text(wrapper.find_descendant(name)?);
    if term.is_empty() { None } else { Some(term) }
}

/// The other-language pairing: the first opposite-language `DefinedTerm*`
/// found anywhere in the wrapper subtree, however deeply nested. Exact
/// duplicates collapse to the first occurrence.
fn paired_term(wrapper: &XmlElement, language: Language) -> Option<String> {
    let name = other_language_tag(language);
    let mut seen: Vec<String> = Vec::new();
    fn walk(e: &XmlElement, name: &str, seen: &mut Vec<String>) {
        for child in e.child_elements() {
            if child.is(name) {
                let text = extract_text(child);
                if !text.is_empty() && !seen.contains(&text) {
                    seen.push(text);
                }
            }
            walk(child, name, seen);
        }
    }
    walk(wrapper, name, &mut seen);
    seen.into_iter().next()
}

fn same_language_tag(language: Language) -> &'static str {
    match language {
        Language::En => "DefinedTermEn",
        Language::Fr => "DefinedTermFr",
    }
}

fn other_language_tag(language: Language) -> &'static str {
    match language {
        Language::En => "DefinedTermFr",
        Language::Fr => "DefinedTermEn",
    }
}

/// Decide the scope of a definitions block from its lead-in sentence.
fn classify_scope(intro: &str) -> (ScopeType, Vec<String>) {
    let mut scope_sections = Vec::new();
    if let Some(caps) = SCOPE_SECTIONS_RE.captures(intro) {
        if let Some(first) = caps.get(1) {
            scope_sections.push(first.as_str().to_string());
        }
        if let Some(last) = caps.get(2) {
            scope_sections.push(last.as_str().to_string());
        }
    }

    if ACT_SCOPE_RE.is_match(intro) {
        (ScopeType::Act, scope_sections)
    } else if PART_SCOPE_RE.is_match(intro) {
        (ScopeType::Part, scope_sections)
    } else {
        (ScopeType::Section, scope_sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xml_str;

    const DEFS_SECTION: &str = r#"<Section>
        <Label>2</Label>
        <Text>In this Act,</Text>
        <Definition>
            <Text><DefinedTermEn>Minister</DefinedTermEn> means the Minister of Justice; (<DefinedTermFr>ministre</DefinedTermFr>)</Text>
        </Definition>
        <Paragraph>
            <Text>The <DefinedTermEn>Minister</DefinedTermEn> may designate a person.</Text>
        </Paragraph>
    </Section>"#;

    #[test]
    fn only_wrapper_terms_harvested() {
        let section = parse_xml_str(DEFS_SECTION).unwrap();
        let terms = extract_defined_terms(
            &section,
            "In this Act,",
            Language::En,
            Some("C-46"),
            None,
            "2",
        );
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "Minister");
        assert_eq!(terms[0].paired_term.as_deref(), Some("ministre"));
        assert_eq!(terms[0].scope_type, ScopeType::Act);
    }

    #[test]
    fn paired_term_found_in_deep_nesting() {
        let xml = r#"<Section><Definition>
            <Text><DefinedTermEn>vessel</DefinedTermEn> includes</Text>
            <Paragraph><Text>any ship or boat, and</Text></Paragraph>
            <Paragraph><Subparagraph><Text>any other description of craft; (<DefinedTermFr>bâtiment</DefinedTermFr>)</Text></Subparagraph></Paragraph>
        </Definition></Section>"#;
        let section = parse_xml_str(xml).unwrap();
        let terms =
            extract_defined_terms(&section, "", Language::En, Some("C-46"), None, "2");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].paired_term.as_deref(), Some("bâtiment"));
        assert_eq!(terms[0].scope_type, ScopeType::Section);
    }

    #[test]
    fn duplicate_paired_terms_first_wins() {
        let xml = r#"<Section><Definition>
            <Text><DefinedTermEn>officer</DefinedTermEn> means (<DefinedTermFr>agent</DefinedTermFr>)</Text>
            <ContinuedDefinition><Text>continued (<DefinedTermFr>agent</DefinedTermFr>) (<DefinedTermFr>fonctionnaire</DefinedTermFr>)</Text></ContinuedDefinition>
        </Definition></Section>"#;
        let section = parse_xml_str(xml).unwrap();
        let terms =
            extract_defined_terms(&section, "", Language::En, Some("C-46"), None, "2");
        assert_eq!(terms[0].paired_term.as_deref(), Some("agent"));
    }

    #[test]
    fn french_document_reverses_tags() {
        let xml = r#"<Section><Definition>
            <Text><DefinedTermFr>ministre</DefinedTermFr> Le ministre de la Justice. (<DefinedTermEn>Minister</DefinedTermEn>)</Text>
        </Definition></Section>"#;
        let section = parse_xml_str(xml).unwrap();
        let terms = extract_defined_terms(
            &section,
            "Les définitions qui suivent s'appliquent à la présente loi.",
            Language::Fr,
            Some("C-46"),
            None,
            "2",
        );
        assert_eq!(terms[0].term, "ministre");
        assert_eq!(terms[0].paired_term.as_deref(), Some("Minister"));
        assert_eq!(terms[0].scope_type, ScopeType::Act);
    }

    #[test]
    fn part_scope() {
        let (scope, _) = classify_scope("In this Part,");
        assert_eq!(scope, ScopeType::Part);
    }

    #[test]
    fn scoped_section_range_captured() {
        let (scope, sections) = classify_scope("In this section and sections 462.3 to 462.5,");
        assert_eq!(scope, ScopeType::Section);
        assert_eq!(sections, vec!["462.3".to_string(), "462.5".to_string()]);
    }

    #[test]
    fn wrapper_without_term_skipped() {
        let xml = "<Section><Definition><Text>orphan wrapper</Text></Definition></Section>";
        let section = parse_xml_str(xml).unwrap();
        let terms =
            extract_defined_terms(&section, "", Language::En, Some("C-46"), None, "2");
        assert!(terms.is_empty());
    }
}
