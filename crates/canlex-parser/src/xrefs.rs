//! Cross-reference extraction.
//!
//! `XRefExternal` yields a reference only when both a recognized
//! `reference-type` and a `link` are present; anything else is dropped
//! silently (the text still renders). `XRefInternal` yields a section-typed
//! reference and is also captured per-section for anchor building.

use canlex_core::types::{CrossReference, InternalReference, Language, ReferenceTargetType};

use crate::dom::XmlElement;
use crate::text::extract_text;

/// Harvest external and internal references from one section subtree.
pub fn extract_references(
    section: &XmlElement,
    language: Language,
    act_id: Option<&str>,
    regulation_id: Option<&str>,
    section_label: &str,
) -> (Vec<CrossReference>, Vec<InternalReference>) {
    let mut external = Vec::new();
    let mut internal = Vec::new();

    for element in section.descendants() {
        match element.local_name() {
            "XRefExternal" => {
                let target_type = element
                    .attr("reference-type")
                    .and_then(ReferenceTargetType::from_reference_type);
                let link = element.attr("link");
                if let (Some(target_type), Some(link)) = (target_type, link) {
                    external.push(CrossReference {
                        source_act_id: act_id.map(str::to_string),
                        source_regulation_id: regulation_id.map(str::to_string),
                        source_section_label: section_label.to_string(),
                        language,
                        target_type,
                        target_ref: link.to_string(),
                        reference_text: extract_text(element),
                    });
                }
            }
            "XRefInternal" => {
                let text = extract_text(element);
                if text.is_empty() {
                    continue;
                }
                external.push(CrossReference {
                    source_act_id: act_id.map(str::to_string),
                    source_regulation_id: regulation_id.map(str::to_string),
                    source_section_label: section_label.to_string(),
                    language,
                    target_type: ReferenceTargetType::Section,
                    target_ref: text.clone(),
                    reference_text: text.clone(),
                });
                internal.push(InternalReference {
                    target_label: text.clone(),
                    target_id: element.attr("idref").map(str::to_string),
                    reference_text: text,
                });
            }
            _ => {}
        }
    }

    (external, internal)
}
