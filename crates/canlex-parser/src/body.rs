//! Body and schedule traversal: XML provision tree → ordered sections.

use serde_json::json;
use tracing::warn;

use canlex_core::types::{
    ContentFlags, CrossReference, DefinedTerm, DocumentStatus, Language, ProvisionHeading,
    Section, SectionType,
};

use crate::definitions::extract_defined_terms;
use crate::dom::{XmlElement, XmlNode};
use crate::history::{collect_footnotes, collect_historical_notes};
use crate::html;
use crate::text::{extract_text, node_text, normalize_whitespace};
use crate::xrefs::extract_references;

/// Children excluded from section content: captured through dedicated fields.
const NON_CONTENT_CHILDREN: &[&str] = &["Label", "MarginalNote", "HistoricalNote", "Footnote"];

/// Container elements that carry a heading and nest further structure.
const HEADING_CONTAINERS: &[&str] = &["Part", "Division", "Subdivision", "Group"];

/// Walks a document body and its schedules, accumulating ordered sections,
/// defined terms, and cross-references.
pub struct BodyWalker {
    language: Language,
    act_id: Option<String>,
    regulation_id: Option<String>,
    order: i64,
    hierarchy: Vec<String>,
    pub sections: Vec<Section>,
    pub defined_terms: Vec<DefinedTerm>,
    pub cross_references: Vec<CrossReference>,
}

impl BodyWalker {
    pub fn new(
        language: Language,
        act_id: Option<String>,
        regulation_id: Option<String>,
    ) -> Self {
        Self {
            language,
            act_id,
            regulation_id,
            order: 0,
            hierarchy: Vec::new(),
            sections: Vec::new(),
            defined_terms: Vec::new(),
            cross_references: Vec::new(),
        }
    }

    /// Walk a `Body` element.
    pub fn walk_body(&mut self, body: &XmlElement) {
        self.walk_children(body);
    }

    fn walk_children(&mut self, container: &XmlElement) {
        let depth = self.hierarchy.len();
        for child in container.child_elements() {
            match child.local_name() {
                "Section" => self.emit_section(child, SectionType::Section, None, None),
                // Headings are flat siblings of the provisions they label,
                // both at body level and inside Part/Division containers.
                "Heading" | "GroupHeading" => self.apply_flat_heading(child, depth),
                name if HEADING_CONTAINERS.contains(&name) => {
                    self.walk_children(child);
                }
                "Schedules" => self.walk_schedules(child),
                "Schedule" => self.walk_schedule(child),
                // Introduction/Preamble/Enacts are document metadata, handled
                // by the identification pass; skip quietly here.
                _ => {}
            }
        }
        self.hierarchy.truncate(depth);
    }

    /// Flat sibling headings (`Heading[@level]`) rewrite the hierarchy stack
    /// at their level rather than nesting.
    fn apply_flat_heading(&mut self, heading: &XmlElement, base_depth: usize) {
        let text = heading_text(heading);
        if text.is_empty() {
            return;
        }
        let level: usize = heading
            .attr("level")
            .and_then(|l| l.parse().ok())
            .unwrap_or(1);
        self.hierarchy.truncate(base_depth + level.saturating_sub(1));
        self.hierarchy.push(text);
    }

    /// Walk a `Schedules` container.
    pub fn walk_schedules(&mut self, schedules: &XmlElement) {
        for schedule in schedules.children_named("Schedule") {
            self.walk_schedule(schedule);
        }
    }

    /// Walk one `Schedule`.
    ///
    /// Amending and coming-into-force schedules tag all contained sections
    /// `amending`; everything else is `schedule`. A `DocumentInternal` child
    /// produces one section per `Provision`.
    pub fn walk_schedule(&mut self, schedule: &XmlElement) {
        let schedule_id = schedule
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| "Schedule".to_string());
        let section_type = if schedule_is_amending(schedule) {
            SectionType::Amending
        } else {
            SectionType::Schedule
        };
        let bilingual = schedule.descendants().iter().any(|e| {
            e.is("TableGroup") && matches!(e.attr("bilingual"), Some("yes") | Some("true"))
        });

        let depth = self.hierarchy.len();
        let heading = schedule
            .child("ScheduleFormHeading")
            .or_else(|| schedule.child("Heading"))
            .map(heading_text)
            .filter(|h| !h.is_empty());
        self.hierarchy
            .push(heading.unwrap_or_else(|| schedule_id.clone()));

        if let Some(internal) = schedule.find_descendant("DocumentInternal") {
            self.walk_document_internal(internal, section_type, &schedule_id, bilingual);
        } else if schedule.has_descendant("Section") {
            self.walk_schedule_sections(schedule, section_type, &schedule_id, bilingual);
        } else {
            // Content-only schedule (forms, tables, lists): one section.
            self.emit_section(
                schedule,
                section_type,
                Some((schedule_id.as_str(), bilingual)),
                Some(schedule_id.clone()),
            );
        }

        self.hierarchy.truncate(depth);
    }

    fn walk_schedule_sections(
        &mut self,
        container: &XmlElement,
        section_type: SectionType,
        schedule_id: &str,
        bilingual: bool,
    ) {
        for child in container.child_elements() {
            if child.is("Section") {
                self.emit_section(child, section_type, Some((schedule_id, bilingual)), None);
            } else {
                self.walk_schedule_sections(child, section_type, schedule_id, bilingual);
            }
        }
    }

    fn walk_document_internal(
        &mut self,
        internal: &XmlElement,
        section_type: SectionType,
        schedule_id: &str,
        bilingual: bool,
    ) {
        for child in internal.child_elements() {
            match child.local_name() {
                "Group" => {
                    let depth = self.hierarchy.len();
                    if let Some(heading) = child.child("GroupHeading").map(heading_text)
                        && !heading.is_empty()
                    {
                        self.hierarchy.push(heading);
                    }
                    self.walk_document_internal(child, section_type, schedule_id, bilingual);
                    self.hierarchy.truncate(depth);
                }
                "Provision" => {
                    self.emit_section(child, section_type, Some((schedule_id, bilingual)), None)
                }
                _ => {}
            }
        }
    }

    /// Build and record one section from a provision-bearing element.
    fn emit_section(
        &mut self,
        element: &XmlElement,
        section_type: SectionType,
        schedule: Option<(&str, bool)>,
        label_override: Option<String>,
    ) {
        let label = label_override
            .or_else(|| element.child("Label").map(extract_text))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| (self.order + 1).to_string());

        let (content, content_html) = section_content(element);
        let status = section_status(element);
        let (references, internal_references) = extract_references(
            element,
            self.language,
            self.act_id.as_deref(),
            self.regulation_id.as_deref(),
            &label,
        );
        self.cross_references.extend(references);

        let intro = leading_text(element);
        self.defined_terms.extend(extract_defined_terms(
            element,
            &intro,
            self.language,
            self.act_id.as_deref(),
            self.regulation_id.as_deref(),
            &label,
        ));

        let in_force_start_date = element
            .lims_attr("inforce-start-date")
            .map(str::to_string);
        if in_force_start_date.is_some()
            && matches!(element.attr("type"), Some("CIF"))
        {
            // Both signals are stored; neither overrides the other.
            warn!(
                section = %label,
                "section carries both lims in-force date and CIF type"
            );
        }

        let section = Section {
            act_id: self.act_id.clone(),
            regulation_id: self.regulation_id.clone(),
            language: self.language,
            section_label: label,
            section_order: self.order,
            section_type,
            hierarchy_path: self.hierarchy.clone(),
            marginal_note: element
                .child("MarginalNote")
                .map(extract_text)
                .filter(|n| !n.is_empty()),
            content,
            content_html: if content_html.is_empty() {
                None
            } else {
                Some(content_html)
            },
            status,
            xml_type: element.attr("type").map(str::to_string),
            xml_target: element.attr("target").map(str::to_string),
            change_type: element.lims_attr("change-type").map(str::to_string),
            in_force_start_date,
            last_amended_date: element
                .lims_attr("lastAmendedDate")
                .or_else(|| element.lims_attr("last-amended-date"))
                .map(str::to_string),
            historical_notes: collect_historical_notes(element),
            footnotes: collect_footnotes(element),
            schedule_id: schedule.map(|(id, _)| id.to_string()),
            schedule_bilingual: schedule.map(|(_, b)| b),
            content_flags: content_flags(element),
            formatting_attributes: formatting_attributes(element),
            provision_heading: provision_heading(element),
            internal_references,
        };

        self.order += 1;
        self.sections.push(section);
    }
}

/// `Label` and `TitleText` of a heading joined, falling back to full text.
fn heading_text(heading: &XmlElement) -> String {
    let label = heading.child("Label").map(extract_text).unwrap_or_default();
    let title = heading
        .child("TitleText")
        .map(extract_text)
        .unwrap_or_default();
    match (label.is_empty(), title.is_empty()) {
        (false, false) => format!("{label} — {title}"),
        (false, true) => label,
        (true, false) => title,
        (true, true) => extract_text(heading),
    }
}

/// Plain text and HTML of a section, excluding children captured elsewhere.
fn section_content(element: &XmlElement) -> (String, String) {
    let mut text_parts: Vec<String> = Vec::new();
    let mut html = String::new();
    for node in &element.children {
        if let XmlNode::Element(child) = node
            && NON_CONTENT_CHILDREN.contains(&child.local_name())
        {
            continue;
        }
        let piece = node_text(node);
        if !piece.is_empty() {
            text_parts.push(piece);
        }
        match node {
            XmlNode::Text(t) => html.push_str(&html::escape_html(t)),
            XmlNode::Element(child) => html.push_str(&html::render_element(child)),
        }
    }
    (
        normalize_whitespace(&text_parts.join(" ")),
        html.trim().to_string(),
    )
}

/// Leading text of the section before any `Definition` wrapper — the lead-in
/// sentence that fixes definition scope.
fn leading_text(element: &XmlElement) -> String {
    for child in element.child_elements() {
        if child.is("Definition") {
            break;
        }
        if child.is("Text") {
            return extract_text(child);
        }
    }
    String::new()
}

/// Repealed iff the section's top-level content is solely a `Repealed` marker:
/// either a direct `Repealed` child, or children that are only `Label` and a
/// `Text` whose sole non-whitespace child is `Repealed`. Any other sibling
/// keeps the section active even when a nested element is repealed.
pub fn section_status(element: &XmlElement) -> DocumentStatus {
    if element.children_named("Repealed").next().is_some() {
        return DocumentStatus::Repealed;
    }

    let kids = element.significant_children();
    let mut saw_repealed_text = false;
    for node in &kids {
        match node {
            XmlNode::Element(e) if e.is("Label") => {}
            XmlNode::Element(e) if e.is("Text") => {
                let inner = e.significant_children();
                let sole_repealed = matches!(
                    inner.as_slice(),
                    [XmlNode::Element(only)] if only.is("Repealed")
                );
                if !sole_repealed {
                    return DocumentStatus::InForce;
                }
                saw_repealed_text = true;
            }
            _ => return DocumentStatus::InForce,
        }
    }

    if saw_repealed_text {
        DocumentStatus::Repealed
    } else {
        DocumentStatus::InForce
    }
}

fn content_flags(element: &XmlElement) -> ContentFlags {
    let mut flags = ContentFlags::default();
    for e in element.descendants() {
        match e.local_name() {
            "TableGroup" | "table" => flags.set(ContentFlags::HAS_TABLE),
            "List" => flags.set(ContentFlags::HAS_LIST),
            "ImageGroup" | "Image" => flags.set(ContentFlags::HAS_IMAGE),
            "Formula" | "FormulaGroup" | "FormulaParagraph" => {
                flags.set(ContentFlags::HAS_FORMULA)
            }
            "Footnote" => flags.set(ContentFlags::HAS_FOOTNOTES),
            "Definition" => flags.set(ContentFlags::HAS_DEFINITIONS),
            "BilingualGroup" => flags.set(ContentFlags::HAS_BILINGUAL),
            "MathML" | "math" => flags.set(ContentFlags::HAS_MATH),
            "Oath" => flags.set(ContentFlags::HAS_OATH),
            _ => {}
        }
    }
    flags
}

fn formatting_attributes(element: &XmlElement) -> Option<serde_json::Value> {
    let skip = ["type", "target"];
    let attrs: serde_json::Map<String, serde_json::Value> = element
        .attributes
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    if attrs.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(attrs))
    }
}

fn provision_heading(element: &XmlElement) -> Option<ProvisionHeading> {
    let heading = element.child("ProvisionHeading")?;
    let text = extract_text(heading);
    if text.is_empty() {
        return None;
    }
    let lims: serde_json::Map<String, serde_json::Value> = heading
        .lims_attributes
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    Some(ProvisionHeading {
        text,
        format_ref: heading.attr("format-ref").map(str::to_string),
        lims_metadata: if lims.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(lims))
        },
    })
}

/// A schedule is amending when its heading or any descendant `Section`
/// carries `@type` of `amending`/`CIF`, or its id is `NifProvs`.
pub fn schedule_is_amending(schedule: &XmlElement) -> bool {
    if schedule.attr("id") == Some("NifProvs") {
        return true;
    }
    let heading_type = schedule
        .child("ScheduleFormHeading")
        .or_else(|| schedule.child("Heading"))
        .and_then(|h| h.attr("type"));
    if matches!(heading_type, Some("amending") | Some("CIF")) {
        return true;
    }
    if matches!(schedule.attr("type"), Some("amending") | Some("CIF")) {
        return true;
    }
    schedule.descendants().iter().any(|e| {
        e.is("Section") && matches!(e.attr("type"), Some("amending") | Some("CIF"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xml_str;

    fn walk(xml: &str) -> BodyWalker {
        let body = parse_xml_str(xml).unwrap();
        let mut walker = BodyWalker::new(Language::En, Some("C-46".into()), None);
        walker.walk_body(&body);
        walker
    }

    #[test]
    fn sections_in_order_with_owner() {
        let walker = walk(
            "<Body>\
             <Section><Label>1</Label><Text>First.</Text></Section>\
             <Section><Label>2</Label><Text>Second.</Text></Section>\
             </Body>",
        );
        assert_eq!(walker.sections.len(), 2);
        assert_eq!(walker.sections[0].section_order, 0);
        assert_eq!(walker.sections[1].section_order, 1);
        assert!(walker.sections[0].section_order < walker.sections[1].section_order);
        assert_eq!(walker.sections[0].act_id.as_deref(), Some("C-46"));
        assert!(walker.sections[0].regulation_id.is_none());
        assert_eq!(walker.sections[0].section_label, "1");
        assert_eq!(walker.sections[0].content, "First.");
    }

    #[test]
    fn repealed_marker_only() {
        let walker = walk(
            "<Body><Section><Label>1</Label><Text><Repealed>[Repealed, 2019, c. 25, s. 1]</Repealed></Text></Section></Body>",
        );
        assert_eq!(walker.sections.len(), 1);
        assert_eq!(walker.sections[0].status, DocumentStatus::Repealed);
        assert!(walker.sections[0].content.contains("[Repealed"));
    }

    #[test]
    fn nested_repealed_does_not_propagate() {
        let walker = walk(
            "<Body><Section><Label>2</Label>\
             <Subsection><Label>(1)</Label><Text>Still active.</Text></Subsection>\
             <Subsection><Label>(2)</Label><Text><Repealed>[Repealed]</Repealed></Text></Subsection>\
             </Section></Body>",
        );
        assert_eq!(walker.sections[0].status, DocumentStatus::InForce);
    }

    #[test]
    fn sibling_beside_repealed_text_keeps_section_active() {
        let el = parse_xml_str(
            "<Section><Label>1</Label>\
             <Text><Repealed>[Repealed]</Repealed></Text>\
             <DefinedTermEn>thing</DefinedTermEn></Section>",
        )
        .unwrap();
        assert_eq!(section_status(&el), DocumentStatus::InForce);
    }

    #[test]
    fn whitespace_ignored_in_sole_child_test() {
        let el = parse_xml_str(
            "<Section>\n  <Label>1</Label>\n  <Text>\n    <Repealed>[Repealed]</Repealed>\n  </Text>\n</Section>",
        )
        .unwrap();
        assert_eq!(section_status(&el), DocumentStatus::Repealed);
    }

    #[test]
    fn hierarchy_path_from_nested_parts() {
        let walker = walk(
            "<Body><Part>\
             <Heading><Label>Part I</Label><TitleText>Offences</TitleText></Heading>\
             <Division><Heading><Label>Division 1</Label></Heading>\
             <Section><Label>3</Label><Text>Content.</Text></Section>\
             </Division></Part></Body>",
        );
        assert_eq!(
            walker.sections[0].hierarchy_path,
            vec!["Part I — Offences".to_string(), "Division 1".to_string()]
        );
    }

    #[test]
    fn flat_headings_rewrite_stack_by_level() {
        let walker = walk(
            "<Body>\
             <Heading level=\"1\"><Label>Part 1</Label></Heading>\
             <Heading level=\"2\"><Label>Interpretation</Label></Heading>\
             <Section><Label>1</Label><Text>A.</Text></Section>\
             <Heading level=\"2\"><Label>Application</Label></Heading>\
             <Section><Label>2</Label><Text>B.</Text></Section>\
             <Heading level=\"1\"><Label>Part 2</Label></Heading>\
             <Section><Label>3</Label><Text>C.</Text></Section>\
             </Body>",
        );
        assert_eq!(
            walker.sections[0].hierarchy_path,
            vec!["Part 1".to_string(), "Interpretation".to_string()]
        );
        assert_eq!(
            walker.sections[1].hierarchy_path,
            vec!["Part 1".to_string(), "Application".to_string()]
        );
        assert_eq!(walker.sections[2].hierarchy_path, vec!["Part 2".to_string()]);
    }

    #[test]
    fn marginal_note_captured_not_in_content() {
        let walker = walk(
            "<Body><Section><MarginalNote>Definitions</MarginalNote><Label>2</Label><Text>In this Act,</Text></Section></Body>",
        );
        assert_eq!(
            walker.sections[0].marginal_note.as_deref(),
            Some("Definitions")
        );
        assert_eq!(walker.sections[0].content, "In this Act,");
    }

    #[test]
    fn defined_terms_and_references_accumulate() {
        let walker = walk(
            r#"<Body><Section><Label>2</Label><Text>In this Act,</Text>
            <Definition><Text><DefinedTermEn>Minister</DefinedTermEn> means the Minister; (<DefinedTermFr>ministre</DefinedTermFr>)</Text></Definition>
            <Subsection><Label>(2)</Label><Text>See the <XRefExternal reference-type="act" link="A-1">Access Act</XRefExternal>.</Text></Subsection>
            </Section></Body>"#,
        );
        assert_eq!(walker.defined_terms.len(), 1);
        assert_eq!(walker.defined_terms[0].term, "Minister");
        assert_eq!(walker.cross_references.len(), 1);
        assert_eq!(walker.cross_references[0].target_ref, "A-1");
    }

    #[test]
    fn schedule_amending_by_nif_id() {
        let body = parse_xml_str(
            "<Body><Schedule id=\"NifProvs\"><Section><Label>1</Label><Text>Not in force text.</Text></Section></Schedule></Body>",
        )
        .unwrap();
        let mut walker = BodyWalker::new(Language::En, Some("C-46".into()), None);
        walker.walk_body(&body);
        assert_eq!(walker.sections[0].section_type, SectionType::Amending);
        assert_eq!(walker.sections[0].schedule_id.as_deref(), Some("NifProvs"));
    }

    #[test]
    fn schedule_amending_by_section_type() {
        let body = parse_xml_str(
            "<Body><Schedule id=\"Sch1\"><Section type=\"CIF\"><Label>1</Label><Text>Coming into force.</Text></Section></Schedule></Body>",
        )
        .unwrap();
        let mut walker = BodyWalker::new(Language::En, Some("C-46".into()), None);
        walker.walk_body(&body);
        assert_eq!(walker.sections[0].section_type, SectionType::Amending);
    }

    #[test]
    fn plain_schedule_keeps_schedule_type() {
        let body = parse_xml_str(
            "<Body><Schedule id=\"Sch2\"><Section><Label>1</Label><Text>List of substances.</Text></Section></Schedule></Body>",
        )
        .unwrap();
        let mut walker = BodyWalker::new(Language::En, None, Some("SOR-2007-151".into()));
        walker.walk_body(&body);
        assert_eq!(walker.sections[0].section_type, SectionType::Schedule);
        assert_eq!(walker.sections[0].regulation_id.as_deref(), Some("SOR-2007-151"));
    }

    #[test]
    fn document_internal_one_section_per_provision() {
        let body = parse_xml_str(
            "<Body><Schedule id=\"Sch3\"><DocumentInternal>\
             <Group><GroupHeading><TitleText>Agreements</TitleText></GroupHeading>\
             <Provision><Label>1</Label><ProvisionHeading format-ref=\"centre\" lims:fid=\"99\">Treaty Heading</ProvisionHeading><Text>Provision one text.</Text></Provision>\
             <Provision><Label>2</Label><Text>Provision two text.</Text></Provision>\
             </Group></DocumentInternal></Schedule></Body>",
        )
        .unwrap();
        let mut walker = BodyWalker::new(Language::En, Some("C-46".into()), None);
        walker.walk_body(&body);
        assert_eq!(walker.sections.len(), 2);
        assert!(
            walker.sections[0]
                .hierarchy_path
                .iter()
                .any(|h| h.contains("Agreements"))
        );
        let heading = walker.sections[0].provision_heading.as_ref().unwrap();
        assert_eq!(heading.text, "Treaty Heading");
        assert_eq!(heading.format_ref.as_deref(), Some("centre"));
        assert_eq!(
            heading.lims_metadata.as_ref().unwrap()["fid"],
            serde_json::json!("99")
        );
    }

    #[test]
    fn schedule_bilingual_marker() {
        let body = parse_xml_str(
            "<Body><Schedule id=\"Sch4\"><TableGroup bilingual=\"yes\"><table><tgroup cols=\"1\"><tbody><row><entry>x</entry></row></tbody></tgroup></table></TableGroup></Schedule></Body>",
        )
        .unwrap();
        let mut walker = BodyWalker::new(Language::En, Some("C-46".into()), None);
        walker.walk_body(&body);
        assert_eq!(walker.sections.len(), 1);
        assert_eq!(walker.sections[0].schedule_bilingual, Some(true));
        assert!(
            walker.sections[0]
                .content_flags
                .contains(ContentFlags::HAS_TABLE)
        );
    }

    #[test]
    fn content_flags_detect_structures() {
        let walker = walk(
            "<Body><Section><Label>1</Label>\
             <List><Item>x</Item></List>\
             <Formula><FormulaText>A + B</FormulaText></Formula>\
             </Section></Body>",
        );
        let flags = walker.sections[0].content_flags;
        assert!(flags.contains(ContentFlags::HAS_LIST));
        assert!(flags.contains(ContentFlags::HAS_FORMULA));
        assert!(!flags.contains(ContentFlags::HAS_TABLE));
    }

    #[test]
    fn lims_dates_on_section() {
        let walker = walk(
            "<Body><Section lims:inforce-start-date=\"2019-09-19\" lims:lastAmendedDate=\"2023-06-22\"><Label>1</Label><Text>x</Text></Section></Body>",
        );
        assert_eq!(
            walker.sections[0].in_force_start_date.as_deref(),
            Some("2019-09-19")
        );
        assert_eq!(
            walker.sections[0].last_amended_date.as_deref(),
            Some("2023-06-22")
        );
    }

    #[test]
    fn content_html_rendered() {
        let walker = walk(
            "<Body><Section><Label>1</Label><Text>See <Emphasis style=\"bold\">this</Emphasis>.</Text></Section></Body>",
        );
        assert_eq!(
            walker.sections[0].content_html.as_deref(),
            Some("<p>See <strong>this</strong>.</p>")
        );
    }
}
