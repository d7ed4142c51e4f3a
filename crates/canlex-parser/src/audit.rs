//! Schema audit tools: element/attribute inventory and coverage gaps.
//!
//! `audit-xml-schema` inventories every element and attribute tuple seen in a
//! corpus sample; `check-schema-coverage` diffs the names this parser handles
//! against the published schema element list and an observed inventory.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::dom::{self, XmlElement};
use crate::error::ParseError;

/// Element names this parser recognizes and maps to structure or rendering.
pub const HANDLED_ELEMENTS: &[&str] = &[
    // Document roots and identification
    "Statute", "Regulation", "Identification", "Chapter", "ConsolidatedNumber", "ShortTitle",
    "LongTitle", "InstrumentNumber", "AnnualStatuteId", "StatuteYear", "EnablingAuthority",
    "BillHistory", "RegulationMakerOrder", "RegistrationDate", "ConsolidationDate",
    "RunningHead", "ReaderNote", "Note", "Date", "YYYY", "MM", "DD",
    // Body containers
    "Body", "Introduction", "Preamble", "Enacts", "Schedules", "Schedule", "Part", "Division",
    "Subdivision", "Group", "GroupHeading", "DocumentInternal",
    // Provision structure
    "Section", "Subsection", "Paragraph", "Subparagraph", "Clause", "Subclause", "Provision",
    "Definition", "Item", "List", "ContinuedDefinition", "ContinuedSectionSubsection",
    "ContinuedParagraph", "ContinuedSubparagraph", "ContinuedClause", "ContinuedSubclause",
    "ContinuedFormulaParagraph", "ProvisionHeading", "ReadAsText", "AmendedText",
    // Inline content
    "Text", "Label", "MarginalNote", "Heading", "TitleText", "Emphasis", "Sup", "Sub",
    "LineBreak", "PageBreak", "FormBlank", "Leader", "LeaderRightJustified", "Separator",
    "Language", "CenteredText", "DefinitionRef", "Repealed", "Oath", "FormGroup",
    "FormulaConnector", "FormHeading", "ScheduleFormHeading",
    // References
    "XRefExternal", "XRefInternal", "DefinedTermEn", "DefinedTermFr", "FootnoteRef", "Footnote",
    "Citation", "Source",
    // Change tracking
    "Ins", "Del",
    // Bilingual
    "BilingualGroup", "BilingualItemEn", "BilingualItemFr",
    // Tables (CALS)
    "TableGroup", "table", "tgroup", "thead", "tbody", "row", "entry", "colspec",
    // Formulas
    "Formula", "FormulaGroup", "FormulaText", "FormulaTerm", "FormulaDefinition",
    "FormulaParagraph", "Numerator", "Denominator", "Fraction",
    // Images
    "ImageGroup", "Image", "Caption",
    // History and amendments
    "HistoricalNote", "HistoricalNoteSubItem", "RecentAmendments", "Amendment",
    "AmendmentCitation", "AmendmentDate", "RelatedProvisions", "RelatedProvision",
    "BillInternal", "SignatureBlock", "TableOfProvisions",
    // Math
    "MathML", "math", "MSup", "MSub",
];

/// Inventory of element names and `(element, attribute)` tuples with counts.
#[derive(Debug, Default, Serialize)]
pub struct SchemaInventory {
    pub elements: BTreeMap<String, usize>,
    pub attributes: BTreeMap<String, usize>,
    pub files_scanned: usize,
}

impl SchemaInventory {
    /// Merge one XML file into the inventory.
    pub fn scan_file(&mut self, path: &Path) -> Result<(), ParseError> {
        let root = dom::parse_xml_file(path)?;
        self.scan_element(&root);
        self.files_scanned += 1;
        Ok(())
    }

    /// Merge an in-memory document into the inventory.
    pub fn scan_str(&mut self, xml: &str) -> Result<(), ParseError> {
        let root = dom::parse_xml_str(xml)?;
        self.scan_element(&root);
        self.files_scanned += 1;
        Ok(())
    }

    fn scan_element(&mut self, element: &XmlElement) {
        *self
            .elements
            .entry(element.local_name().to_string())
            .or_default() += 1;
        for (key, _) in &element.attributes {
            *self
                .attributes
                .entry(format!("{}@{}", element.local_name(), key))
                .or_default() += 1;
        }
        for (key, _) in &element.lims_attributes {
            *self
                .attributes
                .entry(format!("{}@lims:{}", element.local_name(), key))
                .or_default() += 1;
        }
        for child in element.child_elements() {
            self.scan_element(child);
        }
    }

    /// Element names seen in the corpus that the parser does not handle.
    pub fn unhandled_elements(&self) -> Vec<&str> {
        self.elements
            .keys()
            .map(String::as_str)
            .filter(|name| !HANDLED_ELEMENTS.contains(name))
            .collect()
    }
}

/// Coverage report: handled vs schema vs observed.
#[derive(Debug, Serialize)]
pub struct CoverageReport {
    /// In the schema list but not handled by the parser.
    pub missing: Vec<String>,
    /// Handled by the parser but absent from the schema list.
    pub extra: Vec<String>,
}

/// Diff the handled element list against a schema element list (extracted
/// from the published XSLT/DTD).
pub fn check_coverage(schema_elements: &[&str]) -> CoverageReport {
    let missing = schema_elements
        .iter()
        .filter(|e| !HANDLED_ELEMENTS.contains(*e))
        .map(|e| e.to_string())
        .collect();
    let extra = HANDLED_ELEMENTS
        .iter()
        .filter(|e| !schema_elements.contains(*e))
        .map(|e| e.to_string())
        .collect();
    CoverageReport { missing, extra }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_counts_elements_and_attributes() {
        let mut inventory = SchemaInventory::default();
        inventory
            .scan_str(
                r#"<Statute><Body>
                    <Section type="amending" lims:fid="1"><Label>1</Label><Text>a</Text></Section>
                    <Section><Label>2</Label><Text>b</Text></Section>
                </Body></Statute>"#,
            )
            .unwrap();
        assert_eq!(inventory.elements["Section"], 2);
        assert_eq!(inventory.elements["Text"], 2);
        assert_eq!(inventory.attributes["Section@type"], 1);
        assert_eq!(inventory.attributes["Section@lims:fid"], 1);
        assert_eq!(inventory.files_scanned, 1);
    }

    #[test]
    fn unhandled_elements_reported() {
        let mut inventory = SchemaInventory::default();
        inventory
            .scan_str("<Statute><Mystery/><Body/></Statute>")
            .unwrap();
        assert_eq!(inventory.unhandled_elements(), vec!["Mystery"]);
    }

    #[test]
    fn coverage_diff_both_directions() {
        let report = check_coverage(&["Statute", "Body", "BrandNewElement"]);
        assert_eq!(report.missing, vec!["BrandNewElement".to_string()]);
        assert!(report.extra.contains(&"TableGroup".to_string()));
    }

    #[test]
    fn handled_list_covers_core_taxonomy() {
        for name in ["Definition", "XRefExternal", "TableGroup", "BilingualGroup", "Repealed"] {
            assert!(HANDLED_ELEMENTS.contains(&name), "{name} missing");
        }
    }
}
