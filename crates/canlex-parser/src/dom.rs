//! Lightweight immutable DOM over quick-xml events.
//!
//! The legislation schema needs subtree queries the event stream cannot
//! answer directly — paired-term lookup walks the whole `Definition` subtree,
//! repealed detection inspects sibling shape — so files are loaded into an
//! element tree once and walked from there. `lims:*` attributes are split
//! into their own bag so structural code can ignore them while metadata code
//! keeps them.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;

/// Attribute prefix reserved by the LIMS toolchain (`lims:fid`,
/// `lims:inforce-start-date`, ...).
const LIMS_PREFIX: &str = "lims:";

/// A child of an element: nested element or raw text run.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// One XML element with its attributes and ordered children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written in the document.
    pub name: String,
    /// Attributes, `lims:*` and `xmlns*` excluded.
    pub attributes: Vec<(String, String)>,
    /// `lims:*` attributes, prefix stripped.
    pub lims_attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Element name with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// True iff the element's local name equals `name`.
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn lims_attr(&self, name: &str) -> Option<&str> {
        self.lims_attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.is(name))
    }

    /// All child elements with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements().filter(move |e| e.is(name))
    }

    /// Depth-first pre-order walk over this element and every descendant.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        fn walk<'a>(e: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
            out.push(e);
            for child in e.child_elements() {
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// First descendant (excluding self) with the given local name.
    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in self.child_elements() {
            if child.is(name) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn has_descendant(&self, name: &str) -> bool {
        self.find_descendant(name).is_some()
    }

    /// Raw concatenated text of this subtree, no normalization.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        fn walk(e: &XmlElement, out: &mut String) {
            for node in &e.children {
                match node {
                    XmlNode::Text(t) => out.push_str(t),
                    XmlNode::Element(child) => walk(child, out),
                }
            }
        }
        walk(self, &mut out);
        out
    }

    /// Child elements ignoring pure-whitespace text runs — the shape used by
    /// "sole child" tests such as repealed detection.
    pub fn significant_children(&self) -> Vec<&XmlNode> {
        self.children
            .iter()
            .filter(|node| match node {
                XmlNode::Text(t) => !t.trim().is_empty(),
                XmlNode::Element(_) => true,
            })
            .collect()
    }
}

/// Parse a UTF-8 XML string into its root element.
pub fn parse_xml_str(xml: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, XmlNode::Element(element))?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    ParseError::Xml(quick_xml::Error::IllFormed(
                        quick_xml::errors::IllFormedError::UnmatchedEndTag(String::new()),
                    ))
                })?;
                if stack.is_empty() {
                    return Ok(element);
                }
                attach(&mut stack, XmlNode::Element(element))?;
            }
            Event::Text(text) => {
                let decoded = text.decode().map_err(quick_xml::Error::from)?;
                let value = quick_xml::escape::unescape(&decoded)?.into_owned();
                if !stack.is_empty() && !value.is_empty() {
                    attach(&mut stack, XmlNode::Text(value))?;
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                if !stack.is_empty() {
                    attach(&mut stack, XmlNode::Text(value))?;
                }
            }
            Event::Eof => {
                return Err(ParseError::Xml(quick_xml::Error::IllFormed(
                    quick_xml::errors::IllFormedError::MissingEndTag(String::new()),
                )));
            }
            // Declarations, comments, processing instructions, doctype.
            _ => {}
        }
    }
}

/// Read and parse an XML file into its root element.
pub fn parse_xml_file(path: &std::path::Path) -> Result<XmlElement, ParseError> {
    let xml = std::fs::read_to_string(path)?;
    parse_xml_str(&xml)
}

fn attach(stack: &mut [XmlElement], node: XmlNode) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => Err(ParseError::Xml(quick_xml::Error::IllFormed(
            quick_xml::errors::IllFormedError::UnmatchedEndTag(String::new()),
        ))),
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    let mut lims_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if let Some(stripped) = key.strip_prefix(LIMS_PREFIX) {
            lims_attributes.push((stripped.to_string(), value));
        } else if key == "xmlns" || key.starts_with("xmlns:") {
            // Namespace declarations carry no document content.
        } else {
            attributes.push((key, value));
        }
    }

    Ok(XmlElement {
        name,
        attributes,
        lims_attributes,
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements() {
        let root = parse_xml_str("<Statute><Body><Section/></Body></Statute>").unwrap();
        assert_eq!(root.name, "Statute");
        assert!(root.child("Body").is_some());
        assert!(root.child("Body").unwrap().child("Section").is_some());
    }

    #[test]
    fn text_runs_preserved_between_inline_elements() {
        let root =
            parse_xml_str("<Text>The <DefinedTermEn>Minister</DefinedTermEn> may act.</Text>")
                .unwrap();
        assert_eq!(root.raw_text(), "The Minister may act.");
    }

    #[test]
    fn entities_unescaped() {
        let root = parse_xml_str("<Text>Fish &amp; Oceans &lt;Canada&gt;</Text>").unwrap();
        assert_eq!(root.raw_text(), "Fish & Oceans <Canada>");
    }

    #[test]
    fn lims_attributes_partitioned() {
        let root = parse_xml_str(
            r#"<Section lims:id="123" lims:inforce-start-date="2019-06-21" type="amending"/>"#,
        )
        .unwrap();
        assert_eq!(root.attr("type"), Some("amending"));
        assert_eq!(root.attr("lims:id"), None);
        assert_eq!(root.lims_attr("id"), Some("123"));
        assert_eq!(root.lims_attr("inforce-start-date"), Some("2019-06-21"));
    }

    #[test]
    fn xmlns_declarations_dropped() {
        let root = parse_xml_str(
            r#"<Statute xmlns:lims="http://justice.gc.ca/lims" xmlns="http://x"/>"#,
        )
        .unwrap();
        assert!(root.attributes.is_empty());
        assert!(root.lims_attributes.is_empty());
    }

    #[test]
    fn namespaced_element_local_name() {
        let root = parse_xml_str("<m:math><m:msup/></m:math>").unwrap();
        assert_eq!(root.local_name(), "math");
        assert!(root.child("msup").is_some());
    }

    #[test]
    fn significant_children_ignore_whitespace() {
        let root = parse_xml_str("<Section>\n  <Label>1</Label>\n  <Text>x</Text>\n</Section>")
            .unwrap();
        let kids = root.significant_children();
        assert_eq!(kids.len(), 2);
    }

    #[test]
    fn find_descendant_depth_first() {
        let root = parse_xml_str(
            "<Definition><Text>x<DefinedTermFr>ministre</DefinedTermFr></Text></Definition>",
        )
        .unwrap();
        let term = root.find_descendant("DefinedTermFr").unwrap();
        assert_eq!(term.raw_text(), "ministre");
    }

    #[test]
    fn malformed_xml_errors() {
        assert!(parse_xml_str("<Statute><Body></Statute>").is_err());
        assert!(parse_xml_str("<Unclosed>").is_err());
        assert!(parse_xml_str("not xml at all").is_err());
    }
}
