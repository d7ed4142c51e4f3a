//! Plain-text extraction with whitespace normalization.

use crate::dom::{XmlElement, XmlNode};

/// Collapse all runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Recursively extract the visible text of a subtree.
///
/// A space is inserted between adjacent element children so block siblings
/// (`Label` + `Text`, consecutive subsections) don't run together; text runs
/// keep their own spacing. The result is whitespace-normalized.
pub fn extract_text(element: &XmlElement) -> String {
    let mut out = String::new();
    collect(element, &mut out);
    normalize_whitespace(&out)
}

fn collect(element: &XmlElement, out: &mut String) {
    let mut last_was_element = false;
    for node in &element.children {
        match node {
            XmlNode::Text(t) => {
                out.push_str(t);
                last_was_element = false;
            }
            XmlNode::Element(child) => {
                if last_was_element {
                    out.push(' ');
                }
                collect(child, out);
                last_was_element = true;
            }
        }
    }
}

/// Extract text from a node, element or raw run.
pub fn node_text(node: &XmlNode) -> String {
    match node {
        XmlNode::Text(t) => normalize_whitespace(t),
        XmlNode::Element(e) => extract_text(e),
    }
}
