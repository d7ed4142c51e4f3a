//! Inline HTML rendering for section content.
//!
//! Unrecognized elements never fail a render: their children pass through as
//! text, matching how the upstream XSLT degrades. Structural wrappers become
//! classed `<div>`s so downstream styling can target provision shapes.

use crate::dom::{XmlElement, XmlNode};
use crate::tables;
use canlex_core::types::ReferenceTargetType;

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize an `Image[@source]` value: relative names are served from
/// `/legislation/images/`, absolute paths and URLs pass through.
pub fn image_src(source: &str) -> String {
    if source.starts_with('/') || source.contains("://") {
        source.to_string()
    } else {
        format!("/legislation/images/{source}")
    }
}

/// Render all children of an element.
pub fn render_children(element: &XmlElement) -> String {
    let mut out = String::new();
    for node in &element.children {
        match node {
            XmlNode::Text(t) => out.push_str(&escape_html(t)),
            XmlNode::Element(e) => out.push_str(&render_element(e)),
        }
    }
    out
}

/// Render one element to HTML.
pub fn render_element(element: &XmlElement) -> String {
    match element.local_name() {
        "Text" => format!("<p>{}</p>", render_children(element)),
        "Label" => format!(
            "<span class=\"label\">{}</span>",
            render_children(element)
        ),
        "MarginalNote" => format!(
            "<span class=\"marginal-note\">{}</span>",
            render_children(element)
        ),
        "Emphasis" => render_emphasis(element),
        "Sup" | "MSup" => format!("<sup>{}</sup>", render_children(element)),
        "Sub" | "MSub" => format!("<sub>{}</sub>", render_children(element)),
        "LineBreak" => "<br/>".to_string(),
        // Pagination is print-only.
        "PageBreak" => String::new(),
        "FormBlank" => "<span class=\"form-blank\">____________</span>".to_string(),
        "Leader" | "LeaderRightJustified" => "<span class=\"leader\"></span>".to_string(),
        "Separator" => "<hr/>".to_string(),
        "CenteredText" => format!(
            "<div class=\"centered-text\">{}</div>",
            render_children(element)
        ),
        "Language" => render_language_span(element),
        "List" => render_list(element),
        "Item" => format!("<li>{}</li>", render_children(element)),
        "TableGroup" => tables::render_table_group(element),
        "table" => tables::render_table(element, None),
        "BilingualGroup" => render_bilingual_group(element),
        "ImageGroup" => render_image_group(element),
        "Image" => render_image(element),
        "XRefExternal" => render_xref_external(element),
        "XRefInternal" => render_xref_internal(element),
        "DefinedTermEn" | "DefinedTermFr" => {
            format!("<dfn>{}</dfn>", render_children(element))
        }
        "DefinitionRef" => format!(
            "<span class=\"definition-ref\">{}</span>",
            render_children(element)
        ),
        "Repealed" => format!(
            "<span class=\"repealed\">{}</span>",
            render_children(element)
        ),
        "FootnoteRef" => format!(
            "<sup class=\"footnote-ref\">{}</sup>",
            render_children(element)
        ),
        // Footnote bodies are collected separately, not rendered inline.
        "Footnote" => String::new(),
        "HistoricalNote" => String::new(),
        "Oath" => format!("<div class=\"oath\">{}</div>", render_children(element)),
        "Formula" | "FormulaGroup" => format!(
            "<div class=\"formula\">{}</div>",
            render_children(element)
        ),
        "FormulaText" | "FormulaTerm" | "FormulaConnector" => format!(
            "<span class=\"formula-text\">{}</span>",
            render_children(element)
        ),
        "FormulaDefinition" => format!(
            "<div class=\"formula-definition\">{}</div>",
            render_children(element)
        ),
        "Fraction" => format!(
            "<span class=\"fraction\">{}</span>",
            render_children(element)
        ),
        "Numerator" => format!(
            "<span class=\"numerator\">{}</span>",
            render_children(element)
        ),
        "Denominator" => format!(
            "<span class=\"denominator\">/{}</span>",
            render_children(element)
        ),
        // Change-tracking markers pass content through unmarked.
        "Ins" | "Del" => render_children(element),
        "Subsection" | "Paragraph" | "Subparagraph" | "Clause" | "Subclause" | "Provision"
        | "Definition" | "ContinuedDefinition" | "ContinuedSectionSubsection"
        | "ContinuedParagraph" | "ContinuedSubparagraph" | "ContinuedClause"
        | "ContinuedSubclause" | "ContinuedFormulaParagraph" | "FormulaParagraph" | "FormGroup"
        | "FormHeading" | "ScheduleFormHeading" | "ReadAsText" | "AmendedText" => {
            format!(
                "<div class=\"{}\">{}</div>",
                kebab(element.local_name()),
                render_children(element)
            )
        }
        // Anything else passes its content through as text.
        _ => render_children(element),
    }
}

fn kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Ordered-list styles that map onto HTML `<ol type>`.
fn ol_type(style: &str) -> Option<&'static str> {
    match style {
        "arabic" | "decimal" => Some("1"),
        "lower-roman" => Some("i"),
        "upper-roman" => Some("I"),
        "lower-alpha" => Some("a"),
        "upper-alpha" => Some("A"),
        _ => None,
    }
}

fn render_list(element: &XmlElement) -> String {
    let body: String = element
        .children_named("Item")
        .map(|item| format!("<li>{}</li>", render_children(item)))
        .collect();
    match element.attr("style").and_then(ol_type) {
        Some(t) => format!("<ol type=\"{t}\">{body}</ol>"),
        None => format!("<ul>{body}</ul>"),
    }
}

fn render_emphasis(element: &XmlElement) -> String {
    let body = render_children(element);
    match element.attr("style") {
        Some("bold") => format!("<strong>{body}</strong>"),
        _ => format!("<em>{body}</em>"),
    }
}

fn render_language_span(element: &XmlElement) -> String {
    match element.attr("xml:lang") {
        Some(lang) => format!(
            "<span lang=\"{}\">{}</span>",
            escape_html(lang),
            render_children(element)
        ),
        None => render_children(element),
    }
}

fn render_bilingual_group(element: &XmlElement) -> String {
    let mut out = String::from("<div class=\"bilingual-group\">");
    for child in element.child_elements() {
        match child.local_name() {
            "BilingualItemEn" => out.push_str(&format!(
                "<span lang=\"en\" class=\"bilingual-en\">{}</span>",
                render_children(child)
            )),
            "BilingualItemFr" => out.push_str(&format!(
                "<span lang=\"fr\" class=\"bilingual-fr\">{}</span>",
                render_children(child)
            )),
            _ => out.push_str(&render_element(child)),
        }
    }
    out.push_str("</div>");
    out
}

fn render_image_group(element: &XmlElement) -> String {
    let mut out = String::from("<figure class=\"image-group\"");
    if let Some(position) = element.attr("position") {
        out.push_str(&format!(" data-position=\"{}\"", escape_html(position)));
    }
    out.push('>');
    for child in element.child_elements() {
        match child.local_name() {
            "Image" => out.push_str(&render_image(child)),
            "Caption" => out.push_str(&format!(
                "<figcaption>{}</figcaption>",
                render_children(child)
            )),
            _ => out.push_str(&render_element(child)),
        }
    }
    out.push_str("</figure>");
    out
}

fn render_image(element: &XmlElement) -> String {
    match element.attr("source") {
        Some(source) => format!(
            "<img class=\"legislation-image\" loading=\"lazy\" src=\"{}\">",
            escape_html(&image_src(source))
        ),
        None => String::new(),
    }
}

fn render_xref_external(element: &XmlElement) -> String {
    let text = render_children(element);
    let target = element
        .attr("reference-type")
        .and_then(ReferenceTargetType::from_reference_type);
    match (target, element.attr("link")) {
        (Some(ReferenceTargetType::Act), Some(link)) => format!(
            "<a class=\"xref\" href=\"/legislation/act/{}\">{}</a>",
            escape_html(link),
            text
        ),
        (Some(ReferenceTargetType::Regulation), Some(link)) => format!(
            "<a class=\"xref\" href=\"/legislation/regulation/{}\">{}</a>",
            escape_html(link),
            text
        ),
        // Recognized but non-linkable target kinds, unknown kinds, and
        // missing links all render as plain text.
        _ => text,
    }
}

fn render_xref_internal(element: &XmlElement) -> String {
    let text = render_children(element);
    let label = element.raw_text();
    let mut out = format!(
        "<span class=\"xref-internal\" data-target-label=\"{}\"",
        escape_html(label.trim())
    );
    if let Some(idref) = element.attr("idref") {
        out.push_str(&format!(" data-target-id=\"{}\"", escape_html(idref)));
    }
    out.push('>');
    out.push_str(&text);
    out.push_str("</span>");
    out
}
