//! CALS table model → HTML.
//!
//! The legislation corpus uses the SGML-era CALS model
//! (`TableGroup/table/tgroup/thead/tbody/row/entry`). Frame and rule
//! attributes are preserved as `data-*` so the renderer keeps fidelity
//! without hardcoding print styling.

use crate::dom::XmlElement;
use crate::html::{escape_html, render_children};

/// Render a `TableGroup`, carrying its `bilingual` marker onto the table.
pub fn render_table_group(group: &XmlElement) -> String {
    let bilingual = group.attr("bilingual");
    group
        .children_named("table")
        .map(|table| render_table(table, bilingual))
        .collect()
}

/// Render one CALS `table` element.
pub fn render_table(table: &XmlElement, bilingual: Option<&str>) -> String {
    let mut out = String::from("<table class=\"cals-table\"");
    for (attr, data) in [
        ("frame", "data-frame"),
        ("colsep", "data-colsep"),
        ("rowsep", "data-rowsep"),
    ] {
        if let Some(v) = table.attr(attr) {
            out.push_str(&format!(" {data}=\"{}\"", escape_html(v)));
        }
    }
    if let Some(b) = bilingual {
        out.push_str(&format!(" data-bilingual=\"{}\"", escape_html(b)));
    }
    out.push('>');

    for tgroup in table.children_named("tgroup") {
        if let Some(thead) = tgroup.child("thead") {
            out.push_str("<thead");
            if let Some(valign) = thead.attr("valign") {
                out.push_str(&format!(" data-valign=\"{}\"", escape_html(valign)));
            }
            out.push('>');
            for row in thead.children_named("row") {
                out.push_str(&render_row(row, true));
            }
            out.push_str("</thead>");
        }
        if let Some(tbody) = tgroup.child("tbody") {
            out.push_str("<tbody>");
            for row in tbody.children_named("row") {
                out.push_str(&render_row(row, false));
            }
            out.push_str("</tbody>");
        }
    }

    out.push_str("</table>");
    out
}

fn render_row(row: &XmlElement, header: bool) -> String {
    let tag = if header { "th" } else { "td" };
    let mut out = String::from("<tr>");
    for entry in row.children_named("entry") {
        out.push_str(&format!("<{tag}"));
        if let Some(align) = entry.attr("align") {
            out.push_str(&format!(" style=\"text-align:{}\"", escape_html(align)));
        }
        // CALS morerows counts additional rows; HTML rowspan counts total.
        if let Some(morerows) = entry.attr("morerows").and_then(|m| m.parse::<u32>().ok()) {
            out.push_str(&format!(" rowspan=\"{}\"", morerows + 1));
        }
        for (attr, data) in [("colsep", "data-colsep"), ("rowsep", "data-rowsep")] {
            if let Some(v) = entry.attr(attr) {
                out.push_str(&format!(" {data}=\"{}\"", escape_html(v)));
            }
        }
        out.push('>');
        out.push_str(&render_children(entry));
        out.push_str(&format!("</{tag}>"));
    }
    out.push_str("</tr>");
    out
}
