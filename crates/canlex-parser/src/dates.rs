//! `Date(YYYY,MM,DD)` element parsing.

use crate::dom::XmlElement;

/// Parse a `<Date><YYYY/><MM/><DD/></Date>` element into an ISO `YYYY-MM-DD`
/// string. Returns `None` when any component is absent or non-numeric.
pub fn parse_date_element(date: &XmlElement) -> Option<String> {
    let year: u16 = component(date, "YYYY")?;
    let month: u8 = component(date, "MM")?;
    let day: u8 = component(date, "DD")?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

/// Find the first `Date` descendant of `element` and parse it.
pub fn find_date(element: &XmlElement) -> Option<String> {
    if element.is("Date") {
        return parse_date_element(element);
    }
    element.find_descendant("Date").and_then(parse_date_element)
}

fn component<T: std::str::FromStr>(date: &XmlElement, name: &str) -> Option<T> {
    date.child(name)?.raw_text().trim().parse().ok()
}
