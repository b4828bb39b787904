//! Structural queries over operator portal pages.
//!
//! Operator pages are label/value tables without stable ids, so fields are
//! located by the exact text of their label and read from a structurally
//! adjacent node.

use crate::error::{Result, RetrieveError};
use crate::retriever::shift_by_offset;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;

/// Wall-clock layout used by both operator portals.
pub(crate) const PORTAL_TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

pub(crate) fn selector(source_id: &str, css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| RetrieveError::parse(source_id, format!("invalid selector {css}: {e}")))
}

/// Text of the element's own text nodes, ignoring nested elements.
pub(crate) fn own_text(element: &ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) fn contains(root: ElementRef<'_>, selector: &Selector) -> bool {
    root.select(selector).next().is_some()
}

/// First element matching `selector` whose own text equals `label`.
pub(crate) fn find_labelled<'a>(
    root: ElementRef<'a>,
    selector: &Selector,
    label: &str,
) -> Option<ElementRef<'a>> {
    root.select(selector).find(|el| own_text(el) == label)
}

pub(crate) fn parent_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

pub(crate) fn next_sibling_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Closest ancestor whose `class` attribute is exactly `class`.
pub(crate) fn ancestor_with_class<'a>(element: &ElementRef<'a>, class: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().attr("class") == Some(class))
}

/// Own texts of every element matching `selector`, in document order,
/// skipping elements without text.
pub(crate) fn own_texts(root: ElementRef<'_>, selector: &Selector) -> Vec<String> {
    root.select(selector)
        .map(|el| own_text(&el))
        .filter(|text| !text.is_empty())
        .collect()
}

pub(crate) fn document_root(document: &Html) -> ElementRef<'_> {
    document.root_element()
}

pub(crate) fn parse_decimal(source_id: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| RetrieveError::parse(source_id, format!("invalid number {raw:?}: {e}")))
}

/// Parse a quantity cell.
///
/// Whole-unit counts are printed with a `whole_suffix` such as `,000`; the
/// suffix is stripped rather than interpreted. Other values may use a decimal
/// comma.
pub(crate) fn parse_quantity(source_id: &str, raw: &str, whole_suffix: &str) -> Result<Decimal> {
    let raw = raw.trim();
    let digits = match raw.strip_suffix(whole_suffix) {
        Some(whole) => whole.to_string(),
        None => raw.replace(',', "."),
    };
    parse_decimal(source_id, &digits)
}

/// Parse a portal wall-clock timestamp and shift it by the portal's fixed
/// offset.
pub(crate) fn parse_portal_timestamp(
    source_id: &str,
    raw: &str,
    offset_hours: i64,
) -> Result<NaiveDateTime> {
    let local = NaiveDateTime::parse_from_str(raw.trim(), PORTAL_TIMESTAMP_FORMAT)
        .map_err(|e| RetrieveError::parse(source_id, format!("invalid timestamp {raw:?}: {e}")))?;
    shift_by_offset(source_id, local, offset_hours)
}

pub(crate) fn missing(source_id: &str, what: &str) -> RetrieveError {
    RetrieveError::parse(source_id, format!("{what} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <table>
            <tr><td>№ ФД</td><td><span> 55102 </span></td></tr>
            <tr><td><b>bold</b> ФПД</td><td><span>3848832309</span></td></tr>
        </table>
        <div class="check-row wide"><div class="check-row"><div>N ФН</div></div></div>
    "#;

    #[test]
    fn test_label_lookup_uses_own_text() {
        let document = Html::parse_document(PAGE);
        let td = selector("test", "td").expect("selector");

        let span = selector("test", "span").expect("selector");

        let label = find_labelled(document_root(&document), &td, "№ ФД").expect("label found");
        let value = next_sibling_element(&label).expect("value cell");
        assert_eq!(own_text(&value), "");
        assert_eq!(own_text(&value.select(&span).next().expect("value span")), "55102");

        let bold_label = find_labelled(document_root(&document), &td, "ФПД").expect("own text match");
        assert_eq!(bold_label.value().name(), "td");
    }

    #[test]
    fn test_ancestor_with_exact_class() {
        let document = Html::parse_document(PAGE);
        let div = selector("test", "div").expect("selector");
        let label = find_labelled(document_root(&document), &div, "N ФН").expect("label found");

        let row = ancestor_with_class(&label, "check-row").expect("row found");
        assert_eq!(row.value().attr("class"), Some("check-row"));
        assert!(ancestor_with_class(&label, "check-section").is_none());
    }

    #[test]
    fn test_parse_quantity_suffix_is_truncated() {
        assert_eq!(parse_quantity("test", "3,000", ",000").expect("qty").to_string(), "3");
        assert_eq!(parse_quantity("test", "0,316", ",000").expect("qty").to_string(), "0.316");
        assert_eq!(parse_quantity("test", "12.000", ".000").expect("qty").to_string(), "12");
        assert_eq!(parse_quantity("test", "0.191", ".000").expect("qty").to_string(), "0.191");
        assert!(parse_quantity("test", "шт", ".000").is_err());
    }

    #[test]
    fn test_parse_portal_timestamp_applies_offset() {
        let created = parse_portal_timestamp("test", " 06.08.2017 20:08 ", 7).expect("timestamp");
        assert_eq!(created.to_string(), "2017-08-06 13:08:00");

        let crossing_midnight = parse_portal_timestamp("test", "01.01.2018 03:00", 7).expect("timestamp");
        assert_eq!(crossing_midnight.to_string(), "2017-12-31 20:00:00");

        assert!(parse_portal_timestamp("test", "2017-08-06 20:08", 7).is_err());
        assert!(parse_portal_timestamp("test", "06.08.2017 20:08", i64::MAX).is_err());
    }
}
