// ABOUTME: Field-type inference from header markup, in fixed priority order.
// ABOUTME: Explicit type attribute, then icon identifiers, then icon class keywords, then label words.

//! Type inference.
//!
//! No single markup signal is reliable across page versions, so signals are
//! layered and the first hit wins:
//!
//! 1. an explicit type attribute on the header (`data-columntype`)
//! 2. the icon identifier (`<use href="#Number">`) matched against [`ICON_PATTERNS`]
//! 3. the icon's class names matched against [`CLASS_KEYWORDS`]
//! 4. the header's visible label matched against [`LABEL_KEYWORDS`]
//! 5. [`FieldType::SingleLineText`]
//!
//! Tables are ordered; more specific patterns sit before patterns they contain.

use scraper::ElementRef;
use tracing::debug;

use crate::engine::resolver::select_first;
use crate::engine::text::raw_text;
use crate::engine::types::FieldType;

/// Attributes that carry a machine-readable type.
pub const TYPE_ATTRIBUTES: &[&str] = &["data-columntype", "data-column-type", "data-fieldtype"];

/// Where icons live inside a header, most specific first.
pub const ICON_SELECTORS: &[&str] = &[
    "svg use[href*=\"#\"]",
    ".icon use[href*=\"#\"]",
    "use[href*=\"#\"]",
    "svg",
    "[class*=\"icon\"]",
];

/// Icon identifier substrings, checked in order against the icon's `href`.
pub const ICON_PATTERNS: &[(&[&str], FieldType)] = &[
    (&["#SingleLineText"], FieldType::SingleLineText),
    (&["#LongText", "#RichText"], FieldType::LongText),
    (&["#Number"], FieldType::Number),
    (&["#Date", "#Calendar"], FieldType::Date),
    (&["#SingleSelect"], FieldType::Select),
    (&["#MultipleSelect"], FieldType::MultipleSelect),
    (&["#Checkbox", "#CheckBold", "#Check"], FieldType::Checkbox),
    (&["#MultipleAttachment", "#Attachment"], FieldType::Attachment),
    (&["#ForeignKey", "#LinkedRecord"], FieldType::ForeignKey),
    (&["#Url", "#Link"], FieldType::Url),
    (&["#Email"], FieldType::Email),
    (&["#Phone"], FieldType::PhoneNumber),
    (&["#Formula"], FieldType::Formula),
    (&["#Rollup"], FieldType::Rollup),
    (&["#Currency"], FieldType::Currency),
    (&["#Percent"], FieldType::Percent),
    (&["#Duration"], FieldType::Duration),
    (&["#Rating"], FieldType::Rating),
    (&["#Text"], FieldType::SingleLineText),
];

/// Icon class-name keywords (lowercase), checked in order.
pub const CLASS_KEYWORDS: &[(&str, FieldType)] = &[
    ("longtext", FieldType::LongText),
    ("richtext", FieldType::LongText),
    ("multipleselect", FieldType::MultipleSelect),
    ("multiselect", FieldType::MultipleSelect),
    ("checkbox", FieldType::Checkbox),
    ("attachment", FieldType::Attachment),
    ("foreign", FieldType::ForeignKey),
    ("formula", FieldType::Formula),
    ("rollup", FieldType::Rollup),
    ("currency", FieldType::Currency),
    ("percent", FieldType::Percent),
    ("duration", FieldType::Duration),
    ("rating", FieldType::Rating),
    ("phone", FieldType::PhoneNumber),
    ("email", FieldType::Email),
    ("number", FieldType::Number),
    ("date", FieldType::Date),
    ("select", FieldType::Select),
    ("link", FieldType::Url),
    ("url", FieldType::Url),
    ("text", FieldType::SingleLineText),
];

/// Label keywords (lowercase), checked in order against the header's text.
pub const LABEL_KEYWORDS: &[(&[&str], FieldType)] = &[
    (&["date"], FieldType::Date),
    (&["quantity", "number", "count"], FieldType::Number),
    (&["photo", "image", "attachment"], FieldType::Attachment),
    (&["email"], FieldType::Email),
    (&["phone"], FieldType::PhoneNumber),
    (&["url", "link"], FieldType::Url),
];

/// Infers the semantic type of the field a header element describes.
///
/// Deterministic: the same header markup always yields the same type.
pub fn infer_type(header: ElementRef<'_>) -> FieldType {
    if let Some(t) = explicit_type(header) {
        return t;
    }
    if let Some(t) = icon_type(header) {
        return t;
    }
    label_type(&raw_text(header).to_lowercase()).unwrap_or_default()
}

fn explicit_type(header: ElementRef<'_>) -> Option<FieldType> {
    TYPE_ATTRIBUTES.iter().find_map(|attr| {
        let raw = header.value().attr(attr)?;
        match raw.parse::<FieldType>() {
            Ok(t) => Some(t),
            Err(err) => {
                debug!(attr, value = raw, error = %err, "ignoring explicit type");
                None
            }
        }
    })
}

fn icon_type(header: ElementRef<'_>) -> Option<FieldType> {
    ICON_SELECTORS.iter().find_map(|css| {
        let icon = select_first(header, css)?;
        let href = icon
            .value()
            .attr("href")
            .or_else(|| icon.value().attr("xlink:href"))
            .unwrap_or("");
        if let Some(t) = icon_href_type(href) {
            return Some(t);
        }
        let classes = icon
            .value()
            .attr("class")
            .unwrap_or("")
            .to_lowercase();
        class_type(&classes)
    })
}

/// Maps an icon identifier such as `#Calendar` to a type.
pub fn icon_href_type(href: &str) -> Option<FieldType> {
    if href.is_empty() {
        return None;
    }
    ICON_PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| href.contains(n)))
        .map(|(_, t)| *t)
}

/// Maps lowercase class names to a type.
pub fn class_type(classes: &str) -> Option<FieldType> {
    if classes.is_empty() {
        return None;
    }
    CLASS_KEYWORDS
        .iter()
        .find(|(kw, _)| classes.contains(kw))
        .map(|(_, t)| *t)
}

/// Maps a lowercase label to a type by keyword spotting.
pub fn label_type(label: &str) -> Option<FieldType> {
    LABEL_KEYWORDS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| label.contains(n)))
        .map(|(_, t)| *t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn infer(html: &str) -> FieldType {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse(".h").unwrap();
        let header = doc.select(&sel).next().unwrap();
        infer_type(header)
    }

    #[test]
    fn explicit_attribute_beats_every_heuristic() {
        let html = r##"<div class="h" data-columntype="checkbox">
            <svg><use href="#Number"></use></svg><span>Quantity date</span></div>"##;
        assert_eq!(infer(html), FieldType::Checkbox);
        assert_eq!(infer(html), infer(html));
    }

    #[test]
    fn unknown_explicit_type_falls_through() {
        let html = r##"<div class="h" data-columntype="hologram"><use href="#Email"></use></div>"##;
        assert_eq!(infer(html), FieldType::Email);
    }

    #[test]
    fn icon_href_beats_label() {
        let html = r##"<div class="h"><svg><use href="/icons.svg#Calendar"></use></svg>Count</div>"##;
        assert_eq!(infer(html), FieldType::Date);
    }

    #[test]
    fn linked_record_icon_is_foreign_key_not_url() {
        assert_eq!(icon_href_type("#LinkedRecord"), Some(FieldType::ForeignKey));
        assert_eq!(icon_href_type("#Link"), Some(FieldType::Url));
        assert_eq!(icon_href_type("#MultipleSelect"), Some(FieldType::MultipleSelect));
        assert_eq!(icon_href_type("#LongText"), Some(FieldType::LongText));
    }

    #[test]
    fn icon_classes_used_when_href_is_silent() {
        let html = r#"<div class="h"><span class="icon icon-multipleSelect"></span>Tags</div>"#;
        assert_eq!(infer(html), FieldType::MultipleSelect);
    }

    #[test]
    fn label_keywords_then_default() {
        assert_eq!(infer(r#"<div class="h">Due Date</div>"#), FieldType::Date);
        assert_eq!(infer(r#"<div class="h">Count</div>"#), FieldType::Number);
        assert_eq!(infer(r#"<div class="h">Photos</div>"#), FieldType::Attachment);
        assert_eq!(infer(r#"<div class="h">Work Phone</div>"#), FieldType::PhoneNumber);
        assert_eq!(infer(r#"<div class="h">Name</div>"#), FieldType::SingleLineText);
    }
}
