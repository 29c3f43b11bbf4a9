// ABOUTME: Typed value coercion: maps a cell element and its field type to a Value or nothing.
// ABOUTME: One handler per field type; failures degrade to raw text or omission, never errors.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use url::Url;

use crate::engine::resolver::{closest_ancestor, resolve_all, select, select_first, self_or_descendant};
use crate::engine::text::{element_text, leading_float};
use crate::engine::types::{Attachment, AttachmentKind, FieldType, Link, Value};

/// Per-run coercion settings.
#[derive(Debug, Clone, Default)]
pub struct CoerceContext {
    /// Keep display formatting (raw dates, `{url, label}` links).
    pub formatted: bool,
    /// Page address that relative `href`/`src` values resolve against.
    pub base_url: Option<Url>,
}

impl CoerceContext {
    pub fn new(formatted: bool, base_url: Option<Url>) -> Self {
        Self {
            formatted,
            base_url,
        }
    }

    /// Resolves `raw` against the page address; unresolvable values pass through.
    pub fn absolutize(&self, raw: &str) -> String {
        let raw = raw.trim();
        if let Ok(abs) = Url::parse(raw) {
            return abs.to_string();
        }
        match self.base_url.as_ref().and_then(|b| b.join(raw).ok()) {
            Some(joined) => joined.to_string(),
            None => raw.to_string(),
        }
    }
}

const PILL_SELECTORS: &[&str] = &[
    ".choiceToken",
    ".cellToken",
    "[class*=\"pill\"]",
    "[class*=\"token\"]",
];
const FOREIGN_SELECTORS: &[&str] = &[
    ".foreign-key-blue",
    "[class*=\"foreign\"]",
    "[class*=\"linked\"]",
];
const COMPUTED_SELECTORS: &[&str] = &[".computed-value", "[class*=\"computed\"]"];
const CHECKBOX_MARKER: &str = ".checkbox";

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d,.\-]+").expect("valid regex"));

/// Date shapes tried in order, each with the formats its match may be written in.
const DATE_TABLE: &[(&str, &[&str])] = &[
    (r"\d{1,2}/\d{1,2}/\d{4}", &["%m/%d/%Y"]),
    (r"\d{4}-\d{2}-\d{2}", &["%Y-%m-%d"]),
    (r"[A-Za-z]+ \d{1,2}, \d{4}", &["%B %d, %Y", "%b %d, %Y"]),
];

static DATE_PATTERNS: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    DATE_TABLE
        .iter()
        .filter_map(|(re, formats)| Regex::new(re).ok().map(|r| (r, *formats)))
        .collect()
});

/// Coerces a cell into a typed value for `field_type`.
///
/// Returns `None` when the cell yields nothing for the type; callers omit the
/// field in that case rather than storing an empty value.
pub fn coerce(cell: ElementRef<'_>, field_type: FieldType, ctx: &CoerceContext) -> Option<Value> {
    let text = element_text(cell);
    match field_type {
        FieldType::Checkbox => Some(Value::Bool(checkbox(cell, &text))),
        FieldType::Number | FieldType::Currency | FieldType::Percent => {
            number(&text).map(Value::Number)
        }
        FieldType::Date => date(&text, ctx.formatted),
        FieldType::Select => match tokens(cell, PILL_SELECTORS) {
            Some(mut values) => Some(Value::Text(values.remove(0))),
            None => non_empty(text),
        },
        FieldType::MultipleSelect => match tokens(cell, PILL_SELECTORS) {
            Some(values) => Some(Value::List(values)),
            None => non_empty(text),
        },
        FieldType::ForeignKey => match tokens(cell, FOREIGN_SELECTORS) {
            Some(values) => Some(Value::List(values)),
            None => non_empty(text),
        },
        FieldType::Url | FieldType::Email => match link(cell, ctx) {
            Some(found) if ctx.formatted => Some(Value::Link(found)),
            Some(found) => Some(Value::Text(found.url)),
            None => non_empty(text),
        },
        FieldType::Attachment => {
            let found = attachments(cell, ctx);
            if found.is_empty() {
                non_empty(text)
            } else {
                Some(Value::Attachments(found))
            }
        }
        FieldType::Formula | FieldType::Rollup => {
            match select_first_text(cell, COMPUTED_SELECTORS) {
                Some(computed) => Some(Value::Text(computed)),
                None => non_empty(text),
            }
        }
        _ => non_empty(text),
    }
}

fn non_empty(text: String) -> Option<Value> {
    if text.is_empty() {
        None
    } else {
        Some(Value::Text(text))
    }
}

/// An `aria-checked` element is authoritative. Without one, any checked marker
/// counts: a `.checkbox` element in or around the cell, a check icon or glyph.
fn checkbox(cell: ElementRef<'_>, text: &str) -> bool {
    if let Some(el) = self_or_descendant(cell, "[aria-checked]") {
        return el.value().attr("aria-checked") == Some("true");
    }
    if self_or_descendant(cell, CHECKBOX_MARKER).is_some()
        || closest_ancestor(cell, CHECKBOX_MARKER).is_some()
    {
        return true;
    }
    if select_first(cell, "svg use[href*=\"Check\"], use[href*=\"Check\"]").is_some() {
        return true;
    }
    if select_first(cell, "input[type=\"checkbox\"][checked]").is_some() {
        return true;
    }
    text.contains('✓') || text.contains('✔')
}

/// First numeric-looking run, thousands separators removed, parsed leniently.
fn number(text: &str) -> Option<f64> {
    let run = NUMERIC.find(text)?.as_str().replace(',', "");
    leading_float(&run).filter(|v| v.is_finite())
}

fn date(text: &str, formatted: bool) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    for (pattern, formats) in DATE_PATTERNS.iter() {
        let matched = match pattern.find(text) {
            Some(m) => m.as_str(),
            None => continue,
        };
        let parsed = formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(matched, fmt).ok());
        return match parsed {
            Some(day) if !formatted => day
                .and_hms_opt(0, 0, 0)
                .map(|dt| Value::Date(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)))
                .or_else(|| Some(Value::Text(text.to_string()))),
            _ => Some(Value::Text(text.to_string())),
        };
    }
    Some(Value::Text(text.to_string()))
}

/// Texts of the first token candidate that yields any non-empty text.
fn tokens(cell: ElementRef<'_>, candidates: &[&str]) -> Option<Vec<String>> {
    let values: Vec<String> = resolve_all(cell, candidates)
        .into_iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn select_first_text(cell: ElementRef<'_>, candidates: &[&str]) -> Option<String> {
    let el = resolve_all(cell, candidates).into_iter().next()?;
    let text = element_text(el);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn link(cell: ElementRef<'_>, ctx: &CoerceContext) -> Option<Link> {
    let anchor = self_or_descendant(cell, "a[href]")?;
    let href = anchor.value().attr("href")?;
    Some(Link {
        url: ctx.absolutize(href),
        label: element_text(anchor),
    })
}

fn attachments(cell: ElementRef<'_>, ctx: &CoerceContext) -> Vec<Attachment> {
    let mut out: Vec<Attachment> = Vec::new();
    let mut push = |item: Attachment| {
        if !item.url.is_empty() && !out.iter().any(|a| a.url == item.url) {
            out.push(item);
        }
    };
    for img in select(cell, "img[src]") {
        let src = img.value().attr("src").unwrap_or("");
        let alt = img.value().attr("alt").unwrap_or("").trim();
        push(Attachment {
            kind: AttachmentKind::Image,
            url: ctx.absolutize(src),
            filename: if alt.is_empty() { "image".to_string() } else { alt.to_string() },
        });
    }
    for a in select(cell, "a[href]") {
        let href = a.value().attr("href").unwrap_or("");
        if href.trim_start().to_lowercase().starts_with("javascript:") {
            continue;
        }
        let label = element_text(a);
        push(Attachment {
            kind: AttachmentKind::File,
            url: ctx.absolutize(href),
            filename: if label.is_empty() { "attachment".to_string() } else { label },
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    fn coerce_html(html: &str, t: FieldType, formatted: bool) -> Option<Value> {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse(".cell").unwrap();
        let cell = doc.select(&sel).next().unwrap();
        let ctx = CoerceContext::new(formatted, Url::parse("https://airtable.com/appX/tblY").ok());
        coerce(cell, t, &ctx)
    }

    #[test]
    fn number_takes_first_numeric_run() {
        let v = coerce_html(r#"<div class="cell">1,234.5 units</div>"#, FieldType::Number, true);
        assert_eq!(v, Some(Value::Number(1234.5)));
        let v = coerce_html(r#"<div class="cell">$-12.00</div>"#, FieldType::Currency, true);
        assert_eq!(v, Some(Value::Number(-12.0)));
    }

    #[test]
    fn number_omits_unparseable() {
        assert_eq!(coerce_html(r#"<div class="cell">n/a</div>"#, FieldType::Number, true), None);
        assert_eq!(coerce_html(r#"<div class="cell">-</div>"#, FieldType::Number, true), None);
        assert_eq!(coerce_html(r#"<div class="cell"></div>"#, FieldType::Percent, true), None);
    }

    #[test]
    fn checkbox_follows_aria_checked_not_text() {
        let on = r#"<div class="cell"><div aria-checked="true"></div>no</div>"#;
        let off = r#"<div class="cell"><div aria-checked="false">✓ checked</div></div>"#;
        let none = r#"<div class="cell">maybe</div>"#;
        assert_eq!(coerce_html(on, FieldType::Checkbox, true), Some(Value::Bool(true)));
        assert_eq!(coerce_html(off, FieldType::Checkbox, true), Some(Value::Bool(false)));
        assert_eq!(coerce_html(none, FieldType::Checkbox, true), Some(Value::Bool(false)));
    }

    #[test]
    fn checkbox_icon_or_glyph_without_aria() {
        let icon = r##"<div class="cell"><svg><use href="#CheckBold"></use></svg></div>"##;
        assert_eq!(coerce_html(icon, FieldType::Checkbox, true), Some(Value::Bool(true)));
        let glyph = r#"<div class="cell">✔</div>"#;
        assert_eq!(coerce_html(glyph, FieldType::Checkbox, true), Some(Value::Bool(true)));
    }

    #[test]
    fn checkbox_class_inside_or_around_the_cell() {
        let inside = r#"<div class="cell"><div class="checkbox"><span class="mark"></span></div></div>"#;
        assert_eq!(coerce_html(inside, FieldType::Checkbox, true), Some(Value::Bool(true)));

        let doc = Html::parse_fragment(r#"<div class="checkbox"><div class="cell"></div></div>"#);
        let sel = Selector::parse(".cell").unwrap();
        let cell = doc.select(&sel).next().unwrap();
        assert_eq!(
            coerce(cell, FieldType::Checkbox, &CoerceContext::default()),
            Some(Value::Bool(true))
        );

        let aria_wins = r#"<div class="cell"><div class="checkbox" aria-checked="false"></div></div>"#;
        assert_eq!(coerce_html(aria_wins, FieldType::Checkbox, true), Some(Value::Bool(false)));
    }

    #[test]
    fn date_formats_and_fallbacks() {
        let iso = coerce_html(r#"<div class="cell">1/15/2024</div>"#, FieldType::Date, false);
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(iso, Some(Value::Date(expected)));

        let named = coerce_html(r#"<div class="cell">Due March 3, 2024</div>"#, FieldType::Date, false);
        assert_eq!(named, Some(Value::Date(Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap())));

        let kept = coerce_html(r#"<div class="cell">2024-02-01</div>"#, FieldType::Date, true);
        assert_eq!(kept, Some(Value::Text("2024-02-01".into())));

        let bad = coerce_html(r#"<div class="cell">13/45/2024</div>"#, FieldType::Date, false);
        assert_eq!(bad, Some(Value::Text("13/45/2024".into())));

        let free = coerce_html(r#"<div class="cell">next week</div>"#, FieldType::Date, false);
        assert_eq!(free, Some(Value::Text("next week".into())));

        assert_eq!(coerce_html(r#"<div class="cell"> </div>"#, FieldType::Date, false), None);
    }

    #[test]
    fn selects_read_pills_or_raw_text() {
        let html = r#"<div class="cell"><span class="choiceToken">Red</span><span class="choiceToken">Blue</span></div>"#;
        assert_eq!(coerce_html(html, FieldType::Select, true), Some(Value::Text("Red".into())));
        assert_eq!(
            coerce_html(html, FieldType::MultipleSelect, true),
            Some(Value::List(vec!["Red".into(), "Blue".into()]))
        );
        let plain = r#"<div class="cell"> Green </div>"#;
        assert_eq!(coerce_html(plain, FieldType::MultipleSelect, true), Some(Value::Text("Green".into())));
    }

    #[test]
    fn foreign_keys_collect_linked_markers() {
        let html = r#"<div class="cell"><span class="foreign-key-blue">Acme</span><span class="foreign-key-blue">Globex</span></div>"#;
        assert_eq!(
            coerce_html(html, FieldType::ForeignKey, true),
            Some(Value::List(vec!["Acme".into(), "Globex".into()]))
        );
    }

    #[test]
    fn url_respects_formatted_flag() {
        let html = r#"<div class="cell"><a href="/docs">Docs</a></div>"#;
        assert_eq!(
            coerce_html(html, FieldType::Url, true),
            Some(Value::Link(Link {
                url: "https://airtable.com/docs".into(),
                label: "Docs".into()
            }))
        );
        assert_eq!(
            coerce_html(html, FieldType::Email, false),
            Some(Value::Text("https://airtable.com/docs".into()))
        );
        let bare = r#"<div class="cell">a@b.test</div>"#;
        assert_eq!(coerce_html(bare, FieldType::Email, true), Some(Value::Text("a@b.test".into())));
    }

    #[test]
    fn attachments_collect_images_and_files() {
        let html = r#"<div class="cell">
            <img src="https://cdn.test/a.png" alt="a.png">
            <a href="https://cdn.test/a.png">dup</a>
            <a href="javascript:void(0)">menu</a>
            <a href="/files/b.pdf"></a>
        </div>"#;
        let v = coerce_html(html, FieldType::Attachment, true).unwrap();
        assert_eq!(
            v,
            Value::Attachments(vec![
                Attachment {
                    kind: AttachmentKind::Image,
                    url: "https://cdn.test/a.png".into(),
                    filename: "a.png".into(),
                },
                Attachment {
                    kind: AttachmentKind::File,
                    url: "https://airtable.com/files/b.pdf".into(),
                    filename: "attachment".into(),
                },
            ])
        );
    }

    #[test]
    fn formula_prefers_computed_value() {
        let html = r#"<div class="cell">= <span class="computed-value">42</span></div>"#;
        assert_eq!(coerce_html(html, FieldType::Formula, true), Some(Value::Text("42".into())));
    }

    #[test]
    fn default_text_is_trimmed_or_omitted() {
        let html = "<div class=\"cell\">  hello\u{200B}  world </div>";
        assert_eq!(coerce_html(html, FieldType::LongText, true), Some(Value::Text("hello world".into())));
        assert_eq!(coerce_html(r#"<div class="cell">  </div>"#, FieldType::SingleLineText, true), None);
    }
}
