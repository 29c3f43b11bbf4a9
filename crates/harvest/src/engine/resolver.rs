// ABOUTME: Ordered-fallback selector resolution: the first candidate yielding a usable match wins.
// ABOUTME: Locator specs, presence predicates, and scoped select helpers over scraper elements.

//! Selector resolution.
//!
//! Key behaviors:
//! - Candidates are tried strictly in order; the first candidate that yields a
//!   matching element wins, even when a later one would also match.
//! - A candidate that fails to compile is treated as matching nothing.
//! - `resolve_all` returns every element of the winning candidate and never
//!   merges results across candidates.

use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use crate::engine::compiled::get_or_compile;
use crate::engine::text::{element_text, normalize_whitespace};

/// A locator: a CSS selector, optionally paired with the attribute to read.
///
/// In JSON either `"selector"` or `["selector", "attribute"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Css(String),
    CssAttr(String, String),
}

impl Locator {
    pub fn css(sel: impl Into<String>) -> Self {
        Locator::Css(sel.into())
    }

    pub fn attr(sel: impl Into<String>, attr: impl Into<String>) -> Self {
        Locator::CssAttr(sel.into(), attr.into())
    }

    fn selector(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::CssAttr(s, _) => s,
        }
    }
}

/// What an element must carry to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Any element matches.
    Any,
    /// Non-blank text content.
    Text,
    /// Non-blank text content or an `href`.
    TextOrHref,
    /// A non-blank value for the named attribute.
    Attr(&'static str),
}

impl Presence {
    fn holds(self, el: ElementRef<'_>) -> bool {
        match self {
            Presence::Any => true,
            Presence::Text => has_text(el),
            Presence::TextOrHref => has_text(el) || el.value().attr("href").is_some(),
            Presence::Attr(name) => el
                .value()
                .attr(name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
        }
    }
}

fn has_text(el: ElementRef<'_>) -> bool {
    el.text().any(|t| !t.trim().is_empty())
}

/// All descendants of `scope` matching `css`, in document order.
pub fn select<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match get_or_compile(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// First descendant of `scope` matching `css`.
pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = get_or_compile(css)?;
    let first = scope.select(&sel).next();
    first
}

/// Whether `el` itself matches `css`.
pub fn matches(el: ElementRef<'_>, css: &str) -> bool {
    get_or_compile(css)
        .map(|sel| sel.matches(&el))
        .unwrap_or(false)
}

/// `el` itself when it matches `css`, else its first matching descendant.
pub fn self_or_descendant<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    if matches(el, css) {
        Some(el)
    } else {
        select_first(el, css)
    }
}

/// Closest ancestor of `el` (excluding itself) matching `css`.
pub fn closest_ancestor<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = get_or_compile(css)?;
    let found = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| sel.matches(a));
    found
}

/// Returns the first element, across `candidates` in order, that satisfies `presence`.
///
/// Within one candidate, matches are examined in document order; the first
/// satisfying element is returned and later candidates are never consulted.
pub fn resolve<'a, S: AsRef<str>>(
    scope: ElementRef<'a>,
    candidates: &[S],
    presence: Presence,
) -> Option<ElementRef<'a>> {
    candidates.iter().find_map(|css| {
        select(scope, css.as_ref())
            .into_iter()
            .find(|el| presence.holds(*el))
    })
}

/// Returns every match of the first candidate that yields at least one element.
pub fn resolve_all<'a, S: AsRef<str>>(scope: ElementRef<'a>, candidates: &[S]) -> Vec<ElementRef<'a>> {
    for css in candidates {
        let found = select(scope, css.as_ref());
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// Normalized text of the first candidate match with non-blank text.
pub fn resolve_text<S: AsRef<str>>(scope: ElementRef<'_>, candidates: &[S]) -> Option<String> {
    resolve(scope, candidates, Presence::Text).map(element_text)
}

/// First non-empty value produced by `locators`: normalized text for `Css`,
/// the trimmed attribute for `CssAttr`.
pub fn resolve_value(scope: ElementRef<'_>, locators: &[Locator]) -> Option<String> {
    locators.iter().find_map(|loc| {
        select(scope, loc.selector())
            .into_iter()
            .find_map(|el| locator_value(el, loc))
    })
}

fn locator_value(el: ElementRef<'_>, loc: &Locator) -> Option<String> {
    let value = match loc {
        Locator::Css(_) => element_text(el),
        Locator::CssAttr(_, attr) => normalize_whitespace(el.value().attr(attr)?),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
