// ABOUTME: Text helpers shared by the engine and site extractors.
// ABOUTME: Whitespace normalization, zero-width stripping, count parsing, and truncation.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Characters some editors inject between glyphs for cursor placement.
const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Removes zero-width characters.
pub fn strip_zero_width(s: &str) -> String {
    s.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// The element's concatenated text content, untouched.
pub fn raw_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// The element's text content with zero-width characters removed and
/// whitespace normalized.
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&strip_zero_width(&raw_text(el)))
}

/// First non-blank line of `s`, trimmed.
pub fn first_line(s: &str) -> String {
    s.trim()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Parses counters such as `1,234`, `1.2k` or `3M` into a whole number.
/// Unparseable input yields 0.
pub fn parse_count(text: &str) -> u64 {
    static COUNT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?|\.\d+)\s*([km])?\b").expect("valid regex")
    });
    let caps = match COUNT.captures(text) {
        Some(c) => c,
        None => return 0,
    };
    let digits = caps[1].replace(',', "");
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000.0,
        Some(ref s) if s == "m" => 1_000_000.0,
        _ => 1.0,
    };
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => (v * multiplier).round() as u64,
        _ => 0,
    }
}

/// Parses the longest numeric prefix of `s`, the way lenient number readers do:
/// `"12.5abc"` is 12.5, `"-3"` is -3, `"abc"` is `None`.
pub fn leading_float(s: &str) -> Option<f64> {
    static PREFIX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").expect("valid regex"));
    PREFIX.find(s.trim_start()).and_then(|m| m.as_str().parse().ok())
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Number of whitespace-separated words.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn strips_zero_width() {
        assert_eq!(strip_zero_width("he\u{200B}llo\u{FEFF}"), "hello");
    }

    #[test]
    fn element_text_joins_descendants() {
        let doc = Html::parse_fragment("<div> Al<b>ice</b>\u{200B}\n  Smith </div>");
        let sel = Selector::parse("div").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(element_text(el), "Alice Smith");
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(first_line("\n\n  Name  \nsorted"), "Name");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn parse_count_handles_suffixes() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count("1.2k"), 1200);
        assert_eq!(parse_count("3M followers"), 3_000_000);
        assert_eq!(parse_count("1,234 comments"), 1234);
        assert_eq!(parse_count("12 months"), 12);
        assert_eq!(parse_count("none"), 0);
        assert_eq!(parse_count(""), 0);
    }

    #[test]
    fn leading_float_is_lenient() {
        assert_eq!(leading_float("12.5abc"), Some(12.5));
        assert_eq!(leading_float("-3"), Some(-3.0));
        assert_eq!(leading_float("1234.5.6"), Some(1234.5));
        assert_eq!(leading_float("-"), None);
        assert_eq!(leading_float("abc"), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
