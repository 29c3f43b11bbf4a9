// ABOUTME: Pre-compiled CSS selector cache so each locator string is parsed once per process.
// ABOUTME: Invalid selectors are cached as absent and reported once at debug level.

//! Selector caching for repeated page queries.
//!
//! Extraction tries the same fallback chains against every snapshot a poller
//! takes, so the chains are compiled once and shared. Selector strings come
//! from static tables written against third-party markup; some of them use
//! syntax the matcher does not support. Those compile to `None` and behave as
//! a locator that matches nothing.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` for selectors that fail to parse.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    if let Ok(cache) = SELECTOR_CACHE.read() {
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(err) => {
            debug!(selector = css, error = ?err, "unsupported selector treated as no-match");
            None
        }
    };
    if let Ok(mut cache) = SELECTOR_CACHE.write() {
        // another caller may have compiled it in the meantime
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
        cache.insert(css.to_string(), compiled.clone());
    }
    compiled
}

/// Compiles a batch of selectors into the cache up front.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for css in selectors {
        let _ = get_or_compile(css.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_selector_is_cached() {
        assert!(get_or_compile(".dataRow[data-rowid]:not(.ghost)").is_some());
        assert!(get_or_compile(".dataRow[data-rowid]:not(.ghost)").is_some());
    }

    #[test]
    fn invalid_selector_returns_none_repeatedly() {
        assert!(get_or_compile("[[[invalid").is_none());
        assert!(get_or_compile("[[[invalid").is_none());
    }

    #[test]
    fn precompile_warms_cache() {
        precompile_selectors(["h1 strong a", "::bogus::"]);
        let cache = SELECTOR_CACHE.read().unwrap();
        assert!(cache.get("h1 strong a").map(Option::is_some).unwrap_or(false));
        assert!(cache.get("::bogus::").map(Option::is_none).unwrap_or(false));
    }
}
