// ABOUTME: LinkedIn extractors for member profiles and company pages.
// ABOUTME: Shared helpers locate the list items of a profile section anchored by an element id.

pub mod company;
pub mod profile;

pub use company::{extract_company, CompanyParams};
pub use profile::{extract_profile, ProfileParams};

use scraper::ElementRef;
use tracing::debug;

use crate::engine::resolver::{closest_ancestor, matches, select, select_first};
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::PageSource;
use crate::sites::{settle, try_scroll};

const SECTION_ITEMS: &str = ".artdeco-list__item";

/// List items of the `section` enclosing `anchor`.
pub(crate) fn section_items<'a>(root: ElementRef<'a>, anchor: &str) -> Vec<ElementRef<'a>> {
    let found = match select_first(root, anchor) {
        Some(el) => el,
        None => return Vec::new(),
    };
    let section = if matches(found, "section") {
        Some(found)
    } else {
        closest_ancestor(found, "section")
    };
    match section {
        Some(section) => select(section, SECTION_ITEMS),
        None => Vec::new(),
    }
}

/// Scrolls `anchor` into view, waits for its section to list items, and
/// parses at most `limit` of them.
pub(crate) async fn read_section<P, T, F>(
    source: &P,
    opts: &Options,
    anchor: &str,
    limit: usize,
    parse: F,
) -> Result<Vec<T>, ExtractError>
where
    P: PageSource + ?Sized,
    F: Fn(ElementRef<'_>) -> Option<T>,
{
    let present = {
        let snap = source.snapshot().await?;
        select_first(snap.root(), anchor).is_some()
    };
    if !present {
        debug!(anchor, "section not on page");
        return Ok(Vec::new());
    }
    if try_scroll(source, anchor).await {
        settle(source, opts, |snap| !section_items(snap.root(), anchor).is_empty()).await;
    }

    let snap = source.snapshot().await?;
    let items = section_items(snap.root(), anchor);
    debug!(anchor, items = items.len(), "section items found");
    Ok(items.into_iter().take(limit).filter_map(parse).collect())
}
