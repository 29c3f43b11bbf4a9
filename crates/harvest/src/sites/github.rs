// ABOUTME: GitHub extractors: repository pages (stats, files, languages, README) and repository search results.
// ABOUTME: Reads what the page renders; clicks only to reveal the language breakdown or README body.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::engine::pipeline::{Envelope, ErrorBoundary};
use crate::engine::resolver::{
    closest_ancestor, resolve, resolve_all, resolve_text, select_first, Presence,
};
use crate::engine::text::{element_text, normalize_whitespace, parse_count, raw_text, strip_zero_width, truncate_chars};
use crate::engine::types::serialize_instant;
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};
use crate::sites::{absolute, guarded, settle, try_click, Site};

const REPO_NAME: &[&str] = &[
    "a[data-pjax=\"#repo-content-pjax-container\"][href*=\"/\"]",
    "a[data-turbo-frame=\"repo-content-turbo-frame\"]",
    "h1 strong a",
    "h1 a",
];

const DESCRIPTION: &[&str] = &[
    "p[data-pjax=\"#repo-content-pjax-container\"]",
    "[itemprop=\"about\"]",
    ".f4.my-3",
    ".BorderGrid-cell p.f4",
];

const STARS: &[&str] = &[
    "#repo-stars-counter-star",
    ".js-social-count[href*=\"stargazers\"]",
    "a[href*=\"/stargazers\"] strong",
    "a[href*=\"/stargazers\"] span",
    ".Counter[title*=\"star\"]",
];

const FORKS: &[&str] = &[
    "#repo-network-counter",
    ".js-social-count[href*=\"forks\"]",
    "a[href*=\"/forks\"] strong",
    "a[href*=\"/forks\"] span",
    ".Counter[title*=\"fork\"]",
];

const WATCHERS: &[&str] = &[
    "#repo-watchers-counter",
    ".js-social-count[href*=\"watchers\"]",
    "a[href*=\"/watchers\"] strong",
    "a[href*=\"/watchers\"] span",
];

const FILE_ROWS: &[&str] = &[
    ".react-directory-row",
    "tr[id^=\"folder-row-\"]",
    "tr[id^=\"file-row-\"]",
    ".js-navigation-item",
    "[data-testid=\"file-row\"]",
];

const FILE_LINK: &str = "a[href*=\"/blob/\"], a[href*=\"/tree/\"], .Link--primary[href*=\"/\"]";
const FILE_TIME: &str = "relative-time, time-ago, time[datetime]";
const DIRECTORY_ICON: &str = ".octicon-file-directory-fill, .icon-directory";

const LANGUAGE_BAR: &[&str] = &[
    ".BorderGrid-row .ml-3 .Progress",
    ".repository-lang-stats-graph",
    "[data-testid=\"language-stats\"]",
];

const LANGUAGES: &[&str] = &[
    ".BorderGrid-row .ml-3 .d-flex .text-mono",
    "[data-ga-click*=\"language\"]",
    ".repository-lang-stats .lang",
    ".Progress-item",
];

const README_BODY: &[&str] = &[
    "article.markdown-body.entry-content.container-lg",
    "[data-testid=\"readme\"] .Box-body",
    "#readme .Box-body",
    ".readme .Box-body",
    "article[itemprop=\"text\"]",
    ".Box .markdown-body",
];

const README_LINK: &str = "a[href*=\"README\"], a[title*=\"README\"], a[aria-label*=\"README\"]";
const README_FILE: &str = "a[href*=\"/blob/\"][href*=\"README\"]";
const README_LIMIT: usize = 3000;

/// Stored as the README when the file is listed but its body is not rendered.
pub const README_PLACEHOLDER: &str = "README file found but content not accessible from main page";

static LANGUAGE_SHARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+?)\s+([\d.]+%)").expect("valid regex"));

/// Parameters accepted by the repository extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryParams {
    pub max_files: usize,
    pub include_files: bool,
    pub include_languages: bool,
    pub include_readme: bool,
}

impl Default for RepositoryParams {
    fn default() -> Self {
        Self {
            max_files: 50,
            include_files: false,
            include_languages: false,
            include_readme: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchers: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One row of the repository file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub url: String,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageShare {
    pub name: String,
    /// Such as `"71.3%"`, or `"unknown"`.
    pub percentage: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryExtraction {
    pub repository: Repository,
    pub files: Vec<RepoEntry>,
    pub languages: Vec<LanguageShare>,
    pub readme: String,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts a repository's landing page.
pub async fn extract_repository<P>(
    source: &P,
    params: &RepositoryParams,
    opts: &Options,
) -> Envelope<RepositoryExtraction>
where
    P: PageSource + ?Sized,
{
    let boundary = ErrorBoundary::open(Site::GithubRepo.envelope_key(), source.url());
    guarded(Site::GithubRepo, boundary, repository_stages(source, params, opts)).await
}

async fn repository_stages<P>(
    source: &P,
    params: &RepositoryParams,
    opts: &Options,
) -> Result<RepositoryExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    let (repository, files) = {
        let snap = source.snapshot().await?;
        let repository = repository_info(&snap, source.url());
        let files = if params.include_files {
            file_entries(&snap, params.max_files)
        } else {
            Vec::new()
        };
        (repository, files)
    };
    info!(name = ?repository.name, files = files.len(), "repository read");

    let languages = if params.include_languages {
        languages(source, opts).await?
    } else {
        Vec::new()
    };
    let readme = if params.include_readme {
        readme(source, opts).await?
    } else {
        String::new()
    };

    Ok(RepositoryExtraction {
        repository,
        files,
        languages,
        readme,
        extracted_at: Utc::now(),
    })
}

fn repository_info(snap: &Snapshot, url: String) -> Repository {
    let root = snap.root();
    let name = match resolve(root, REPO_NAME, Presence::TextOrHref) {
        Some(link) => Some(name_from_link(snap, link)),
        None => name_from_path(&url),
    };
    let count = |candidates: &[&str]| {
        resolve(root, candidates, Presence::TextOrHref).map(|el| parse_count(&element_text(el)))
    };
    Repository {
        name,
        description: resolve_text(root, DESCRIPTION),
        stars: count(STARS),
        forks: count(FORKS),
        watchers: count(WATCHERS),
        url,
    }
}

/// `owner/repo` from the link's path, else the link text.
fn name_from_link(snap: &Snapshot, link: ElementRef<'_>) -> String {
    let from_href = link.value().attr("href").and_then(|href| {
        let abs = Url::parse(&absolute(snap, href)).ok()?;
        let parts: Vec<&str> = abs.path().split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            Some(format!("{}/{}", parts[0], parts[1]))
        } else {
            None
        }
    });
    from_href.unwrap_or_else(|| element_text(link))
}

fn name_from_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let parts: Vec<&str> = parsed.path().split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 {
        Some(format!("{}/{}", parts[0], parts[1]))
    } else {
        None
    }
}

fn file_entries(snap: &Snapshot, max_files: usize) -> Vec<RepoEntry> {
    let rows = resolve_all(snap.root(), FILE_ROWS);
    debug!(rows = rows.len(), "file rows found");
    rows.into_iter()
        .take(max_files)
        .filter_map(|row| file_entry(snap, row))
        .collect()
}

fn file_entry(snap: &Snapshot, row: ElementRef<'_>) -> Option<RepoEntry> {
    let link = select_first(row, FILE_LINK)?;
    let href = link.value().attr("href").filter(|h| !h.trim().is_empty())?;
    let url = absolute(snap, href);

    let name = [
        Some(element_text(link)),
        link.value().attr("title").map(normalize_whitespace),
        link.value()
            .attr("aria-label")
            .and_then(|label| label.split(',').next())
            .map(normalize_whitespace),
        url.rsplit('/').next().map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .find(|n| !n.is_empty())?;

    let directory = url.contains("/tree/")
        || link
            .value()
            .attr("aria-label")
            .map(|l| l.contains("Directory"))
            .unwrap_or(false)
        || select_first(row, DIRECTORY_ICON).is_some();

    Some(RepoEntry {
        name,
        kind: if directory {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        url,
        last_modified: select_first(row, FILE_TIME)
            .and_then(|t| t.value().attr("datetime"))
            .map(str::to_string),
    })
}

/// Expands the language bar, then reads each language and its share.
async fn languages<P>(source: &P, opts: &Options) -> Result<Vec<LanguageShare>, ExtractError>
where
    P: PageSource + ?Sized,
{
    let bar = {
        let snap = source.snapshot().await?;
        LANGUAGE_BAR
            .iter()
            .copied()
            .find(|css| select_first(snap.root(), css).is_some())
    };
    if let Some(css) = bar {
        if try_click(source, css).await {
            settle(source, opts, |s| !resolve_all(s.root(), LANGUAGES).is_empty()).await;
        }
    }

    let snap = source.snapshot().await?;
    let found: Vec<LanguageShare> = resolve_all(snap.root(), LANGUAGES)
        .into_iter()
        .map(|el| language_share(&element_text(el)))
        .filter(|lang| !lang.name.is_empty())
        .collect();
    debug!(count = found.len(), "languages read");
    Ok(found)
}

fn language_share(text: &str) -> LanguageShare {
    match LANGUAGE_SHARE.captures(text) {
        Some(caps) => LanguageShare {
            name: caps[1].to_string(),
            percentage: caps[2].to_string(),
        },
        None => LanguageShare {
            name: text.to_string(),
            percentage: "unknown".to_string(),
        },
    }
}

/// README body text, clicking through to the file when the body is not rendered.
async fn readme<P>(source: &P, opts: &Options) -> Result<String, ExtractError>
where
    P: PageSource + ?Sized,
{
    let has_link = {
        let snap = source.snapshot().await?;
        if let Some(body) = readme_body(&snap) {
            return Ok(body);
        }
        select_first(snap.root(), README_LINK).is_some()
    };

    if has_link {
        debug!("README body not rendered, opening the file");
        if try_click(source, README_LINK).await {
            settle(source, opts, |s| readme_body(s).is_some()).await;
        }
    }

    let snap = source.snapshot().await?;
    if let Some(body) = readme_body(&snap) {
        return Ok(body);
    }
    if select_first(snap.root(), README_FILE).is_some() {
        return Ok(README_PLACEHOLDER.to_string());
    }
    Ok(String::new())
}

fn readme_body(snap: &Snapshot) -> Option<String> {
    let body = resolve(snap.root(), README_BODY, Presence::Text)?;
    let text = strip_zero_width(&raw_text(body));
    Some(truncate_chars(text.trim(), README_LIMIT))
}

const RESULT_ITEMS: &[&str] = &[
    ".Box-sc-g0xbh4-0.gPrlij",
    ".repo-list-item",
    "[data-testid=\"results-list\"] > div",
    ".search-result-item",
    "article[data-testid*=\"result\"]",
    ".package-list-item",
];

const RESULT_NAME: &[&str] = &[
    "a.prc-Link-Link-85e08[href*=\"/\"]",
    ".search-title a",
    "h3 a",
    "a[href*=\"/\"][data-testid*=\"result\"]",
    ".f4 a",
    "a[href^=\"/\"][href*=\"/\"]",
];

const RESULT_DESCRIPTION: &[&str] = &[
    ".Box-sc-g0xbh4-0.gKFdvh.search-match.prc-Text-Text-0ima0",
    "span.gKFdvh.search-match",
    ".search-match:not(em):not(.search-title)",
    "p.mb-1",
    ".search-result-description",
    "p.color-text-secondary",
    "[data-testid*=\"description\"]",
];

const RESULT_LANGUAGE: &[&str] = &[
    "span[aria-label*=\"language\"]",
    "[itemprop=\"programmingLanguage\"]",
    ".f6 .mr-3",
    ".language",
    "span[aria-label$=\" language\"]",
];

const RESULT_STARS: &[&str] = &[
    "a[href*=\"/stargazers\"] .prc-Text-Text-0ima0",
    "a[href*=\"/stargazers\"]",
    ".octicon-star + span",
    ".octicon-star",
    "[aria-label*=\"star\"]",
];

const RESULT_UPDATED: &[&str] = &[
    "span[title*=\"202\"]",
    "span[title*=\"ago\"]",
    ".prc-Truncate-Truncate-A9Wn6 span[title]",
    "relative-time",
    "time-ago",
    "time[datetime]",
    "[title*=\"Updated\"]",
];

const REPOSITORIES_TAB: &str = "a[href*=\"type=repositories\"], .menu-item[href*=\"type=repositories\"], .UnderlineNav-item[href*=\"type=repositories\"]";

const GITHUB_ORIGIN: &str = "https://github.com";

/// Parameters accepted by the search extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub query: String,
    pub language: Option<String>,
    pub sort: String,
    pub max_results: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            language: None,
            sort: "best-match".to_string(),
            max_results: 10,
        }
    }
}

/// One repository in the result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub name: String,
    pub url: String,
    pub description: String,
    pub language: String,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchExtraction {
    pub query: String,
    pub language: String,
    pub sort: String,
    pub total_found: usize,
    pub results: Vec<SearchResult>,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts the repository results currently listed on a search page.
///
/// Navigating to the search address is the caller's job.
pub async fn extract_search<P>(source: &P, params: &SearchParams, opts: &Options) -> Envelope<SearchExtraction>
where
    P: PageSource + ?Sized,
{
    let mut boundary = ErrorBoundary::open(Site::GithubSearch.envelope_key(), source.url());
    boundary.note("query", params.query.clone());
    guarded(Site::GithubSearch, boundary, search_stages(source, params, opts)).await
}

async fn search_stages<P>(
    source: &P,
    params: &SearchParams,
    opts: &Options,
) -> Result<SearchExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    let switch_tab = {
        let snap = source.snapshot().await?;
        match select_first(snap.root(), REPOSITORIES_TAB) {
            Some(tab) => {
                let selected = tab
                    .value()
                    .attr("class")
                    .map(|c| c.split_whitespace().any(|c| c == "selected"))
                    .unwrap_or(false);
                !selected && tab.value().attr("aria-current").is_none()
            }
            None => false,
        }
    };
    if switch_tab && try_click(source, REPOSITORIES_TAB).await {
        settle(source, opts, |s| !resolve_all(s.root(), RESULT_ITEMS).is_empty()).await;
    }

    let snap = source.snapshot().await?;
    let items = resolve_all(snap.root(), RESULT_ITEMS);
    if items.is_empty() {
        debug!("no result elements found");
    }
    let results: Vec<SearchResult> = items
        .into_iter()
        .take(params.max_results)
        .filter_map(search_result)
        .collect();
    info!(results = results.len(), "search results read");

    Ok(SearchExtraction {
        query: params.query.clone(),
        language: params
            .language
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "all".to_string()),
        sort: params.sort.clone(),
        total_found: results.len(),
        results,
        extracted_at: Utc::now(),
    })
}

fn search_result(item: ElementRef<'_>) -> Option<SearchResult> {
    let link = resolve(item, RESULT_NAME, Presence::Any)?;
    let text_of = |candidates: &[&str]| {
        resolve(item, candidates, Presence::Any)
            .map(element_text)
            .unwrap_or_default()
    };
    Some(SearchResult {
        name: element_text(link),
        url: github_url(link.value().attr("href").unwrap_or("")),
        description: text_of(RESULT_DESCRIPTION),
        language: text_of(RESULT_LANGUAGE),
        last_updated: resolve(item, RESULT_UPDATED, Presence::Any)
            .map(time_value)
            .unwrap_or_default(),
        stars: resolve(item, RESULT_STARS, Presence::Any).map(star_count),
    })
}

/// Absolute form of a result link; site-relative paths resolve against github.com.
fn github_url(href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", GITHUB_ORIGIN, href)
    } else {
        href.to_string()
    }
}

fn time_value(el: ElementRef<'_>) -> String {
    el.value()
        .attr("title")
        .filter(|t| !t.is_empty())
        .or_else(|| el.value().attr("datetime").filter(|t| !t.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| element_text(el))
}

fn star_count(el: ElementRef<'_>) -> u64 {
    let mut text = element_text(el);
    if text.is_empty() {
        text = el.value().attr("aria-label").unwrap_or("").to_string();
    }
    if text.is_empty() {
        if let Some(link) = closest_ancestor(el, "a[href*=\"/stargazers\"]") {
            text = element_text(link);
        }
    }
    parse_count(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Frame, ScriptedPage, StaticPage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn fast() -> Options {
        Options {
            poll_interval: Duration::from_millis(10),
            stabilization: Duration::ZERO,
            ..Options::default()
        }
    }

    const REPO: &str = r##"<html><body>
        <h1><strong><a data-pjax="#repo-content-pjax-container" href="/octo/widgets">widgets</a></strong></h1>
        <p class="f4 my-3">  Tiny widgets
           for everyone </p>
        <a href="/octo/widgets/stargazers"><span id="repo-stars-counter-star">1.2k</span></a>
        <span id="repo-network-counter">87</span>
        <div class="react-directory-row">
          <svg class="octicon-file-directory-fill"></svg>
          <a class="Link--primary" href="/octo/widgets/tree/main/src">src</a>
          <relative-time datetime="2024-05-01T10:00:00Z">last week</relative-time>
        </div>
        <div class="react-directory-row">
          <a href="/octo/widgets/blob/main/Cargo.toml" title="Cargo.toml"></a>
        </div>
        <div class="react-directory-row"><span>no link</span></div>
        <div class="BorderGrid-row"><div class="ml-3">
          <span class="Progress"></span>
          <div class="d-flex"><span class="text-mono">Rust 92.5%</span></div>
          <div class="d-flex"><span class="text-mono">Shell</span></div>
        </div></div>
        <article class="markdown-body entry-content container-lg">
          Widgets
          A crate.
        </article>
    </body></html>"##;

    #[tokio::test(start_paused = true)]
    async fn reads_repository_page() {
        let page = ScriptedPage::new("https://github.com/octo/widgets", vec![Frame::Html(REPO.to_string())]);
        let params = RepositoryParams {
            include_files: true,
            include_languages: true,
            include_readme: true,
            ..RepositoryParams::default()
        };
        let doc = serde_json::to_value(extract_repository(&page, &params, &fast()).await).unwrap();

        assert_eq!(
            doc["repository"],
            json!({
                "url": "https://github.com/octo/widgets",
                "name": "octo/widgets",
                "description": "Tiny widgets for everyone",
                "stars": 1200,
                "forks": 87,
            })
        );
        assert_eq!(
            doc["files"],
            json!([
                {
                    "name": "src",
                    "type": "directory",
                    "url": "https://github.com/octo/widgets/tree/main/src",
                    "lastModified": "2024-05-01T10:00:00Z",
                },
                {
                    "name": "Cargo.toml",
                    "type": "file",
                    "url": "https://github.com/octo/widgets/blob/main/Cargo.toml",
                    "lastModified": null,
                },
            ])
        );
        assert_eq!(
            doc["languages"],
            json!([
                {"name": "Rust", "percentage": "92.5%"},
                {"name": "Shell", "percentage": "unknown"},
            ])
        );
        assert!(doc["readme"].as_str().unwrap().starts_with("Widgets"));
        assert!(page.actions().contains(&"click .BorderGrid-row .ml-3 .Progress".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_sections_are_off_by_default() {
        let page = ScriptedPage::new("https://github.com/octo/widgets", vec![Frame::Html(REPO.to_string())]);
        let result = extract_repository(&page, &RepositoryParams::default(), &fast())
            .await
            .success()
            .unwrap();
        assert!(result.files.is_empty());
        assert!(result.languages.is_empty());
        assert_eq!(result.readme, "");
        assert!(page.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn name_falls_back_to_url_path() {
        let page = StaticPage::new("https://github.com/rust-lang/cargo/tree/master", "<div></div>");
        let result = extract_repository(&page, &RepositoryParams::default(), &fast())
            .await
            .success()
            .unwrap();
        assert_eq!(result.repository.name.as_deref(), Some("rust-lang/cargo"));
        assert_eq!(result.repository.stars, None);
    }

    #[tokio::test(start_paused = true)]
    async fn readme_link_is_followed_then_placeholder() {
        let listing = r#"<a href="/o/r/blob/main/README.md">README.md</a>"#;
        let rendered = r##"<div id="readme"><div class="Box-body">Hello readme</div></div>"##;

        let page = ScriptedPage::new(
            "https://github.com/o/r",
            vec![
                Frame::Html(listing.to_string()),
                Frame::Html(listing.to_string()),
                Frame::Html(rendered.to_string()),
            ],
        );
        let params = RepositoryParams {
            include_readme: true,
            ..RepositoryParams::default()
        };
        let result = extract_repository(&page, &params, &fast()).await.success().unwrap();
        assert_eq!(result.readme, "Hello readme");
        assert_eq!(page.actions(), vec![format!("click {}", README_LINK)]);

        let stuck = StaticPage::new("https://github.com/o/r", listing);
        let result = extract_repository(&stuck, &params, &fast()).await.success().unwrap();
        assert_eq!(result.readme, README_PLACEHOLDER);
    }

    #[test]
    fn readme_is_capped() {
        let long = "x".repeat(5000);
        let snap = Snapshot::parse(
            "https://github.com/o/r",
            &format!(r#"<article itemprop="text">{}</article>"#, long),
        );
        assert_eq!(readme_body(&snap).unwrap().chars().count(), README_LIMIT);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_failure_is_repository_error() {
        let page = ScriptedPage::new("https://github.com/o/r", vec![Frame::Fault("navigation aborted".to_string())]);
        let doc = serde_json::to_value(extract_repository(&page, &RepositoryParams::default(), &fast()).await).unwrap();
        assert_eq!(doc["error"], json!("Snapshot: navigation aborted"));
        assert_eq!(doc["repository"], json!({"url": "https://github.com/o/r"}));
    }

    const SEARCH: &str = r#"<html><body>
        <nav><a class="UnderlineNav-item selected" href="/search?q=x&amp;type=repositories">Repositories</a></nav>
        <div class="repo-list-item">
          <h3><a href="/tokio-rs/tokio">tokio-rs/tokio</a></h3>
          <p class="mb-1">A runtime for writing reliable asynchronous applications</p>
          <span itemprop="programmingLanguage">Rust</span>
          <a href="/tokio-rs/tokio/stargazers">27.3k</a>
          <relative-time datetime="2024-06-01T00:00:00Z">Jun 1</relative-time>
        </div>
        <div class="repo-list-item">
          <h3><a href="https://github.com/async-rs/async-std">async-rs/async-std</a></h3>
          <span title="Updated 3 days ago">3 days ago</span>
        </div>
        <div class="repo-list-item"><p>sponsored</p></div>
    </body></html>"#;

    #[tokio::test(start_paused = true)]
    async fn reads_search_results() {
        let page = ScriptedPage::new("https://github.com/search?q=async", vec![Frame::Html(SEARCH.to_string())]);
        let params = SearchParams {
            query: "async".to_string(),
            ..SearchParams::default()
        };
        let doc = serde_json::to_value(extract_search(&page, &params, &fast()).await).unwrap();
        assert_eq!(doc["query"], json!("async"));
        assert_eq!(doc["language"], json!("all"));
        assert_eq!(doc["sort"], json!("best-match"));
        assert_eq!(doc["totalFound"], json!(2));
        assert_eq!(
            doc["results"],
            json!([
                {
                    "name": "tokio-rs/tokio",
                    "url": "https://github.com/tokio-rs/tokio",
                    "description": "A runtime for writing reliable asynchronous applications",
                    "language": "Rust",
                    "lastUpdated": "2024-06-01T00:00:00Z",
                    "stars": 27300,
                },
                {
                    "name": "async-rs/async-std",
                    "url": "https://github.com/async-rs/async-std",
                    "description": "",
                    "language": "",
                    "lastUpdated": "Updated 3 days ago",
                },
            ])
        );
        // the repositories tab is already selected
        assert!(page.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn max_results_limits_items() {
        let page = StaticPage::new("https://github.com/search?q=async", SEARCH);
        let params = SearchParams {
            max_results: 1,
            language: Some("rust".to_string()),
            ..SearchParams::default()
        };
        let result = extract_search(&page, &params, &fast()).await.success().unwrap();
        assert_eq!(result.total_found, 1);
        assert_eq!(result.language, "rust");
    }

    #[tokio::test(start_paused = true)]
    async fn search_failure_keeps_query() {
        let page = ScriptedPage::new("https://github.com/search?q=zig", vec![Frame::Fault("offline".to_string())]);
        let params = SearchParams {
            query: "zig".to_string(),
            ..SearchParams::default()
        };
        let doc = serde_json::to_value(extract_search(&page, &params, &fast()).await).unwrap();
        assert_eq!(doc["search"], json!({"url": "https://github.com/search?q=zig", "query": "zig"}));
    }

    #[test]
    fn parses_language_shares() {
        assert_eq!(
            language_share("TypeScript 12.25%"),
            LanguageShare {
                name: "TypeScript".to_string(),
                percentage: "12.25%".to_string()
            }
        );
    }
}
