// ABOUTME: Site extractors built on the engine, plus URL-based site detection and dispatch.
// ABOUTME: Every run takes a JSON parameter object and returns exactly one JSON envelope.

//! Site extractors.
//!
//! Each submodule pairs a parameter struct (camelCase JSON, every key
//! optional) with an `extract` function returning an [`Envelope`]. [`run`]
//! parses the parameters, dispatches, and serializes the envelope; invalid
//! parameters come back as an error envelope like any other failure.
//!
//! Submodules:
//! - `airtable`: grid views through the table pipeline
//! - `github`: repository pages and repository search results
//! - `google_docs`: document blocks from the canvas or paragraph renderers
//! - `lark_docs`: document blocks, tables, images and comments
//! - `linkedin`: member profiles and company pages

pub mod airtable;
pub mod github;
pub mod google_docs;
pub mod lark_docs;
pub mod linkedin;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::engine::coerce::CoerceContext;
use crate::engine::pipeline::{timestamp, Envelope, ErrorBoundary};
use crate::engine::poller::{Readiness, ReadinessPoller};
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};

/// Budget for content that renders in response to a click or scroll.
pub(crate) const SETTLE: Duration = Duration::from_millis(800);

/// The supported extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    Airtable,
    GithubRepo,
    GithubSearch,
    GoogleDocs,
    LarkDocs,
    LinkedinProfile,
    LinkedinCompany,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown site: {0}")]
pub struct UnknownSite(pub String);

impl Site {
    pub const ALL: [Site; 7] = [
        Site::Airtable,
        Site::GithubRepo,
        Site::GithubSearch,
        Site::GoogleDocs,
        Site::LarkDocs,
        Site::LinkedinProfile,
        Site::LinkedinCompany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Airtable => "airtable",
            Site::GithubRepo => "github_repo",
            Site::GithubSearch => "github_search",
            Site::GoogleDocs => "google_docs",
            Site::LarkDocs => "lark_docs",
            Site::LinkedinProfile => "linkedin_profile",
            Site::LinkedinCompany => "linkedin_company",
        }
    }

    /// Key under which this site's error envelope carries the page metadata.
    pub fn envelope_key(&self) -> &'static str {
        match self {
            Site::Airtable => "base",
            Site::GithubRepo => "repository",
            Site::GithubSearch => "search",
            Site::GoogleDocs | Site::LarkDocs => "document",
            Site::LinkedinProfile => "profile",
            Site::LinkedinCompany => "company",
        }
    }

    /// Picks the extractor for a page address from its host and path.
    pub fn detect(url: &str) -> Option<Site> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let path = parsed.path();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

        if on("airtable.com") {
            return Some(Site::Airtable);
        }
        if on("github.com") {
            if path.starts_with("/search") {
                return Some(Site::GithubSearch);
            }
            let segments = path.split('/').filter(|s| !s.is_empty()).count();
            return if segments >= 2 {
                Some(Site::GithubRepo)
            } else {
                None
            };
        }
        if host == "docs.google.com" && path.starts_with("/document/") {
            return Some(Site::GoogleDocs);
        }
        if on("larksuite.com") || on("feishu.cn") || on("larkoffice.com") {
            return Some(Site::LarkDocs);
        }
        if on("linkedin.com") {
            if path.starts_with("/in/") {
                return Some(Site::LinkedinProfile);
            }
            if ["/company/", "/showcase/", "/school/"]
                .iter()
                .any(|p| path.starts_with(p))
            {
                return Some(Site::LinkedinCompany);
            }
        }
        None
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = UnknownSite;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Site::ALL
            .iter()
            .copied()
            .find(|site| site.as_str() == wanted)
            .ok_or_else(|| UnknownSite(s.to_string()))
    }
}

/// Runs `site` against `source` and returns the envelope as JSON.
///
/// `params` may be `null` or an object; missing keys take their defaults.
pub async fn run<P>(site: Site, source: &P, params: &JsonValue, opts: &Options) -> JsonValue
where
    P: PageSource + ?Sized,
{
    let url = source.url();
    match site {
        Site::Airtable => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, airtable::extract(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::GithubRepo => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, github::extract_repository(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::GithubSearch => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, github::extract_search(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::GoogleDocs => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, google_docs::extract(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::LarkDocs => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, lark_docs::extract(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::LinkedinProfile => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, linkedin::extract_profile(source, &p, opts).await),
            Err(doc) => doc,
        },
        Site::LinkedinCompany => match parse_params(site, &url, params) {
            Ok(p) => to_json(site, &url, linkedin::extract_company(source, &p, opts).await),
            Err(doc) => doc,
        },
    }
}

/// Deserializes a parameter object, treating `null` as all defaults.
pub fn params_from_json<T>(params: &JsonValue) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone())
}

fn parse_params<T>(site: Site, url: &str, params: &JsonValue) -> Result<T, JsonValue>
where
    T: DeserializeOwned + Default,
{
    params_from_json(params).map_err(|err| {
        let err = ExtractError::config(url, "Params", Some(err.into()));
        failure_json(site, url, err)
    })
}

fn to_json<T: Serialize>(site: Site, url: &str, envelope: Envelope<T>) -> JsonValue {
    match serde_json::to_value(&envelope) {
        Ok(doc) => doc,
        Err(err) => failure_json(
            site,
            url,
            ExtractError::structure(url, "Serialize", Some(err.into())),
        ),
    }
}

fn failure_json(site: Site, url: &str, err: ExtractError) -> JsonValue {
    let envelope: Envelope<()> = ErrorBoundary::open(site.envelope_key(), url).close(Err(err));
    match envelope.failure() {
        Some(failure) => serde_json::to_value(&failure).unwrap_or_else(|_| {
            json!({
                "error": failure.error,
                "extractedAt": timestamp(&failure.extracted_at),
            })
        }),
        None => JsonValue::Null,
    }
}

/// Runs a site's stages inside an error boundary keyed for `site`.
pub(crate) async fn guarded<T, F>(site: Site, boundary: ErrorBoundary, stages: F) -> Envelope<T>
where
    F: Future<Output = Result<T, ExtractError>>,
{
    let span = info_span!("extract", site = site.as_str(), url = %boundary.url());
    boundary.guard("Extract", stages).instrument(span).await
}

/// Resolves `href` against the snapshot's address.
pub(crate) fn absolute(snap: &Snapshot, href: &str) -> String {
    CoerceContext::new(true, snap.base_url()).absolutize(href)
}

/// Clicks `css`; a failed click is logged and reported as `false`.
pub(crate) async fn try_click<P: PageSource + ?Sized>(source: &P, css: &str) -> bool {
    match source.click(css).await {
        Ok(()) => true,
        Err(err) => {
            debug!(css, error = %err, "click failed");
            false
        }
    }
}

/// Scrolls `css` into view; a failed scroll is logged and reported as `false`.
pub(crate) async fn try_scroll<P: PageSource + ?Sized>(source: &P, css: &str) -> bool {
    match source.scroll_into_view(css).await {
        Ok(()) => true,
        Err(err) => {
            debug!(css, error = %err, "scroll failed");
            false
        }
    }
}

/// Paces, then waits up to [`SETTLE`] for content a click or scroll should reveal.
pub(crate) async fn settle<P, F>(source: &P, opts: &Options, ready: F) -> Readiness
where
    P: PageSource + ?Sized,
    F: Fn(&Snapshot) -> bool,
{
    opts.pacing.pause().await;
    ReadinessPoller::with_options(SETTLE, opts).wait(source, ready).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_sites_from_urls() {
        let cases = [
            ("https://airtable.com/appAbc/tblXyz/viwQ", Some(Site::Airtable)),
            ("https://github.com/rust-lang/rust", Some(Site::GithubRepo)),
            ("https://github.com/search?q=x&type=repositories", Some(Site::GithubSearch)),
            ("https://github.com/rust-lang", None),
            ("https://docs.google.com/document/d/abc123/edit", Some(Site::GoogleDocs)),
            ("https://acme.larksuite.com/wiki/AbCdEf", Some(Site::LarkDocs)),
            ("https://www.linkedin.com/in/jane-doe/", Some(Site::LinkedinProfile)),
            ("https://www.linkedin.com/company/acme/", Some(Site::LinkedinCompany)),
            ("https://example.com/", None),
            ("not a url", None),
        ];
        for (url, expected) in cases {
            assert_eq!(Site::detect(url), expected, "{}", url);
        }
    }

    #[test]
    fn parses_snake_names() {
        assert_eq!("github_repo".parse::<Site>(), Ok(Site::GithubRepo));
        assert_eq!("Linkedin-Company".parse::<Site>(), Ok(Site::LinkedinCompany));
        assert!("myspace".parse::<Site>().is_err());
        for site in Site::ALL {
            assert_eq!(site.as_str().parse::<Site>(), Ok(site));
        }
    }

    #[test]
    fn null_params_take_defaults() {
        let p: airtable::TableParams = params_from_json(&JsonValue::Null).unwrap();
        assert_eq!(p, airtable::TableParams::default());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_params_become_error_envelope() {
        let page = StaticPage::new("https://github.com/a/b", "<h1>a/b</h1>");
        let doc = run(
            Site::GithubRepo,
            &page,
            &json!({"maxFiles": "lots"}),
            &Options::default(),
        )
        .await;
        let error = doc["error"].as_str().unwrap();
        assert!(error.starts_with("Params: "), "{}", error);
        assert_eq!(doc["repository"]["url"], json!("https://github.com/a/b"));
        assert!(doc["extractedAt"].is_string());
    }
}
