// ABOUTME: Main library entry point for the page-harvest structured extraction engine.
// ABOUTME: Re-exports the public API: Engine, EngineBuilder, Site, PageSource, ExtractError, Options.

//! Page Harvest - resilient structured extraction from rendered web pages.
//!
//! The engine reads a page through a [`PageSource`], waits for it to render,
//! resolves elements through ordered fallback selectors, and returns exactly
//! one JSON envelope per run: the site's success document, or
//! `{ error, <domain>: {...}, extractedAt }`.
//!
//! # Example
//!
//! ```no_run
//! use page_harvest::{Engine, Site, StaticPage};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::builder().build();
//!     let page = StaticPage::new("https://github.com/rust-lang/rust", "<html>...</html>");
//!     let doc = engine
//!         .harvest(Site::GithubRepo, &page, &json!({"includeReadme": true}))
//!         .await;
//!     println!("{}", doc);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod options;
pub mod page;
pub mod sites;

use serde_json::Value as JsonValue;
use url::Url;

pub use crate::engine::{Envelope, ErrorBoundary, ExtractionError, Pacing, Readiness, ReadinessPoller};
pub use crate::error::{ErrorCode, ExtractError};
pub use crate::options::{EngineBuilder, Options};
pub use crate::page::fetch::{build_http_client, FetchOptions};
pub use crate::page::{Frame, HttpPage, PageSource, ScriptedPage, Snapshot, StaticPage};
pub use crate::sites::{Site, UnknownSite};

/// Runs site extractors with one set of engine-wide options.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    opts: Options,
}

impl Engine {
    /// Create a new EngineBuilder for configuring the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Runs `site` against `source`. Never fails: every outcome is an envelope.
    pub async fn harvest<P>(&self, site: Site, source: &P, params: &JsonValue) -> JsonValue
    where
        P: PageSource + ?Sized,
    {
        sites::run(site, source, params, &self.opts).await
    }

    /// A page read over HTTP with this engine's client settings.
    pub fn http_page(&self, url: &str) -> Result<HttpPage, ExtractError> {
        if url.is_empty() {
            return Err(ExtractError::invalid_url(url, "HttpPage", None));
        }
        if let Err(err) = Url::parse(url) {
            return Err(ExtractError::invalid_url(url, "HttpPage", Some(err.into())));
        }
        let client = build_http_client(&self.opts)?;
        let fetch_opts = FetchOptions {
            headers: self.opts.headers.clone(),
            allow_private_networks: self.opts.allow_private_networks,
        };
        Ok(HttpPage::new(url, client, fetch_opts))
    }

    /// Fetches `url` over HTTP and runs `site`, or the site detected from the
    /// address when `site` is `None`.
    pub async fn harvest_url(
        &self,
        site: Option<Site>,
        url: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, ExtractError> {
        let site = match site.or_else(|| Site::detect(url)) {
            Some(site) => site,
            None => {
                return Err(ExtractError::config(
                    url,
                    "DetectSite",
                    Some(anyhow::anyhow!("no extractor handles this address")),
                ))
            }
        };
        let page = self.http_page(url)?;
        Ok(self.harvest(site, &page, params).await)
    }
}
