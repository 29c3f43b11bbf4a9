// ABOUTME: The page capability the engine reads from: PageSource trait, Snapshot, and in-memory sources.
// ABOUTME: Every snapshot re-reads the page; the engine never owns or mutates page state.

//! Page access.
//!
//! A page is an external, shared, read-mostly resource. The engine only ever
//! asks a [`PageSource`] for its address, for a fresh [`Snapshot`] of what is
//! currently rendered, and (rarely) to scroll or click so that lazily rendered
//! content appears.
//!
//! Submodules:
//! - `fetch`: [`HttpPage`], a source backed by plain HTTP fetches.

pub mod fetch;

use std::cell::{Cell, RefCell};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ExtractError;

pub use crate::page::fetch::HttpPage;

/// One parsed view of a page at a point in time.
#[derive(Debug)]
pub struct Snapshot {
    url: String,
    html: Html,
}

impl Snapshot {
    /// Parse `html` as the rendered state of the page at `url`.
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(html),
        }
    }

    /// The page address this snapshot was taken from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The page address parsed as a URL, when it is absolute.
    pub fn base_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }

    /// Scope for document-level queries.
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// The parsed document.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// The document `<title>`, trimmed; `None` when absent or blank.
    pub fn title(&self) -> Option<String> {
        let sel = Selector::parse("title").ok()?;
        let title = self.html.select(&sel).next()?;
        let text = title.text().collect::<String>();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Read access to a live page.
///
/// Implementations are used from a single task; nothing here needs to be `Send`.
#[async_trait(?Send)]
pub trait PageSource {
    /// The page's address. Must not fail so that error envelopes can always report it.
    fn url(&self) -> String;

    /// Take a fresh snapshot of the page's current rendered state.
    async fn snapshot(&self) -> Result<Snapshot, ExtractError>;

    /// Bring the first element matching `css` into view so lazy sections render.
    async fn scroll_into_view(&self, _css: &str) -> Result<(), ExtractError> {
        Ok(())
    }

    /// Dispatch a click on the first element matching `css`.
    async fn click(&self, _css: &str) -> Result<(), ExtractError> {
        Ok(())
    }
}

/// A page whose content never changes.
#[derive(Debug, Clone)]
pub struct StaticPage {
    url: String,
    html: String,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

#[async_trait(?Send)]
impl PageSource for StaticPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn snapshot(&self) -> Result<Snapshot, ExtractError> {
        Ok(Snapshot::parse(&self.url, &self.html))
    }
}

/// One step of a [`ScriptedPage`].
#[derive(Debug, Clone)]
pub enum Frame {
    /// The page renders this markup.
    Html(String),
    /// Reading the page fails with this message.
    Fault(String),
}

/// A page that renders a fixed sequence of frames, one per snapshot.
///
/// After the last frame the page stays on it. Scrolls and clicks are recorded
/// so callers can assert on the side effects an extractor performed.
#[derive(Debug)]
pub struct ScriptedPage {
    url: String,
    frames: Vec<Frame>,
    cursor: Cell<usize>,
    actions: RefCell<Vec<String>>,
}

impl ScriptedPage {
    pub fn new(url: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            url: url.into(),
            frames,
            cursor: Cell::new(0),
            actions: RefCell::new(Vec::new()),
        }
    }

    /// Number of snapshots taken so far.
    pub fn snapshots_taken(&self) -> usize {
        self.cursor.get()
    }

    /// Side effects requested so far, formatted as `scroll <css>` / `click <css>`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PageSource for ScriptedPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn snapshot(&self) -> Result<Snapshot, ExtractError> {
        let taken = self.cursor.get();
        self.cursor.set(taken + 1);
        let frame = match self.frames.get(taken).or_else(|| self.frames.last()) {
            Some(frame) => frame,
            None => {
                return Err(ExtractError::page(
                    &self.url,
                    "Snapshot",
                    Some(anyhow::anyhow!("page has no content")),
                ))
            }
        };
        match frame {
            Frame::Html(html) => Ok(Snapshot::parse(&self.url, html)),
            Frame::Fault(msg) => Err(ExtractError::page(
                &self.url,
                "Snapshot",
                Some(anyhow::anyhow!("{}", msg)),
            )),
        }
    }

    async fn scroll_into_view(&self, css: &str) -> Result<(), ExtractError> {
        self.actions.borrow_mut().push(format!("scroll {}", css));
        Ok(())
    }

    async fn click(&self, css: &str) -> Result<(), ExtractError> {
        self.actions.borrow_mut().push(format!("click {}", css));
        Ok(())
    }
}
