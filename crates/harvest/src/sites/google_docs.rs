// ABOUTME: Google Docs extractor: document blocks from the canvas renderer, paragraph renderers, or plain text.
// ABOUTME: Block types come from keyword, list-marker and indentation heuristics; formatting is optional.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::pipeline::{Envelope, ErrorBoundary};
use crate::engine::poller::ReadinessPoller;
use crate::engine::resolver::{
    closest_ancestor, resolve, resolve_all, resolve_value, select, Locator, Presence,
};
use crate::engine::text::{element_text, leading_float, normalize_whitespace, word_count};
use crate::engine::types::serialize_instant;
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};
use crate::sites::{guarded, Site};

const CONTAINERS: &[&str] = &[
    ".kix-appview-editor",
    "[role=\"textbox\"]",
    ".docs-texteventtarget-iframe",
    ".kix-page-paginated",
];

const CANVAS_PARAGRAPHS: &str = "g[data-section-type=\"body\"][role=\"paragraph\"]";
const CANVAS_TEXT: &str = "rect[aria-label]";
const CANVAS_FONT: &str = "rect[data-font-css]";

const PARAGRAPHS: &[&str] = &[
    ".kix-paragraphrenderer",
    "[role=\"paragraph\"]",
    ".kix-lineview-text-block",
];

const UNTITLED: &str = "Untitled Document";
const TITLE_SUFFIX: &str = " - Google Docs";

/// Horizontal offset past which a canvas paragraph reads as a block quote.
const QUOTE_OFFSET: f64 = 120.0;
/// Left margin, in pixels, past which a rendered paragraph reads as a block quote.
const QUOTE_MARGIN: f64 = 40.0;

static HEADING_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Deployment|Frontend|Backend|Introduction|Conclusion)").expect("valid regex")
});
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-•*]\s+").expect("valid regex"));
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s+").expect("valid regex"));
static SHORT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w[.)]\s").expect("valid regex"));
static MATRIX_X: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"matrix\([^,]+,[^,]+,[^,]+,[^,]+,\s*(\d+)").expect("valid regex")
});
static FONT_CSS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\d+)\s+([\d.]+)px\s+"([^"]+)""#).expect("valid regex"));
static DOCUMENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/document/d/([a-zA-Z0-9_-]+)").expect("valid regex"));

/// Parameters accepted by the Google Docs extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocsParams {
    pub max_blocks: usize,
    pub include_formatting: bool,
    pub include_structure: bool,
    /// Milliseconds.
    pub wait_for_load: u64,
}

impl Default for DocsParams {
    fn default() -> Self {
        Self {
            max_blocks: 100,
            include_formatting: false,
            include_structure: true,
            wait_for_load: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Heading1,
    Heading2,
    Heading3,
    ListItem,
    Quote,
    Paragraph,
}

/// Visual formatting of a block. Unknown properties stay `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Formatting {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font_size: Option<String>,
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: BlockType,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatting: Option<Formatting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub url: String,
    pub title: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsMetadata {
    pub total_blocks: usize,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsExtraction {
    pub document: DocumentInfo,
    pub content: Vec<Block>,
    pub metadata: DocsMetadata,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts the blocks of an open Google Docs document.
pub async fn extract<P>(source: &P, params: &DocsParams, opts: &Options) -> Envelope<DocsExtraction>
where
    P: PageSource + ?Sized,
{
    let boundary = ErrorBoundary::open(Site::GoogleDocs.envelope_key(), source.url());
    guarded(Site::GoogleDocs, boundary, stages(source, params, opts)).await
}

async fn stages<P>(source: &P, params: &DocsParams, opts: &Options) -> Result<DocsExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    ReadinessPoller::with_options(Duration::from_millis(params.wait_for_load), opts)
        .wait(source, is_ready)
        .await;
    opts.pacing.pause().await;

    let snap = source.snapshot().await?;
    let content = blocks(&snap, params);
    let words: usize = content.iter().map(|b| word_count(&b.text)).sum();
    info!(blocks = content.len(), words, "document read");

    Ok(DocsExtraction {
        document: DocumentInfo {
            url: snap.url().to_string(),
            title: title(&snap),
            id: document_id(snap.url()),
        },
        metadata: DocsMetadata {
            total_blocks: content.len(),
            word_count: words,
        },
        content,
        extracted_at: Utc::now(),
    })
}

fn is_ready(snap: &Snapshot) -> bool {
    match resolve(snap.root(), CONTAINERS, Presence::Any) {
        Some(container) => {
            !select(container, CANVAS_TEXT).is_empty() || !element_text(container).is_empty()
        }
        None => false,
    }
}

fn title(snap: &Snapshot) -> String {
    let locators = [
        Locator::attr(".docs-title-input", "value"),
        Locator::css(".docs-title-input-label-inner"),
    ];
    if let Some(t) = resolve_value(snap.root(), &locators) {
        return t;
    }
    snap.title()
        .map(|t| t.trim_end_matches(TITLE_SUFFIX).trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

pub fn document_id(url: &str) -> Option<String> {
    DOCUMENT_ID.captures(url).map(|c| c[1].to_string())
}

/// Canvas blocks when the canvas renderer is in use, else rendered paragraphs,
/// else the container's whole text as one paragraph.
fn blocks(snap: &Snapshot, params: &DocsParams) -> Vec<Block> {
    let container = match resolve(snap.root(), CONTAINERS, Presence::Any) {
        Some(c) => c,
        None => {
            debug!("no document container found");
            return Vec::new();
        }
    };

    let canvas = canvas_blocks(container, params);
    if !canvas.is_empty() {
        return canvas;
    }
    let rendered = paragraph_blocks(container, params);
    if !rendered.is_empty() {
        return rendered;
    }
    let text = element_text(container);
    if text.is_empty() {
        return Vec::new();
    }
    vec![Block {
        index: 0,
        kind: BlockType::Paragraph,
        text,
        formatting: None,
    }]
}

fn canvas_blocks(container: ElementRef<'_>, params: &DocsParams) -> Vec<Block> {
    let groups = select(container, CANVAS_PARAGRAPHS);
    debug!(groups = groups.len(), "canvas paragraphs found");
    groups
        .into_iter()
        .take(params.max_blocks)
        .enumerate()
        .filter_map(|(index, group)| {
            let parts: Vec<String> = select(group, CANVAS_TEXT)
                .into_iter()
                .filter_map(|rect| rect.value().attr("aria-label"))
                .map(normalize_whitespace)
                .filter(|t| !t.is_empty())
                .collect();
            if parts.is_empty() {
                return None;
            }
            let text = parts.join(" ");
            Some(Block {
                index,
                kind: if params.include_structure {
                    canvas_block_type(group, &text)
                } else {
                    BlockType::Paragraph
                },
                formatting: params.include_formatting.then(|| canvas_formatting(group)),
                text,
            })
        })
        .collect()
}

fn canvas_block_type(group: ElementRef<'_>, text: &str) -> BlockType {
    if HEADING_WORDS.is_match(text) {
        return BlockType::Heading1;
    }
    if BULLET.is_match(text) || NUMBERED.is_match(text) {
        return BlockType::ListItem;
    }
    let offset = group
        .value()
        .attr("transform")
        .and_then(|t| MATRIX_X.captures(t))
        .and_then(|c| c[1].parse::<f64>().ok());
    match offset {
        Some(x) if x > QUOTE_OFFSET => BlockType::Quote,
        _ => BlockType::Paragraph,
    }
}

/// Weight, size and family from the first `data-font-css` value, such as `700 14.6667px "Arial"`.
fn canvas_formatting(group: ElementRef<'_>) -> Formatting {
    let mut formatting = Formatting::default();
    let css = select(group, CANVAS_FONT)
        .into_iter()
        .next()
        .and_then(|rect| rect.value().attr("data-font-css"));
    if let Some(caps) = css.and_then(|c| FONT_CSS.captures(c)) {
        let weight: u32 = caps[1].parse().unwrap_or(400);
        formatting.bold = weight >= 700;
        formatting.font_size = caps[2]
            .parse::<f64>()
            .ok()
            .map(|size| format!("{}px", size));
        formatting.font_family = Some(caps[3].to_string());
    }
    formatting
}

fn paragraph_blocks(container: ElementRef<'_>, params: &DocsParams) -> Vec<Block> {
    let paragraphs = resolve_all(container, PARAGRAPHS);
    debug!(paragraphs = paragraphs.len(), "rendered paragraphs found");
    paragraphs
        .into_iter()
        .take(params.max_blocks)
        .enumerate()
        .filter_map(|(index, para)| {
            let text = element_text(para);
            if text.is_empty() {
                return None;
            }
            let style = InlineStyle::effective(para);
            Some(Block {
                index,
                kind: if params.include_structure {
                    paragraph_block_type(para, &text, &style)
                } else {
                    BlockType::Paragraph
                },
                formatting: params.include_formatting.then(|| style.formatting()),
                text,
            })
        })
        .collect()
}

fn paragraph_block_type(para: ElementRef<'_>, text: &str, style: &InlineStyle) -> BlockType {
    let size = style.px("font-size").unwrap_or(0.0);
    if size > 20.0 || style.is_bold() {
        return BlockType::Heading1;
    }
    if size > 16.0 {
        return BlockType::Heading2;
    }
    if size > 14.0 {
        return BlockType::Heading3;
    }
    if closest_ancestor(para, "ul, ol").is_some() || SHORT_MARKER.is_match(text) {
        return BlockType::ListItem;
    }
    if style.px("margin-left").unwrap_or(0.0) > QUOTE_MARGIN {
        return BlockType::Quote;
    }
    BlockType::Paragraph
}

/// Declarations from `style` attributes. The element's own declarations win;
/// properties it lacks are taken from its first styled descendant.
#[derive(Debug, Clone, Default, PartialEq)]
struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    fn parse(style: &str) -> Self {
        let declarations = style
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        Self { declarations }
    }

    fn effective(el: ElementRef<'_>) -> Self {
        let mut style = Self::parse(el.value().attr("style").unwrap_or(""));
        let inner = select(el, "[style]").into_iter().next();
        if let Some(inner) = inner {
            for (k, v) in Self::parse(inner.value().attr("style").unwrap_or("")).declarations {
                if style.get(&k).is_none() {
                    style.declarations.push((k, v));
                }
            }
        }
        style
    }

    fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }

    fn px(&self, property: &str) -> Option<f64> {
        self.get(property).and_then(leading_float)
    }

    fn is_bold(&self) -> bool {
        match self.get("font-weight") {
            Some(w) if w.eq_ignore_ascii_case("bold") || w.eq_ignore_ascii_case("bolder") => true,
            Some(w) => w.parse::<u32>().map(|n| n >= 700).unwrap_or(false),
            None => false,
        }
    }

    fn formatting(&self) -> Formatting {
        let owned = |p: &str| self.get(p).map(str::to_string);
        Formatting {
            bold: self.is_bold(),
            italic: self
                .get("font-style")
                .map(|s| s.eq_ignore_ascii_case("italic"))
                .unwrap_or(false),
            underline: self
                .get("text-decoration")
                .or_else(|| self.get("text-decoration-line"))
                .map(|s| s.contains("underline"))
                .unwrap_or(false),
            font_size: owned("font-size"),
            font_family: owned("font-family"),
            font_weight: owned("font-weight"),
            font_style: owned("font-style"),
            text_align: owned("text-align"),
            color: owned("color"),
        }
    }
}
