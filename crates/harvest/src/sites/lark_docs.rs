// ABOUTME: Lark document extractor: content blocks, tables, images and comments of a wiki or docx page.
// ABOUTME: Blocks are deduplicated by text; mentions render as markdown links; UI imagery is filtered out.

use std::collections::HashSet;
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
    closest_ancestor, resolve, resolve_all, resolve_text, select, select_first, Presence,
};
use crate::engine::text::{element_text, normalize_whitespace, raw_text, strip_zero_width, word_count};
use crate::engine::types::serialize_instant;
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};
use crate::sites::{absolute, guarded, Site};

const LOADED_CONTENT: &str = ".page-block-content, .text-editor, .ace-line, .zone-container";
const LOADED_TITLE: &str = "h1.page-block-content, .page-block-content h1";

const TITLE: &[&str] = &[
    "h1.page-block-content .ace-line",
    ".breadcrumb-container-item__value",
    "#ssrHeaderTitle",
    ".note-title__input",
    "h1",
    ".page-block-content",
];
const UNTITLED: &str = "Untitled Document";

const LAST_MODIFIED: &[&str] = &[".note-title__time", "[data-testid=\"metaTime\"]", ".doc-info-time-item"];
const AUTHOR: &[&str] = &[".docs-info-avatar-name-text", ".note-avatar", ".editor-info"];

const CONTENT_ROOT: &str = ".page-block-children, .root-render-unit-container";
const TITLE_LINE: &str = "h1.page-block-content .ace-line";
const BLOCKS: &str = ".block[data-block-type]:not([data-block-type=\"page\"])";
const LINE: &str = ".ace-line";
const LINE_PIECES: &str = "span[data-string=\"true\"]";
const MENTION: &str = ".mention-doc-embed-container";

const TABLES: &[&str] = &["table", ".docx-table-block", "[data-block-type=\"table\"]", ".table-block"];

const IMAGE_ROOT: &str = ".page-block-children, .editor-container";
const IMAGE_CHROME: &str = ".navigation-bar, .sidebar, .header, .avatar, .icon, .docs-info, .note-avatar";
const IMAGE_SRC_SKIP: &[&str] = &["data:image", "avatar", "static-resource"];
const IMAGE_FRAME: &str = "figure, .image-block, .image-container";
const CAPTIONS: &[&str] = &[".image-caption", ".caption", "figcaption"];

const COMMENTS: &[&str] = &[".comment-item", ".docx-comment", "[data-testid*=\"comment\"]"];

static DOCUMENT_ID: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"wiki/([a-zA-Z0-9]+)", r"docx/([a-zA-Z0-9]+)", r"/([a-zA-Z0-9]{17,})"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

/// Parameters accepted by the Lark extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LarkParams {
    pub include_tables: bool,
    pub include_images: bool,
    pub include_comments: bool,
    pub max_blocks: usize,
    /// Milliseconds.
    pub wait_for_load: u64,
}

impl Default for LarkParams {
    fn default() -> Self {
        Self {
            include_tables: true,
            include_images: false,
            include_comments: false,
            max_blocks: 200,
            wait_for_load: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LarkDocument {
    pub url: String,
    pub title: String,
    pub id: Option<String>,
    pub last_modified: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub tag_name: String,
    pub class_name: String,
    pub block_type: String,
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    pub index: usize,
    /// The block's `data-block-type`, or `title` / `mention`.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub metadata: BlockMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub index: usize,
    pub is_header: bool,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub index: usize,
    pub rows: Vec<TableRow>,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub index: usize,
    pub src: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub index: usize,
    pub author: String,
    pub text: String,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LarkMetadata {
    pub total_blocks: usize,
    pub total_tables: usize,
    pub total_images: usize,
    pub total_comments: usize,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LarkExtraction {
    pub document: LarkDocument,
    pub content: Vec<ContentBlock>,
    pub tables: Vec<Table>,
    pub images: Vec<Image>,
    pub comments: Vec<Comment>,
    pub metadata: LarkMetadata,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts an open Lark wiki or docx page.
pub async fn extract<P>(source: &P, params: &LarkParams, opts: &Options) -> Envelope<LarkExtraction>
where
    P: PageSource + ?Sized,
{
    let boundary = ErrorBoundary::open(Site::LarkDocs.envelope_key(), source.url());
    guarded(Site::LarkDocs, boundary, stages(source, params, opts)).await
}

async fn stages<P>(source: &P, params: &LarkParams, opts: &Options) -> Result<LarkExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    ReadinessPoller::with_options(Duration::from_millis(params.wait_for_load), opts)
        .wait(source, is_ready)
        .await;
    opts.pacing.pause().await;

    let snap = source.snapshot().await?;
    let content = content_blocks(&snap, params.max_blocks);
    let tables = if params.include_tables {
        tables(&snap)
    } else {
        Vec::new()
    };
    let images = if params.include_images {
        images(&snap)
    } else {
        Vec::new()
    };
    let comments = if params.include_comments {
        comments(&snap)
    } else {
        Vec::new()
    };
    let words: usize = content.iter().map(|b| word_count(&b.content)).sum();
    info!(
        blocks = content.len(),
        tables = tables.len(),
        images = images.len(),
        comments = comments.len(),
        "document read"
    );

    Ok(LarkExtraction {
        document: document_info(&snap),
        metadata: LarkMetadata {
            total_blocks: content.len(),
            total_tables: tables.len(),
            total_images: images.len(),
            total_comments: comments.len(),
            word_count: words,
        },
        content,
        tables,
        images,
        comments,
        extracted_at: Utc::now(),
    })
}

fn is_ready(snap: &Snapshot) -> bool {
    select_first(snap.root(), LOADED_CONTENT).is_some()
        && select_first(snap.root(), LOADED_TITLE).is_some()
}

fn document_info(snap: &Snapshot) -> LarkDocument {
    let root = snap.root();
    LarkDocument {
        url: snap.url().to_string(),
        title: resolve_text(root, TITLE)
            .or_else(|| snap.title())
            .unwrap_or_else(|| UNTITLED.to_string()),
        id: document_id(snap.url()),
        last_modified: resolve_text(root, LAST_MODIFIED),
        author: author(root),
    }
}

pub fn document_id(url: &str) -> Option<String> {
    DOCUMENT_ID
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| c[1].to_string())
}

fn author(root: ElementRef<'_>) -> Option<String> {
    AUTHOR.iter().find_map(|css| {
        let el = select_first(root, css)?;
        let text = element_text(el);
        if !text.is_empty() {
            return Some(text);
        }
        el.value()
            .attr("title")
            .map(normalize_whitespace)
            .filter(|t| !t.is_empty())
    })
}

/// Text of an editor line: its string pieces joined by spaces, else its whole text.
fn line_text(line: ElementRef<'_>) -> String {
    let pieces: Vec<String> = select(line, LINE_PIECES)
        .into_iter()
        .map(|span| strip_zero_width(&raw_text(span)))
        .filter(|t| !t.trim().is_empty())
        .collect();
    if pieces.is_empty() {
        element_text(line)
    } else {
        normalize_whitespace(&pieces.join(" "))
    }
}

/// The title line, then up to `max_blocks` typed blocks. Repeated text is emitted once.
fn content_blocks(snap: &Snapshot, max_blocks: usize) -> Vec<ContentBlock> {
    let root = snap.root();
    let container = match select_first(root, CONTENT_ROOT) {
        Some(c) => c,
        None => {
            debug!("no content container found");
            return Vec::new();
        }
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut blocks: Vec<ContentBlock> = Vec::new();

    if let Some(line) = select_first(root, TITLE_LINE) {
        let text = line_text(line);
        if !text.is_empty() && seen.insert(text.clone()) {
            blocks.push(ContentBlock {
                index: 0,
                kind: "title".to_string(),
                content: text,
                metadata: BlockMetadata {
                    tag_name: "h1".to_string(),
                    class_name: "title".to_string(),
                    block_type: "title".to_string(),
                    block_id: Some("title".to_string()),
                },
            });
        }
    }

    let elements = select(container, BLOCKS);
    debug!(blocks = elements.len(), "content blocks found");
    for block in elements.into_iter().take(max_blocks) {
        let block_type = block.value().attr("data-block-type").unwrap_or("").to_string();
        let (kind, text) = match block_content(snap, block, &block_type) {
            Some(found) => found,
            None => continue,
        };
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }
        blocks.push(ContentBlock {
            index: blocks.len(),
            kind,
            content: text,
            metadata: BlockMetadata {
                tag_name: block.value().name().to_ascii_lowercase(),
                class_name: block.value().attr("class").unwrap_or("").to_string(),
                block_type,
                block_id: block.value().attr("data-block-id").map(str::to_string),
            },
        });
    }
    blocks
}

/// Type and text of one block, read from its first editor line. A text line
/// holding a document mention becomes a `mention` rendered as `[label](url)`.
fn block_content(snap: &Snapshot, block: ElementRef<'_>, block_type: &str) -> Option<(String, String)> {
    let line = select_first(block, LINE)?;
    let text = line_text(line);
    if block_type == "text" {
        if let Some(mention) = select_first(line, MENTION) {
            if let Some(link) = select_first(mention, "a") {
                let label = element_text(link);
                let url = link
                    .value()
                    .attr("href")
                    .map(|h| absolute(snap, h))
                    .unwrap_or_default();
                return Some(("mention".to_string(), format!("[{}]({})", label, url)));
            }
            return Some(("mention".to_string(), text));
        }
    }
    Some((block_type.to_string(), text))
}

fn tables(snap: &Snapshot) -> Vec<Table> {
    resolve_all(snap.root(), TABLES)
        .into_iter()
        .enumerate()
        .filter_map(|(index, table)| {
            let rows: Vec<TableRow> = select(table, "tr")
                .into_iter()
                .enumerate()
                .map(|(i, row)| TableRow {
                    index: i,
                    is_header: i == 0 || select_first(row, "th").is_some(),
                    cells: select(row, "td, th").into_iter().map(element_text).collect(),
                })
                .collect();
            if rows.is_empty() {
                return None;
            }
            Some(Table {
                index,
                row_count: rows.len(),
                column_count: rows.iter().map(|r| r.cells.len()).max().unwrap_or(0),
                rows,
            })
        })
        .collect()
}

fn images(snap: &Snapshot) -> Vec<Image> {
    let area = match select_first(snap.root(), IMAGE_ROOT) {
        Some(a) => a,
        None => return Vec::new(),
    };
    let mut found: Vec<Image> = Vec::new();
    for img in select(area, "img[src]") {
        let src = match img.value().attr("src").map(|s| absolute(snap, s)) {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        if IMAGE_SRC_SKIP.iter().any(|skip| src.contains(skip))
            || closest_ancestor(img, IMAGE_CHROME).is_some()
        {
            debug!(src = %src, "skipping interface image");
            continue;
        }
        found.push(Image {
            index: found.len(),
            alt: img.value().attr("alt").unwrap_or("").to_string(),
            width: dimension(img, "width"),
            height: dimension(img, "height"),
            caption: caption(img),
            src,
        });
    }
    found
}

fn dimension(img: ElementRef<'_>, attr: &str) -> Option<u32> {
    let raw = img.value().attr(attr)?.trim();
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn caption(img: ElementRef<'_>) -> Option<String> {
    let frame = closest_ancestor(img, IMAGE_FRAME)?;
    resolve(frame, CAPTIONS, Presence::Any).map(element_text)
}

fn comments(snap: &Snapshot) -> Vec<Comment> {
    resolve_all(snap.root(), COMMENTS)
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let part = |css: &str| {
                select_first(item, css)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
            };
            let text = part(".comment-text, .content")?;
            Some(Comment {
                index,
                author: part(".comment-author, .author").unwrap_or_else(|| "Unknown".to_string()),
                text,
                timestamp: part(".comment-time, .time"),
            })
        })
        .collect()
}
