// ABOUTME: LinkedIn company page extractor: top card facts, recent updates, and employee listings.
// ABOUTME: With respectPrivacy set only an aggregate employee summary is emitted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::pipeline::{Envelope, ErrorBoundary};
use crate::engine::poller::ReadinessPoller;
use crate::engine::resolver::{resolve, resolve_all, select, select_first, Presence};
use crate::engine::text::{element_text, truncate_chars};
use crate::engine::types::serialize_instant;
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};
use crate::sites::{absolute, guarded, settle, try_scroll, Site};

const LOADED: &[&str] = &[
    ".org-top-card-summary__title",
    "h1[data-testid=\"company-name\"]",
    ".company-name",
    "h1",
];

const NAME: &[&str] = &[
    ".org-top-card-summary__title",
    "h1[data-testid=\"company-name\"]",
    ".company-name",
    "h1.text-heading-xlarge",
    ".org-top-card-primary-content__title h1",
    "[data-test=\"company-name\"]",
];
const INDUSTRY: &[&str] = &[
    ".org-top-card-summary__industry",
    "[data-testid=\"company-industry\"]",
    ".industry",
    ".org-top-card-summary-info-list__info-item:first-child",
];
const FOLLOWERS: &[&str] = &[".org-top-card-summary-info-list__info-item", ".org-top-card-summary__info-item"];
const SIZE: &[&str] = &[
    ".org-top-card-summary__info-item",
    "[data-testid=\"company-size\"]",
    ".company-size",
    "a[href*=\"search/results/people\"]",
];
const HEADQUARTERS: &[&str] = &[
    ".org-top-card-summary-info-list__info-item",
    ".org-about-company-module__company-details .text-md",
    "[data-testid=\"company-locations\"]",
    ".company-location",
];
/// Info items containing these read as something other than a place.
const HEADQUARTERS_EXCLUDE: &[&str] = &["http", "@", "employee", "followers", "software"];
const VERIFIED: &[&str] = &[
    "svg[data-test-icon=\"verified-medium\"]",
    "[data-testid=\"verified-badge\"]",
    ".verified-badge",
    ".org-top-card-summary__badge svg",
    "svg[aria-label=\"Verified\"]",
];

const UPDATES_SECTION: &str = ".org-company-posts, .company-updates, .feed-container";
const UPDATES: &[&str] = &[
    ".org-company-posts .feed-shared-update-v2",
    ".company-updates .update-item",
    "[data-testid=\"company-update\"]",
    ".feed-shared-update-v2",
    "article[data-urn*=\"activity\"]",
];
const UPDATE_CONTENT: &[&str] = &[
    ".feed-shared-text",
    ".update-content",
    ".feed-shared-inline-show-more-text",
    ".update-components-text",
    ".feed-shared-update-v2__description",
];
const UPDATE_CONTENT_MAX: usize = 500;
const UPDATE_TIME: &[&str] = &[
    "time",
    ".update-time",
    ".feed-shared-actor__sub-description time",
    ".update-components-actor__sub-description",
    "[data-testid=\"timestamp\"]",
];
const LIKES: &[&str] = &[
    ".social-details-social-counts__reactions-count",
    ".social-counts-reactions__count-value",
    ".like-count",
    ".social-detail-social-counts",
];
const COMMENTS: &[&str] = &[
    ".social-details-social-counts__comments button",
    ".social-counts-comments__count-value",
    ".comment-count",
];
const REPOSTS: &[&str] = &["[aria-label*=\"reposts\"]", ".social-counts-reposts__count-value", ".repost-count"];
const AUTHOR: &[&str] = &[
    ".update-components-actor__title span[dir=\"ltr\"] span[aria-hidden=\"true\"]",
    ".update-components-actor__title span span",
    ".update-components-actor__title",
    ".update-components-header a",
    ".feed-shared-actor__title",
];
const AUTHOR_NAME: &str = ".update-components-actor__title span[aria-hidden=\"true\"] span";
const AUTHOR_MAX: usize = 50;
const MEDIA_IMAGES: &str = ".update-components-image img, .feed-shared-image img";
const MEDIA_HOST: &str = "media.licdn.com";
const MEDIA_STATIC: &[&str] = &["static.licdn.com/aero-v1/sc/h/", "static.licdn.com/sc/h/"];

const PEOPLE_SECTION: &str = ".org-people, .company-employees";
const PEOPLE_CARDS: &str = ".org-people-profile-card, .employee-card";
const PEOPLE_TOTAL: &str = ".org-people-bar-graph-element__category";
const PEOPLE_NAME: &[&str] = &[
    ".org-people-profile-card__profile-title",
    ".employee-name",
    ".artdeco-entity-lockup__title",
];
const PEOPLE_TITLE: &[&str] = &[
    ".org-people-profile-card__profile-info",
    ".employee-title",
    ".artdeco-entity-lockup__subtitle",
];
const PRIVACY_NOTE: &str = "Limited data for privacy compliance";

static SIZE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+[KM]?\+?\s*employee").expect("valid regex"));
static COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:,\d+)*)").expect("valid regex"));
static AUTHOR_BADGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)following|influencer").expect("valid regex"));
static COMPANY_ID: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"/company/([^/?]+)", r"/showcase/([^/?]+)", r"/school/([^/?]+)"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyParams {
    pub include_employees: bool,
    pub include_updates: bool,
    pub max_updates: usize,
    pub max_employees: usize,
    /// Milliseconds.
    pub wait_for_load: u64,
    pub include_media: bool,
    pub respect_privacy: bool,
}

impl Default for CompanyParams {
    fn default() -> Self {
        Self {
            include_employees: false,
            include_updates: true,
            max_updates: 5,
            max_employees: 10,
            wait_for_load: 3000,
            include_media: false,
            respect_privacy: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<String>,
    pub followers: Option<String>,
    pub headquarters: Option<String>,
    pub verified: bool,
}

/// Counters as displayed, e.g. `1,204` or `3K`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub likes: String,
    pub comments: String,
    pub reposts: String,
}

impl Default for Engagement {
    fn default() -> Self {
        Self {
            likes: "0".to_string(),
            comments: "0".to_string(),
            reposts: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Article,
    Video,
    Repost,
    ImagePost,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Update {
    pub content: String,
    pub timestamp: Option<String>,
    pub engagement: Engagement,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub author: Option<String>,
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSummary {
    pub total_employees_visible: usize,
    pub total_employees_text: String,
    pub note: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub name: String,
    pub title: Option<String>,
    pub profile_url: Option<String>,
}

/// One entry of the `employees` list: an aggregate when privacy is respected,
/// otherwise a listed person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EmployeeEntry {
    Summary(EmployeeSummary),
    Person(Employee),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompanySections {
    pub updates: bool,
    pub employees: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMetadata {
    pub url: String,
    pub company_id: Option<String>,
    pub extracted_sections: CompanySections,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
    pub extraction_config: CompanyParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyExtraction {
    pub company: Company,
    pub employees: Vec<EmployeeEntry>,
    pub updates: Vec<Update>,
    pub metadata: CompanyMetadata,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts an open LinkedIn company, showcase, or school page.
pub async fn extract_company<P>(
    source: &P,
    params: &CompanyParams,
    opts: &Options,
) -> Envelope<CompanyExtraction>
where
    P: PageSource + ?Sized,
{
    let boundary = ErrorBoundary::open(Site::LinkedinCompany.envelope_key(), source.url());
    guarded(Site::LinkedinCompany, boundary, stages(source, params, opts)).await
}

async fn stages<P>(
    source: &P,
    params: &CompanyParams,
    opts: &Options,
) -> Result<CompanyExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    opts.pacing.pause().await;
    ReadinessPoller::with_options(Duration::from_millis(params.wait_for_load), opts)
        .wait(source, |snap| resolve(snap.root(), LOADED, Presence::Text).is_some())
        .await;

    let company = {
        let snap = source.snapshot().await?;
        top_card(snap.root())
    };
    opts.pacing.pause().await;

    let mut updates = Vec::new();
    if params.include_updates {
        updates = read_updates(source, opts, params).await?;
        opts.pacing.pause().await;
    }
    let mut employees = Vec::new();
    if params.include_employees {
        employees = read_employees(source, opts, params).await?;
    }
    info!(updates = updates.len(), employees = employees.len(), "company read");

    let url = source.url();
    let now = Utc::now();
    Ok(CompanyExtraction {
        company,
        employees,
        updates,
        metadata: CompanyMetadata {
            company_id: company_id(&url),
            url,
            extracted_sections: CompanySections {
                updates: params.include_updates,
                employees: params.include_employees,
            },
            extracted_at: now,
            extraction_config: params.clone(),
        },
        extracted_at: now,
    })
}

pub fn company_id(url: &str) -> Option<String> {
    COMPANY_ID
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| c[1].to_string())
}

/// Normalized text with LinkedIn's spoken hashtag prefix collapsed.
fn clean_text(el: ElementRef<'_>) -> String {
    element_text(el).replace("hashtag#", "#")
}

fn first_text(scope: ElementRef<'_>, candidates: &[&str]) -> Option<String> {
    resolve(scope, candidates, Presence::Text).map(clean_text)
}

/// Texts of the first candidate that matches anything.
fn texts(scope: ElementRef<'_>, candidates: &[&str]) -> Vec<String> {
    resolve_all(scope, candidates)
        .into_iter()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn top_card(root: ElementRef<'_>) -> Company {
    let employee_count = texts(root, SIZE)
        .into_iter()
        .find(|t| t.contains("employee") || t.contains("size") || SIZE_PATTERN.is_match(t));
    let followers = texts(root, FOLLOWERS)
        .into_iter()
        .find(|t| t.to_lowercase().contains("followers"));
    let headquarters = texts(root, HEADQUARTERS).into_iter().find(|t| {
        let lower = t.to_lowercase();
        t.chars().count() > 3 && !HEADQUARTERS_EXCLUDE.iter().any(|x| lower.contains(x))
    });
    Company {
        name: first_text(root, NAME),
        industry: first_text(root, INDUSTRY),
        employee_count,
        followers,
        headquarters,
        verified: VERIFIED.iter().any(|css| select_first(root, css).is_some()),
    }
}

async fn read_updates<P>(source: &P, opts: &Options, params: &CompanyParams) -> Result<Vec<Update>, ExtractError>
where
    P: PageSource + ?Sized,
{
    if try_scroll(source, UPDATES_SECTION).await {
        settle(source, opts, |snap| !resolve_all(snap.root(), UPDATES).is_empty()).await;
    }
    let snap = source.snapshot().await?;
    let items = resolve_all(snap.root(), UPDATES);
    debug!(found = items.len(), "updates found");
    Ok(items
        .into_iter()
        .take(params.max_updates)
        .filter_map(|item| update(&snap, item, params.include_media))
        .collect())
}

fn update(snap: &Snapshot, item: ElementRef<'_>, include_media: bool) -> Option<Update> {
    let content = first_text(item, UPDATE_CONTENT)
        .map(|t| truncate_chars(&t, UPDATE_CONTENT_MAX))
        .filter(|t| !t.is_empty())?;
    let timestamp = resolve(item, UPDATE_TIME, Presence::Text).map(|el| {
        el.value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| clean_text(el))
    });
    Some(Update {
        content,
        timestamp,
        engagement: engagement(item),
        kind: update_kind(item),
        author: author(item),
        media: if include_media {
            media(snap, item)
        } else {
            Vec::new()
        },
    })
}

fn engagement(item: ElementRef<'_>) -> Engagement {
    let mut counts = Engagement::default();
    if let Some(text) = first_text(item, LIKES) {
        let digits: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(*c, ',' | 'K' | 'M'))
            .collect();
        if !digits.is_empty() {
            counts.likes = digits;
        }
    }
    if let Some(text) = first_text(item, COMMENTS) {
        counts.comments = first_count(&text);
    }
    if let Some(el) = resolve(item, REPOSTS, Presence::Any) {
        let text = clean_text(el);
        let text = if text.is_empty() {
            el.value().attr("aria-label").unwrap_or("").to_string()
        } else {
            text
        };
        counts.reposts = first_count(&text);
    }
    counts
}

fn first_count(text: &str) -> String {
    COUNT
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "0".to_string())
}

fn update_kind(item: ElementRef<'_>) -> UpdateKind {
    let has = |css: &str| select_first(item, css).is_some();
    if has(".update-components-article") {
        UpdateKind::Article
    } else if has(".update-components-video, .video-s-loader") {
        UpdateKind::Video
    } else if has(".update-components-header") {
        UpdateKind::Repost
    } else if has(".update-components-image") {
        UpdateKind::ImagePost
    } else {
        UpdateKind::Post
    }
}

fn author(item: ElementRef<'_>) -> Option<String> {
    let raw = first_text(item, AUTHOR)?;
    if let Some(name) = select_first(item, AUTHOR_NAME).map(clean_text) {
        if !name.is_empty() {
            return Some(truncate_chars(&name, AUTHOR_MAX));
        }
    }
    Some(truncate_chars(&clean_author(&raw), AUTHOR_MAX))
}

/// Strips badge suffixes and the doubled names LinkedIn renders for screen
/// readers: `Jane DoeJane Doe • Following` becomes `Jane Doe`.
fn clean_author(raw: &str) -> String {
    let head = raw.split('•').next().unwrap_or("").trim();
    let head = AUTHOR_BADGES.replace_all(head, "");
    let head = head.trim();

    let words: Vec<&str> = head.split_whitespace().collect();
    if words.len() >= 2 && words[0] == words[1] {
        return words[1..].join(" ");
    }
    let chars: Vec<char> = head.chars().collect();
    let half = chars.len() / 2;
    if half > 0 && chars.len() % 2 == 0 && chars[..half] == chars[half..] {
        return chars[..half].iter().collect();
    }
    head.to_string()
}

fn media(snap: &Snapshot, item: ElementRef<'_>) -> Vec<Media> {
    select(item, MEDIA_IMAGES)
        .into_iter()
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            if !src.contains(MEDIA_HOST) || MEDIA_STATIC.iter().any(|s| src.contains(s)) {
                return None;
            }
            Some(Media {
                kind: "image",
                url: absolute(snap, src),
                alt: img.value().attr("alt").unwrap_or("").to_string(),
            })
        })
        .collect()
}

async fn read_employees<P>(
    source: &P,
    opts: &Options,
    params: &CompanyParams,
) -> Result<Vec<EmployeeEntry>, ExtractError>
where
    P: PageSource + ?Sized,
{
    if params.respect_privacy {
        let snap = source.snapshot().await?;
        let root = snap.root();
        let summary = EmployeeSummary {
            total_employees_visible: select(root, PEOPLE_CARDS).len(),
            total_employees_text: select_first(root, PEOPLE_TOTAL)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Not available".to_string()),
            note: PRIVACY_NOTE,
        };
        return Ok(vec![EmployeeEntry::Summary(summary)]);
    }

    let present = {
        let snap = source.snapshot().await?;
        select_first(snap.root(), PEOPLE_SECTION).is_some()
    };
    if !present {
        debug!("no employee section on page");
        return Ok(Vec::new());
    }
    if try_scroll(source, PEOPLE_SECTION).await {
        settle(source, opts, |snap| select_first(snap.root(), PEOPLE_CARDS).is_some()).await;
    }

    let snap = source.snapshot().await?;
    let cards = select(snap.root(), PEOPLE_CARDS);
    debug!(found = cards.len(), "employee cards found");
    Ok(cards
        .into_iter()
        .take(params.max_employees)
        .filter_map(|card| {
            let name = first_text(card, PEOPLE_NAME)?;
            Some(EmployeeEntry::Person(Employee {
                name,
                title: first_text(card, PEOPLE_TITLE),
                profile_url: select_first(card, "a[href*=\"/in/\"]")
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| absolute(&snap, href)),
            }))
        })
        .collect())
}
