// ABOUTME: LinkedIn member profile extractor: top card, experience, education, and skills.
// ABOUTME: Sections are scrolled into view before reading; empty optional entry fields are omitted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::pipeline::{Envelope, ErrorBoundary};
use crate::engine::poller::ReadinessPoller;
use crate::engine::resolver::{resolve, resolve_text, select, select_first, Presence};
use crate::engine::text::{element_text, truncate_chars};
use crate::engine::types::serialize_instant;
use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};
use crate::sites::linkedin::read_section;
use crate::sites::{guarded, Site};

const LOADED: &[&str] = &[".text-heading-xlarge", ".pv-text-details__left-panel", ".profile-name", "h1"];

const NAME: &[&str] = &[
    ".text-heading-xlarge",
    ".pv-text-details__left-panel h1",
    ".profile-name",
    "h1.text-heading-xlarge",
];
const HEADLINE: &[&str] = &[
    ".text-body-medium.break-words",
    ".pv-text-details__left-panel .text-body-medium",
    ".pv-top-card--list-bullet .text-body-medium",
];
const LOCATION: &str = ".text-body-small.inline.t-black--light.break-words, \
    .pv-text-details__left-panel .text-body-small, \
    .pv-top-card--list-bullet .text-body-small";
const LOCATION_EXCLUDE: &[&str] = &["connections", "followers"];
const CONNECTIONS: &[&str] = &[".text-body-small a[href*=\"connections\"]", ".pv-top-card--list-bullet li a"];

const EXPERIENCE: &str = "#experience";
const EDUCATION: &str = "#education";
const SKILLS: &str = "#skills";

const ENTRY_TITLE: &str = ".mr1.hoverable-link-text.t-bold span[aria-hidden=\"true\"]";
const ENTRY_SUBTITLE: &str = ".t-14.t-normal span[aria-hidden=\"true\"]";
const ENTRY_CAPTION: &str = ".pvs-entity__caption-wrapper";
const ENTRY_DETAILS: &str = ".t-14.t-normal.t-black--light span[aria-hidden=\"true\"]";
const ENTRY_GRADE: &str = ".inline-show-more-text--is-collapsed span[aria-hidden=\"true\"]";
const SKILL_CONTEXT: &str = ".t-14.t-normal.t-black span[aria-hidden=\"true\"]";
const DESCRIPTIONS: &[&str] = &[
    ".inline-show-more-text--is-collapsed span[aria-hidden=\"true\"]",
    ".inline-show-more-text span[aria-hidden=\"true\"]",
    ".pvs-entity__description span[aria-hidden=\"true\"]",
];

/// Markers that make an entry detail read as a place.
const PLACE_MARKERS: &[&str] = &[",", "Remote", "On-site", "Hybrid"];
/// Markers that make an entry detail read as a date range instead.
const DURATION_MARKERS: &[&str] = &["Present", "mos", "yr"];
/// Description candidates containing these are badges, not prose.
const DESCRIPTION_EXCLUDE: &[&str] = &["Show credential", "skills"];
const DESCRIPTION_MIN: usize = 50;
const DESCRIPTION_MAX: usize = 500;
const DESCRIPTION_BREAK_MIN: usize = 400;

static CONNECTION_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+[+,\d]*)").expect("valid regex"));
static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid regex"));
static PROFILE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/in/([^/?]+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileParams {
    pub include_experience: bool,
    pub include_education: bool,
    pub include_skills: bool,
    pub max_experience: usize,
    /// Milliseconds.
    pub wait_for_load: u64,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            include_experience: true,
            include_education: true,
            include_skills: false,
            max_experience: 10,
            wait_for_load: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Education {
    pub school: String,
    pub degree: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skill {
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endorsements: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileSections {
    pub experience: bool,
    pub education: bool,
    pub skills: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub url: String,
    pub profile_id: Option<String>,
    pub extracted_sections: ProfileSections,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileExtraction {
    pub profile: Profile,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Vec<Skill>,
    pub metadata: ProfileMetadata,
    #[serde(serialize_with = "serialize_instant")]
    pub extracted_at: DateTime<Utc>,
}

/// Extracts an open LinkedIn member profile.
pub async fn extract_profile<P>(
    source: &P,
    params: &ProfileParams,
    opts: &Options,
) -> Envelope<ProfileExtraction>
where
    P: PageSource + ?Sized,
{
    let boundary = ErrorBoundary::open(Site::LinkedinProfile.envelope_key(), source.url());
    guarded(Site::LinkedinProfile, boundary, stages(source, params, opts)).await
}

async fn stages<P>(
    source: &P,
    params: &ProfileParams,
    opts: &Options,
) -> Result<ProfileExtraction, ExtractError>
where
    P: PageSource + ?Sized,
{
    opts.pacing.pause().await;
    ReadinessPoller::with_options(Duration::from_millis(params.wait_for_load), opts)
        .wait(source, |snap| resolve(snap.root(), LOADED, Presence::Text).is_some())
        .await;

    let profile = {
        let snap = source.snapshot().await?;
        top_card(&snap)
    };
    opts.pacing.pause().await;

    let mut experience = Vec::new();
    if params.include_experience {
        experience = read_section(source, opts, EXPERIENCE, params.max_experience, parse_experience).await?;
        opts.pacing.pause().await;
    }
    let mut education = Vec::new();
    if params.include_education {
        education = read_section(source, opts, EDUCATION, usize::MAX, parse_education).await?;
        opts.pacing.pause().await;
    }
    let mut skills = Vec::new();
    if params.include_skills {
        skills = read_section(source, opts, SKILLS, usize::MAX, parse_skill).await?;
    }
    info!(
        experience = experience.len(),
        education = education.len(),
        skills = skills.len(),
        "profile read"
    );

    let url = source.url();
    Ok(ProfileExtraction {
        profile,
        experience,
        education,
        skills,
        metadata: ProfileMetadata {
            profile_id: profile_id(&url),
            url,
            extracted_sections: ProfileSections {
                experience: params.include_experience,
                education: params.include_education,
                skills: params.include_skills,
            },
        },
        extracted_at: Utc::now(),
    })
}

fn top_card(snap: &Snapshot) -> Profile {
    let root = snap.root();
    let location = select(root, LOCATION)
        .into_iter()
        .map(element_text)
        .find(|t| !t.is_empty() && !LOCATION_EXCLUDE.iter().any(|x| t.contains(x)));
    let connections = resolve(root, CONNECTIONS, Presence::Text)
        .map(element_text)
        .and_then(|t| CONNECTION_COUNT.captures(&t).map(|c| c[1].to_string()));
    Profile {
        name: resolve_text(root, NAME),
        headline: resolve_text(root, HEADLINE),
        location,
        connections,
    }
}

pub fn profile_id(url: &str) -> Option<String> {
    PROFILE_ID.captures(url).map(|c| c[1].to_string())
}

fn text_at(item: ElementRef<'_>, css: &str) -> String {
    select_first(item, css).map(element_text).unwrap_or_default()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_experience(item: ElementRef<'_>) -> Option<Experience> {
    let title = text_at(item, ENTRY_TITLE);
    let subtitle = text_at(item, ENTRY_SUBTITLE);
    let mut parts = subtitle.split(" · ");
    let company = parts.next().unwrap_or("").to_string();
    let employment_type = parts.next().unwrap_or("").to_string();
    if title.is_empty() && company.is_empty() {
        return None;
    }

    let location = select(item, ENTRY_DETAILS)
        .into_iter()
        .map(element_text)
        .find(|t| is_place(t));
    let description = DESCRIPTIONS
        .iter()
        .filter_map(|css| select_first(item, css))
        .map(element_text)
        .find(|t| t.chars().count() > DESCRIPTION_MIN && !DESCRIPTION_EXCLUDE.iter().any(|x| t.contains(x)))
        .map(|t| clip_description(&t));

    Some(Experience {
        title,
        company,
        employment_type: non_empty(employment_type),
        duration: text_at(item, ENTRY_CAPTION),
        location,
        description: description.and_then(non_empty),
    })
}

fn is_place(text: &str) -> bool {
    !text.is_empty()
        && PLACE_MARKERS.iter().any(|m| text.contains(m))
        && !DURATION_MARKERS.iter().any(|m| text.contains(m))
}

/// Drops a trailing ellipsis and caps the text, breaking at a word when one
/// ends late enough.
fn clip_description(text: &str) -> String {
    let text = text.trim_end().trim_end_matches('…').trim();
    if text.chars().count() <= DESCRIPTION_MAX {
        return text.to_string();
    }
    let capped = truncate_chars(text, DESCRIPTION_MAX);
    match capped.rfind(' ') {
        Some(space) if capped[..space].chars().count() > DESCRIPTION_BREAK_MIN => {
            format!("{}...", &capped[..space])
        }
        _ => capped,
    }
}

fn parse_education(item: ElementRef<'_>) -> Option<Education> {
    let school = text_at(item, ENTRY_TITLE);
    let degree = text_at(item, ENTRY_SUBTITLE);
    if school.is_empty() && degree.is_empty() {
        return None;
    }
    Some(Education {
        school,
        degree,
        year: non_empty(text_at(item, ENTRY_CAPTION)),
        grade: non_empty(text_at(item, ENTRY_GRADE)),
    })
}

fn parse_skill(item: ElementRef<'_>) -> Option<Skill> {
    let skill = non_empty(text_at(item, ENTRY_TITLE))?;
    let context = text_at(item, SKILL_CONTEXT);
    let endorsements = FIRST_NUMBER
        .captures(&context)
        .and_then(|c| c[1].parse::<u64>().ok())
        .filter(|n| *n > 0);
    Some(Skill {
        skill,
        endorsements,
        context: non_empty(context),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Frame, ScriptedPage, StaticPage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const URL: &str = "https://www.linkedin.com/in/jane-doe/";

    fn fast() -> Options {
        Options {
            poll_interval: Duration::from_millis(10),
            stabilization: Duration::ZERO,
            ..Options::default()
        }
    }

    const PROFILE: &str = r#"<html><body><main>
      <section class="pv-top-card">
        <div class="pv-text-details__left-panel">
          <h1 class="text-heading-xlarge">Jane Doe</h1>
          <div class="text-body-medium break-words">Staff Engineer at Acme</div>
        </div>
        <span class="text-body-small inline t-black--light break-words">Berlin, Germany</span>
        <ul class="pv-top-card--list-bullet">
          <li class="text-body-small"><a href="/mynetwork/connections/">500+ connections</a></li>
        </ul>
      </section>
      <section><div id="experience"></div><ul>
        <li class="artdeco-list__item">
          <div class="mr1 hoverable-link-text t-bold"><span aria-hidden="true">Staff Engineer</span></div>
          <span class="t-14 t-normal"><span aria-hidden="true">Acme · Full-time</span></span>
          <span class="t-14 t-normal t-black--light"><span class="pvs-entity__caption-wrapper" aria-hidden="true">Jan 2020 - Present · 4 yrs</span></span>
          <span class="t-14 t-normal t-black--light"><span aria-hidden="true">Berlin, Germany · Hybrid</span></span>
          <div class="pvs-entity__description"><span aria-hidden="true">Led the platform team through a migration of every service to a shared runtime…</span></div>
        </li>
        <li class="artdeco-list__item">
          <div class="mr1 hoverable-link-text t-bold"><span aria-hidden="true">Intern</span></div>
          <span class="t-14 t-normal"><span aria-hidden="true">Initech</span></span>
          <span class="t-14 t-normal t-black--light"><span class="pvs-entity__caption-wrapper" aria-hidden="true">2018</span></span>
        </li>
        <li class="artdeco-list__item"><span>Show all</span></li>
      </ul></section>
      <section><div id="education"></div><ul>
        <li class="artdeco-list__item">
          <div class="mr1 hoverable-link-text t-bold"><span aria-hidden="true">TU Berlin</span></div>
          <span class="t-14 t-normal"><span aria-hidden="true">MSc, Computer Science</span></span>
          <span class="t-14 t-normal t-black--light"><span class="pvs-entity__caption-wrapper" aria-hidden="true">2014 - 2016</span></span>
        </li>
      </ul></section>
      <section><div id="skills"></div><ul>
        <li class="artdeco-list__item">
          <div class="mr1 hoverable-link-text t-bold"><span aria-hidden="true">Rust</span></div>
          <span class="t-14 t-normal t-black"><span aria-hidden="true">12 endorsements</span></span>
        </li>
        <li class="artdeco-list__item">
          <div class="mr1 hoverable-link-text t-bold"><span aria-hidden="true">Go</span></div>
        </li>
      </ul></section>
    </main></body></html>"#;

    #[tokio::test(start_paused = true)]
    async fn reads_profile_sections() {
        let page = ScriptedPage::new(URL, vec![Frame::Html(PROFILE.to_string())]);
        let doc = serde_json::to_value(extract_profile(&page, &ProfileParams::default(), &fast()).await).unwrap();

        assert_eq!(
            doc["profile"],
            json!({
                "name": "Jane Doe",
                "headline": "Staff Engineer at Acme",
                "location": "Berlin, Germany",
                "connections": "500+",
            })
        );
        assert_eq!(
            doc["experience"],
            json!([
                {
                    "title": "Staff Engineer",
                    "company": "Acme",
                    "employmentType": "Full-time",
                    "duration": "Jan 2020 - Present · 4 yrs",
                    "location": "Berlin, Germany · Hybrid",
                    "description": "Led the platform team through a migration of every service to a shared runtime",
                },
                {"title": "Intern", "company": "Initech", "duration": "2018"},
            ])
        );
        assert_eq!(
            doc["education"],
            json!([{"school": "TU Berlin", "degree": "MSc, Computer Science", "year": "2014 - 2016"}])
        );
        assert_eq!(doc["skills"], json!([]));
        assert_eq!(
            doc["metadata"],
            json!({
                "url": URL,
                "profileId": "jane-doe",
                "extractedSections": {"experience": true, "education": true, "skills": false},
            })
        );
        assert_eq!(page.actions(), vec!["scroll #experience", "scroll #education"]);
    }

    #[tokio::test(start_paused = true)]
    async fn skills_and_experience_limit() {
        let page = StaticPage::new(URL, PROFILE);
        let params = ProfileParams {
            include_skills: true,
            include_education: false,
            max_experience: 1,
            ..ProfileParams::default()
        };
        let result = extract_profile(&page, &params, &fast()).await.success().unwrap();
        assert_eq!(result.experience.len(), 1);
        assert!(result.education.is_empty());
        assert_eq!(
            result.skills,
            vec![
                Skill {
                    skill: "Rust".to_string(),
                    endorsements: Some(12),
                    context: Some("12 endorsements".to_string()),
                },
                Skill {
                    skill: "Go".to_string(),
                    endorsements: None,
                    context: None,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_sections_are_empty() {
        let page = StaticPage::new(URL, r#"<h1 class="text-heading-xlarge">Solo</h1>"#);
        let result = extract_profile(&page, &ProfileParams::default(), &fast())
            .await
            .success()
            .unwrap();
        assert_eq!(result.profile.name.as_deref(), Some("Solo"));
        assert!(result.experience.is_empty());
        assert!(result.education.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_profile_error() {
        let page = ScriptedPage::new(URL, vec![Frame::Fault("logged out".to_string())]);
        let params = ProfileParams {
            wait_for_load: 50,
            ..ProfileParams::default()
        };
        let doc = serde_json::to_value(extract_profile(&page, &params, &fast()).await).unwrap();
        assert_eq!(doc["error"], json!("Snapshot: logged out"));
        assert_eq!(doc["profile"], json!({"url": URL}));
    }

    #[test]
    fn clips_long_descriptions_at_a_word() {
        let long = "word ".repeat(120);
        let clipped = clip_description(&long);
        assert!(clipped.ends_with("word..."), "{}", clipped);
        assert!(clipped.chars().count() <= DESCRIPTION_MAX + 3);

        let unbroken = "x".repeat(600);
        assert_eq!(clip_description(&unbroken).chars().count(), DESCRIPTION_MAX);
        assert_eq!(clip_description("short text …"), "short text");
    }

    #[test]
    fn place_heuristic() {
        assert!(is_place("Berlin, Germany"));
        assert!(is_place("Remote"));
        assert!(!is_place("Jan 2020 - Present"));
        assert!(!is_place("2 yrs 3 mos"));
        assert!(!is_place("Engineering"));
    }

    #[test]
    fn profile_ids() {
        assert_eq!(profile_id(URL), Some("jane-doe".to_string()));
        assert_eq!(profile_id("https://www.linkedin.com/in/x?trk=1"), Some("x".to_string()));
        assert_eq!(profile_id("https://www.linkedin.com/feed/"), None);
    }
}
