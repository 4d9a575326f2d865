//! Profile scraper: fetch LinkedIn / X pages and extract profile facts.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::crm::{Lead, filled};
use crate::extraction::{Confidence, Extraction, ExtractionRequest, ExtractionTask, ProfileSource};
use crate::llm::StructuredOutput;
use crate::research::{Research, truncate_chars};

pub const MAX_PROFILE_CHARS: usize = 8000;

const UNAVAILABLE_SUMMARY: &str =
    "Profile scraping unavailable. Enrichment Agent will collect data via web search.";
const UNAVAILABLE_NOTES: &str =
    "Profile pages could not be fetched. Workflow continues with enrichment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    LinkedIn,
    Twitter,
    Both,
}

impl ProfileType {
    fn for_urls(linkedin: bool, twitter: bool) -> Option<Self> {
        match (linkedin, twitter) {
            (true, true) => Some(ProfileType::Both),
            (true, false) => Some(ProfileType::LinkedIn),
            (false, true) => Some(ProfileType::Twitter),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Facts extracted from one profile page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub confidence: Confidence,
    pub extraction_summary: String,
    pub notes: Option<String>,
}

/// Merged profile across every source that produced data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResult {
    #[serde(flatten)]
    pub data: ProfileData,
    pub profile_type: ProfileType,
}

impl ProfileResult {
    /// True when neither source yielded any page content.
    pub fn is_unavailable(&self) -> bool {
        self.data.extraction_summary == UNAVAILABLE_SUMMARY
    }
}

fn parse_experience(value: Option<&Value>) -> Vec<Experience> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.trim().to_string();
            let company = item.get("company")?.as_str()?.trim().to_string();
            if title.is_empty() && company.is_empty() {
                return None;
            }
            let duration = item
                .get("duration")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Experience {
                title,
                company,
                duration,
            })
        })
        .collect()
}

/// Read one source's extraction output. Unparseable replies become a
/// low-confidence record with no fields.
pub fn parse_profile(output: &StructuredOutput) -> ProfileData {
    if !output.is_parsed() {
        return ProfileData {
            confidence: Confidence::Low,
            extraction_summary: "Failed to parse AI response".to_string(),
            ..ProfileData::default()
        };
    }

    ProfileData {
        title: output.str_field("title"),
        company_name: output.str_field("companyName"),
        location: output.str_field("location"),
        bio: output.str_field("bio"),
        skills: output.list_field("skills"),
        experience: parse_experience(output.value().and_then(|v| v.get("experience"))),
        education: output.list_field("education"),
        email: output.str_field("email").filter(|e| e.contains('@')),
        website: output.str_field("website"),
        confidence: Confidence::from_output(output, "confidence", Confidence::Medium),
        extraction_summary: output
            .str_field("extractionSummary")
            .unwrap_or_else(|| "Extraction completed".to_string()),
        notes: output.str_field("notes"),
    }
}

fn first_some(primary: &Option<String>, secondary: &Option<String>) -> Option<String> {
    primary.clone().or_else(|| secondary.clone())
}

fn first_non_empty<T: Clone>(primary: Option<&Vec<T>>, secondary: Option<&Vec<T>>) -> Vec<T> {
    primary
        .filter(|v| !v.is_empty())
        .or(secondary.filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_default()
}

fn join_present<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Merge per-source results. LinkedIn wins every overlapping field; X/Twitter
/// only fills gaps.
pub fn merge_profiles(
    linkedin: Option<&ProfileData>,
    twitter: Option<&ProfileData>,
    profile_type: ProfileType,
) -> ProfileResult {
    let empty = ProfileData::default();
    let li = linkedin.unwrap_or(&empty);
    let tw = twitter.unwrap_or(&empty);

    let confidence = linkedin
        .map(|d| d.confidence)
        .or(twitter.map(|d| d.confidence))
        .unwrap_or(Confidence::Low);

    let notes = join_present([
        linkedin.and_then(|d| d.notes.as_deref()),
        twitter.and_then(|d| d.notes.as_deref()),
    ]);

    ProfileResult {
        data: ProfileData {
            title: first_some(&li.title, &tw.title),
            company_name: first_some(&li.company_name, &tw.company_name),
            location: first_some(&li.location, &tw.location),
            bio: first_some(&li.bio, &tw.bio),
            skills: first_non_empty(linkedin.map(|d| &d.skills), twitter.map(|d| &d.skills)),
            experience: first_non_empty(
                linkedin.map(|d| &d.experience),
                twitter.map(|d| &d.experience),
            ),
            education: first_non_empty(
                linkedin.map(|d| &d.education),
                twitter.map(|d| &d.education),
            ),
            email: first_some(&li.email, &tw.email),
            website: first_some(&li.website, &tw.website),
            confidence,
            extraction_summary: join_present([
                linkedin.map(|d| d.extraction_summary.as_str()),
                twitter.map(|d| d.extraction_summary.as_str()),
            ]),
            notes: if notes.is_empty() { None } else { Some(notes) },
        },
        profile_type,
    }
}

fn instructions(source: ProfileSource) -> String {
    let focus = match source {
        ProfileSource::LinkedIn => "current role, company, location, experience",
        ProfileSource::Twitter => "bio, location, current role/company mentioned",
    };
    format!(
        "You extract structured data from {} profile content.\n\
         Rules: only extract information explicitly present in the content; never fabricate or \
         guess; when unsure omit the field. Focus on {}.\n\
         JSON shape: {{\"title\": string|null, \"companyName\": string|null, \"location\": string|null, \
         \"bio\": string|null, \"skills\": [string], \"experience\": [{{\"title\", \"company\", \"duration\"}}], \
         \"education\": [string], \"email\": string|null, \"website\": string|null, \
         \"confidence\": \"high\"|\"medium\"|\"low\", \"extractionSummary\": string, \"notes\": string|null}}",
        source.label(),
        focus
    )
}

fn existing_data(lead: &Lead) -> Value {
    json!({
        "firstName": lead.first_name,
        "lastName": lead.last_name,
        "email": lead.email,
        "title": lead.title,
        "companyName": lead.company_name,
        "location": lead.location,
    })
}

async fn extract_profile(
    extraction: &dyn Extraction,
    lead: &Lead,
    source: ProfileSource,
    content: &str,
) -> Result<ProfileData> {
    let request = ExtractionRequest {
        task: ExtractionTask::Profile(source),
        instructions: instructions(source),
        content: format!(
            "Profile Type: {}\n\nExisting Lead Data:\n{}\n\nProfile Content:\n{}",
            source.label(),
            serde_json::to_string_pretty(&existing_data(lead))?,
            truncate_chars(content, MAX_PROFILE_CHARS)
        ),
        temperature: 0.2,
    };
    let output = extraction.extract(request).await?;
    Ok(parse_profile(&output))
}

/// Scrape and extract one source. A failed scrape drops the source; a failed
/// extraction yields a low-confidence record naming the error.
async fn scrape_source(
    research: &dyn Research,
    extraction: &dyn Extraction,
    lead: &Lead,
    source: ProfileSource,
    url: &str,
) -> Option<ProfileData> {
    info!(lead_id = %lead.id, source = source.label(), url = %url, "Scraping profile");
    let page = match research.scrape_page(url).await {
        Ok(page) => page,
        Err(e) => {
            warn!(lead_id = %lead.id, source = source.label(), error = %format!("{:#}", e), "Profile scrape failed, skipping source");
            return None;
        }
    };
    let Some(content) = page.content() else {
        warn!(lead_id = %lead.id, source = source.label(), "Profile page unavailable, skipping extraction");
        return None;
    };

    match extract_profile(extraction, lead, source, content).await {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(lead_id = %lead.id, source = source.label(), error = %format!("{:#}", e), "Profile extraction failed");
            Some(ProfileData {
                confidence: Confidence::Low,
                extraction_summary: format!("Error during extraction: {:#}", e),
                ..ProfileData::default()
            })
        }
    }
}

/// Scrape whichever profile URLs the lead carries (LinkedIn first, then X),
/// extract each page and merge. Each source fails on its own: one broken
/// source never costs the other its data.
pub async fn scrape_profile(
    research: &dyn Research,
    extraction: &dyn Extraction,
    lead: &Lead,
) -> Option<ProfileResult> {
    let linkedin_url = filled(&lead.linkedin_url);
    let twitter_url = filled(&lead.twitter_url);
    let Some(profile_type) = ProfileType::for_urls(linkedin_url.is_some(), twitter_url.is_some())
    else {
        return None;
    };

    let linkedin = match linkedin_url {
        Some(url) => scrape_source(research, extraction, lead, ProfileSource::LinkedIn, url).await,
        None => None,
    };
    let twitter = match twitter_url {
        Some(url) => scrape_source(research, extraction, lead, ProfileSource::Twitter, url).await,
        None => None,
    };

    if linkedin.is_none() && twitter.is_none() {
        return Some(ProfileResult {
            data: ProfileData {
                confidence: Confidence::Low,
                extraction_summary: UNAVAILABLE_SUMMARY.to_string(),
                notes: Some(UNAVAILABLE_NOTES.to_string()),
                ..ProfileData::default()
            },
            profile_type,
        });
    }

    Some(merge_profiles(
        linkedin.as_ref(),
        twitter.as_ref(),
        profile_type,
    ))
}
