//! Enrichment: broad web research turned into sales insights.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crm::{Lead, filled};
use crate::extraction::{Extraction, ExtractionRequest, ExtractionTask};
use crate::llm::StructuredOutput;
use crate::research::{Research, is_linkedin_profile_url, is_twitter_profile_url, truncate_chars};

pub const MAX_SEARCH_CHARS: usize = 3000;
const FALLBACK_SUMMARY_CHARS: usize = 500;

const INSTRUCTIONS: &str = "You are a B2B sales research expert. Analyze the information about a \
lead and extract insights for sales outreach: a concise research summary (2-3 sentences), 3-5 \
pain points, 3-5 buying signals, and any LinkedIn/X profile URLs or location you find.\n\
JSON shape: {\"researchSummary\": string, \"painPoints\": [string], \"buyingSignals\": [string], \
\"linkedin_url\": string|null, \"twitter_url\": string|null, \"location\": string|null, \
\"additionalInsights\": string|null}";

/// AI-derived research attached to a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentData {
    pub research_summary: String,
    pub pain_points: Vec<String>,
    pub buying_signals: Vec<String>,
    #[serde(rename = "linkedin_url", default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(rename = "twitter_url", default, skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_insights: Option<String>,
}

/// Name, title and company joined into one search.
pub fn enrichment_query(lead: &Lead) -> String {
    [
        Some(lead.first_name.as_str()),
        Some(lead.last_name.as_str()),
        filled(&lead.title),
        filled(&lead.company_name),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Read the analysis. A reply without JSON keeps its first 500 characters as
/// the summary.
pub fn parse_enrichment(output: &StructuredOutput) -> EnrichmentData {
    if let Some(raw) = output.raw_text() {
        return EnrichmentData {
            research_summary: truncate_chars(raw.trim(), FALLBACK_SUMMARY_CHARS).to_string(),
            ..EnrichmentData::default()
        };
    }

    EnrichmentData {
        research_summary: output
            .str_field("researchSummary")
            .unwrap_or_else(|| "No summary available".to_string()),
        pain_points: output.list_field("painPoints"),
        buying_signals: output.list_field("buyingSignals"),
        linkedin_url: output
            .str_field("linkedin_url")
            .filter(|u| is_linkedin_profile_url(u)),
        twitter_url: output
            .str_field("twitter_url")
            .filter(|u| is_twitter_profile_url(u)),
        location: output.str_field("location"),
        additional_insights: output.str_field("additionalInsights"),
    }
}

/// Search the web for the lead and analyse the results. Search and
/// extraction errors propagate.
pub async fn enrich_lead(
    research: &dyn Research,
    extraction: &dyn Extraction,
    lead: &Lead,
) -> Result<EnrichmentData> {
    let query = enrichment_query(lead);
    info!(lead_id = %lead.id, query = %query, "Researching lead");
    let results = research.search(&query).await?;

    let content = format!(
        "Lead Information:\n- Name: {}\n- Title: {}\n- Company: {}\n- Email: {}\n\nSearch Results:\n{}\n\nAnalyze this information and provide enrichment data.",
        lead.full_name(),
        filled(&lead.title).unwrap_or("Unknown"),
        filled(&lead.company_name).unwrap_or("Unknown"),
        filled(&lead.email).unwrap_or("Unknown"),
        truncate_chars(&results, MAX_SEARCH_CHARS)
    );

    let output = extraction
        .extract(ExtractionRequest {
            task: ExtractionTask::Enrichment,
            instructions: INSTRUCTIONS.to_string(),
            content,
            temperature: 0.7,
        })
        .await?;

    Ok(parse_enrichment(&output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::extract_json_object;

    #[test]
    fn parses_insights_and_validates_urls() {
        let out = extract_json_object(
            r#"{"researchSummary": "Builds compilers.", "painPoints": ["a", "b"], "buyingSignals": ["c"],
                "linkedin_url": "https://linkedin.com/in/ada", "twitter_url": "https://x.com/ada/status/1", "location": "London"}"#,
        );
        let data = parse_enrichment(&out);
        assert_eq!(data.research_summary, "Builds compilers.");
        assert_eq!(data.pain_points.len(), 2);
        assert_eq!(data.linkedin_url.as_deref(), Some("https://linkedin.com/in/ada"));
        assert_eq!(data.twitter_url, None);
        assert_eq!(data.location.as_deref(), Some("London"));
    }

    #[test]
    fn prose_reply_becomes_summary() {
        let text = "x".repeat(900);
        let data = parse_enrichment(&extract_json_object(&text));
        assert_eq!(data.research_summary.len(), 500);
        assert!(data.pain_points.is_empty());
    }

    #[test]
    fn wire_names_match_lead_columns_for_urls() {
        let data = EnrichmentData {
            research_summary: "s".into(),
            linkedin_url: Some("https://linkedin.com/in/ada".into()),
            ..EnrichmentData::default()
        };
        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("linkedin_url").is_some());
        assert!(value.get("painPoints").is_some());
    }
}
