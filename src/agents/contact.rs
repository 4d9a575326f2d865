//! Contact finder: targeted web searches for a missing email or LinkedIn URL.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crm::{Lead, filled};
use crate::extraction::{Confidence, Extraction, ExtractionRequest, ExtractionTask};
use crate::llm::StructuredOutput;
use crate::research::{Research, is_linkedin_profile_url, truncate_chars};

pub const MAX_SEARCH_CHARS: usize = 6000;
pub const RESULT_SEPARATOR: &str = "\n\n---\n\n";

const INSTRUCTIONS: &str = "You find and verify professional contact details in search results.\n\
Rules: only extract information backed by concrete evidence in the results. An email must be \
shown explicitly. A LinkedIn URL must be a full linkedin.com/in/<username> URL. Never fabricate \
or guess.\n\
Confidence: \"high\" = explicit mention with verification, \"medium\" = strong indicators, \
\"low\" = minimal evidence.\n\
JSON shape: {\"email\": string|null, \"linkedinUrl\": string|null, \
\"confidence\": \"high\"|\"medium\"|\"low\", \"searchSummary\": string, \
\"alternativeEmails\": [string], \"notes\": string|null}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub confidence: Confidence,
    pub search_summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn spaced(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Searches worth issuing for this lead: a LinkedIn lookup if the URL is
/// missing, an email lookup if the email is missing, and a team directory
/// lookup whenever the company is known.
pub fn contact_queries(lead: &Lead) -> Vec<String> {
    let first = Some(lead.first_name.as_str());
    let last = Some(lead.last_name.as_str());
    let title = filled(&lead.title);
    let company = filled(&lead.company_name);

    let mut queries = Vec::with_capacity(3);
    if !lead.has_linkedin() {
        queries.push(format!(
            "{} site:linkedin.com/in",
            spaced(&[first, last, title, company])
        ));
    }
    if !lead.has_email() {
        queries.push(format!("{} email contact", spaced(&[first, last, company])));
    }
    if let Some(company) = company {
        queries.push(format!(
            "{} team directory",
            spaced(&[first, last, Some(company)])
        ));
    }
    queries
}

/// Read the extraction output. Values failing basic shape checks are dropped
/// rather than trusted.
pub fn parse_contact(output: &StructuredOutput) -> ContactResult {
    if !output.is_parsed() {
        return ContactResult {
            email: None,
            linkedin_url: None,
            confidence: Confidence::Low,
            search_summary: "Failed to parse AI response".to_string(),
            alternative_emails: Vec::new(),
            notes: None,
        };
    }

    ContactResult {
        email: output
            .str_field("email")
            .filter(|e| e.contains('@'))
            .map(|e| e.to_lowercase()),
        linkedin_url: output
            .str_field("linkedinUrl")
            .filter(|u| is_linkedin_profile_url(u)),
        confidence: Confidence::from_output(output, "confidence", Confidence::Low),
        search_summary: output
            .str_field("searchSummary")
            .unwrap_or_else(|| "Analysis completed".to_string()),
        alternative_emails: output
            .list_field("alternativeEmails")
            .into_iter()
            .filter(|e| e.contains('@'))
            .collect(),
        notes: output.str_field("notes"),
    }
}

fn person_block(lead: &Lead) -> String {
    let or = |v: Option<&str>, d: &'static str| v.unwrap_or(d).to_string();
    format!(
        "Person Information:\n- Name: {}\n- Company: {}\n- Title: {}\n- Location: {}\n- Existing Email: {}\n- Existing LinkedIn: {}",
        lead.full_name(),
        or(filled(&lead.company_name), "Unknown"),
        or(filled(&lead.title), "Unknown"),
        or(filled(&lead.location), "Unknown"),
        or(filled(&lead.email), "Not provided"),
        or(filled(&lead.linkedin_url), "Not provided"),
    )
}

/// Search for the lead's missing contact fields and extract what the results
/// actually show. A failing individual search contributes nothing; an
/// extraction failure propagates.
pub async fn find_contact_info(
    research: &dyn Research,
    extraction: &dyn Extraction,
    lead: &Lead,
) -> Result<ContactResult> {
    if lead.has_email() && lead.has_linkedin() {
        return Ok(ContactResult {
            email: lead.email.clone(),
            linkedin_url: lead.linkedin_url.clone(),
            confidence: Confidence::High,
            search_summary: "All contact information already provided".to_string(),
            alternative_emails: Vec::new(),
            notes: None,
        });
    }

    let queries = contact_queries(lead);
    info!(lead_id = %lead.id, queries = queries.len(), "Searching for contact info");

    let mut results = Vec::with_capacity(queries.len());
    for query in &queries {
        match research.search(query).await {
            Ok(text) if !text.trim().is_empty() => results.push(text),
            Ok(_) => {}
            Err(e) => warn!(lead_id = %lead.id, query = %query, error = %e, "Contact search failed"),
        }
    }
    let combined = results.join(RESULT_SEPARATOR);

    let request = ExtractionRequest {
        task: ExtractionTask::Contact,
        instructions: INSTRUCTIONS.to_string(),
        content: format!(
            "{}\n\nSearch Results:\n{}\n\nExtract and verify contact information. Be conservative.",
            person_block(lead),
            truncate_chars(&combined, MAX_SEARCH_CHARS)
        ),
        temperature: 0.3,
    };
    let output = extraction.extract(request).await?;
    Ok(parse_contact(&output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::NewLead;
    use crate::llm::extract_json_object;
    use chrono::Utc;

    fn lead(email: Option<&str>, linkedin: Option<&str>, company: Option<&str>) -> Lead {
        NewLead {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            title: Some("CTO".into()),
            email: email.map(str::to_string),
            linkedin_url: linkedin.map(str::to_string),
            company_name: company.map(str::to_string),
            ..NewLead::default()
        }
        .into_lead("l1".into(), Utc::now())
        .unwrap()
    }

    #[test]
    fn queries_cover_missing_fields_only() {
        let queries = contact_queries(&lead(None, None, Some("Acme")));
        assert_eq!(
            queries,
            vec![
                "Ada Lovelace CTO Acme site:linkedin.com/in".to_string(),
                "Ada Lovelace Acme email contact".to_string(),
                "Ada Lovelace Acme team directory".to_string(),
            ]
        );

        let queries = contact_queries(&lead(Some("a@acme.io"), None, None));
        assert_eq!(queries, vec!["Ada Lovelace CTO site:linkedin.com/in".to_string()]);
    }

    #[test]
    fn parse_drops_unverifiable_values() {
        let out = extract_json_object(
            r#"{"email": "Ada@Acme.io", "linkedinUrl": "https://acme.io/ada", "confidence": "medium", "searchSummary": "found", "alternativeEmails": ["x", "a.l@acme.io"]}"#,
        );
        let result = parse_contact(&out);
        assert_eq!(result.email.as_deref(), Some("ada@acme.io"));
        assert_eq!(result.linkedin_url, None);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.alternative_emails, vec!["a.l@acme.io".to_string()]);
    }

    #[test]
    fn parse_failure_means_not_found() {
        let result = parse_contact(&extract_json_object("nothing"));
        assert_eq!(result.email, None);
        assert_eq!(result.confidence, Confidence::Low);
    }
}
