use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use crate::agents::scrape_profile;
use crate::crm::{LeadPatch, NewActivity, filled};
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};

use super::{Stage, StageDeps, fill_missing, note_activity_error, record_activity, require_lead};

pub const AGENT: &str = "profile-scraper";
const NOTES_SEPARATOR: &str = "\n\n";

/// Scrapes the lead's LinkedIn / X profiles and fills fields the lead lacks.
pub struct ProfileScraperStage {
    deps: StageDeps,
}

impl ProfileScraperStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

fn append_note(existing: &Option<String>, addition: &str) -> Option<String> {
    let addition = addition.trim();
    if addition.is_empty() {
        return None;
    }
    match filled(existing) {
        Some(notes) if notes.contains(addition) => None,
        Some(notes) => Some(format!("{}{}{}", notes, NOTES_SEPARATOR, addition)),
        None => Some(addition.to_string()),
    }
}

#[async_trait]
impl Stage for ProfileScraperStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::ProfileScraper
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let lead = require_lead(ctx)?;
        let skipped = || StageEffect::output(json!({"skipped": true, "reason": "No profile URLs to scrape"}));

        let Some(profile) = scrape_profile(
            self.deps.research.as_ref(),
            self.deps.extraction.as_ref(),
            lead,
        )
        .await
        else {
            return Ok(skipped());
        };

        let data = &profile.data;
        let mut patch = LeadPatch::default();
        fill_missing(&mut patch.title, &lead.title, data.title.as_ref());
        fill_missing(&mut patch.company_name, &lead.company_name, data.company_name.as_ref());
        fill_missing(&mut patch.location, &lead.location, data.location.as_ref());
        fill_missing(&mut patch.email, &lead.email, data.email.as_ref());
        if let Some(ref bio) = data.bio {
            patch.personal_notes = append_note(&lead.personal_notes, bio);
        }

        let fields_updated = patch.field_names();
        let updated = if patch.is_empty() {
            lead.clone()
        } else {
            self.deps.store.update_lead(&lead.id, &patch).await?
        };

        let profile_type = serde_json::to_value(profile.profile_type)?;
        let activity_error = record_activity(
            self.deps.store.as_ref(),
            NewActivity::agent_action(
                &lead.id,
                AGENT,
                "Profile Scraped",
                format!(
                    "Profile scraper processed {} profile ({} confidence): {}",
                    profile_type.as_str().unwrap_or("unknown"),
                    data.confidence.as_str(),
                    data.extraction_summary
                ),
                json!({
                    "agent": AGENT,
                    "profileType": profile_type,
                    "confidence": data.confidence,
                    "fieldsUpdated": fields_updated,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ),
        )
        .await;

        info!(lead_id = %lead.id, fields = ?fields_updated, "Profile scrape applied");

        let mut output = serde_json::to_value(&profile)?;
        if let Value::Object(ref mut map) = output {
            map.insert("fieldsUpdated".to_string(), json!(fields_updated));
        }
        note_activity_error(&mut output, activity_error);
        Ok(StageEffect::output(output).with_lead(updated))
    }
}
