use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use crate::agents::find_contact_info;
use crate::crm::{LeadPatch, NewActivity};
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};

use super::{Stage, StageDeps, fill_missing, note_activity_error, record_activity, require_lead};

pub const AGENT: &str = "contact-finder";

/// Searches for a missing email / LinkedIn URL and fills only what is absent.
pub struct ContactFinderStage {
    deps: StageDeps,
}

impl ContactFinderStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for ContactFinderStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::ContactFinder
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let lead = require_lead(ctx)?;
        if lead.has_email() && lead.has_linkedin() {
            return Ok(StageEffect::output(json!({
                "skipped": true,
                "reason": "Contact information already complete",
            })));
        }

        let result = find_contact_info(
            self.deps.research.as_ref(),
            self.deps.extraction.as_ref(),
            lead,
        )
        .await?;

        let mut patch = LeadPatch::default();
        fill_missing(&mut patch.email, &lead.email, result.email.as_ref());
        fill_missing(&mut patch.linkedin_url, &lead.linkedin_url, result.linkedin_url.as_ref());

        let fields_updated = patch.field_names();
        let updated = if patch.is_empty() {
            lead.clone()
        } else {
            self.deps.store.update_lead(&lead.id, &patch).await?
        };

        let content = if fields_updated.is_empty() {
            format!(
                "Contact finder found no new contact information ({} confidence). {}",
                result.confidence.as_str(),
                result.search_summary
            )
        } else {
            format!(
                "Contact finder filled {} ({} confidence). {}",
                fields_updated.join(", "),
                result.confidence.as_str(),
                result.search_summary
            )
        };
        let activity_error = record_activity(
            self.deps.store.as_ref(),
            NewActivity::agent_action(
                &lead.id,
                AGENT,
                "Contact Information Search",
                content,
                json!({
                    "agent": AGENT,
                    "confidence": result.confidence,
                    "fieldsUpdated": fields_updated,
                    "alternativeEmails": result.alternative_emails,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ),
        )
        .await;

        info!(lead_id = %lead.id, fields = ?fields_updated, "Contact search applied");

        let mut output = serde_json::to_value(&result)?;
        if let Value::Object(ref mut map) = output {
            map.insert("fieldsUpdated".to_string(), json!(fields_updated));
        }
        note_activity_error(&mut output, activity_error);
        Ok(StageEffect::output(output).with_lead(updated))
    }
}
