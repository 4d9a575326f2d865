use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::agents::enrich_lead;
use crate::crm::{LeadPatch, NewActivity};
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};

use super::{Stage, StageDeps, fill_missing, note_activity_error, record_activity, require_lead};

pub const AGENT: &str = "lead-enrichment";

/// Attaches research summary, pain points and buying signals to the lead.
/// Those three always take the latest values; URLs and location only fill gaps.
pub struct EnrichmentStage {
    deps: StageDeps,
}

impl EnrichmentStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for EnrichmentStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::Enrichment
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let lead = require_lead(ctx)?;
        let data = enrich_lead(
            self.deps.research.as_ref(),
            self.deps.extraction.as_ref(),
            lead,
        )
        .await?;

        let mut patch = LeadPatch {
            research_summary: Some(data.research_summary.clone()),
            pain_points: Some(data.pain_points.clone()),
            buying_signals: Some(data.buying_signals.clone()),
            ..LeadPatch::default()
        };
        fill_missing(&mut patch.linkedin_url, &lead.linkedin_url, data.linkedin_url.as_ref());
        fill_missing(&mut patch.twitter_url, &lead.twitter_url, data.twitter_url.as_ref());
        fill_missing(&mut patch.location, &lead.location, data.location.as_ref());

        let updated = self.deps.store.update_lead(&lead.id, &patch).await?;

        let activity_error = record_activity(
            self.deps.store.as_ref(),
            NewActivity::agent_action(
                &lead.id,
                AGENT,
                "Lead Enrichment Completed",
                "AI agent enriched lead profile with research summary and insights.",
                json!({
                    "agent": AGENT,
                    "painPointsCount": data.pain_points.len(),
                    "buyingSignalsCount": data.buying_signals.len(),
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ),
        )
        .await;

        let mut output = json!({
            "enriched": true,
            "painPointsCount": data.pain_points.len(),
            "buyingSignalsCount": data.buying_signals.len(),
            "fieldsUpdated": patch.field_names(),
        });
        note_activity_error(&mut output, activity_error);
        Ok(StageEffect {
            enrichment: Some(data),
            ..StageEffect::output(output).with_lead(updated)
        })
    }
}
