use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::crm::{LeadPatch, LeadStatus, NewActivity};
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};
use crate::storage::RecordStore;

use super::Stage;

pub const AGENT: &str = "lead-processing";
pub const COMPLETED_SUBJECT: &str = "Lead Processing Workflow Completed";

/// Status the workflow assigns for a score.
pub fn status_for_score(score: u8) -> LeadStatus {
    match score {
        80.. => LeadStatus::Qualified,
        60..=79 => LeadStatus::Researching,
        40..=59 => LeadStatus::Nurturing,
        _ => LeadStatus::New,
    }
}

/// Terminal stage: persists the status derived from the score and logs the
/// completion activity.
pub struct StatusUpdateStage {
    store: Arc<dyn RecordStore>,
}

impl StatusUpdateStage {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for StatusUpdateStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::StatusUpdate
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let score = ctx.score.unwrap_or(0);
        let new_status = status_for_score(score);

        // Persist the score the status was derived from, including a fallback.
        let patch = LeadPatch {
            score: Some(score),
            status: Some(new_status),
            ..LeadPatch::default()
        };
        let updated = self.store.update_lead(&ctx.lead_id, &patch).await?;

        self.store
            .insert_activity(NewActivity::agent_action(
                &ctx.lead_id,
                AGENT,
                COMPLETED_SUBJECT,
                format!(
                    "Automated workflow processed lead. Score: {}, Status: {}",
                    score, new_status
                ),
                json!({
                    "workflow": "lead-processing",
                    "score": score,
                    "newStatus": new_status,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ))
            .await?;

        info!(lead_id = %ctx.lead_id, score, status = %new_status, "Lead status updated");

        Ok(StageEffect {
            new_status: Some(new_status),
            ..StageEffect::output(json!({"newStatus": new_status, "score": score})).with_lead(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_exhaustive_and_disjoint() {
        for score in 0..=100u8 {
            let expected = if score >= 80 {
                LeadStatus::Qualified
            } else if score >= 60 {
                LeadStatus::Researching
            } else if score >= 40 {
                LeadStatus::Nurturing
            } else {
                LeadStatus::New
            };
            assert_eq!(status_for_score(score), expected, "score {}", score);
        }
    }

    #[test]
    fn boundaries() {
        assert_eq!(status_for_score(80), LeadStatus::Qualified);
        assert_eq!(status_for_score(79), LeadStatus::Researching);
        assert_eq!(status_for_score(60), LeadStatus::Researching);
        assert_eq!(status_for_score(59), LeadStatus::Nurturing);
        assert_eq!(status_for_score(40), LeadStatus::Nurturing);
        assert_eq!(status_for_score(39), LeadStatus::New);
    }
}
