use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::crm::LeadStatus;
use crate::engine::types::{StepStatus, WorkflowContext, WorkflowState};

/// Read-only view of a run for display and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub lead_id: String,
    pub status: WorkflowState,
    /// Whole seconds, measured to `completedAt` or to now while running.
    pub duration: i64,
    pub steps: Vec<StepSummary>,
    pub final_score: Option<u8>,
    pub final_status: Option<LeadStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: WorkflowState,
    pub status: StepStatus,
    /// Whole seconds; `None` while the step is open.
    pub duration: Option<i64>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

fn rounded_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds();
    (millis as f64 / 1000.0).round() as i64
}

pub fn get_workflow_summary(context: &WorkflowContext) -> WorkflowSummary {
    summarize_at(context, Utc::now())
}

fn summarize_at(context: &WorkflowContext, now: DateTime<Utc>) -> WorkflowSummary {
    WorkflowSummary {
        lead_id: context.lead_id.clone(),
        status: context.current_state,
        duration: rounded_seconds(context.started_at, context.completed_at.unwrap_or(now)),
        steps: context
            .steps
            .iter()
            .map(|step| StepSummary {
                name: step.state,
                status: step.status,
                duration: step
                    .completed_at
                    .map(|done| rounded_seconds(step.started_at, done)),
                output: step.output.clone(),
                error: step.error.clone(),
            })
            .collect(),
        final_score: context.score,
        final_status: context.new_status,
        error: context.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn durations_round_to_seconds() {
        let mut ctx = WorkflowContext::new("l1")
            .begin_stage(WorkflowState::Discovery)
            .finalize_stage(Ok(json!({"leadFound": true})))
            .begin_stage(WorkflowState::Enrichment);
        let start = ctx.started_at;
        ctx.steps[0].started_at = start;
        ctx.steps[0].completed_at = Some(start + Duration::milliseconds(1600));

        let summary = summarize_at(&ctx, start + Duration::milliseconds(2400));
        assert_eq!(summary.duration, 2);
        assert_eq!(summary.steps[0].duration, Some(2));
        assert_eq!(summary.steps[1].duration, None);
        assert_eq!(summary.steps[1].status, StepStatus::Running);
    }

    #[test]
    fn completed_runs_measure_to_completion() {
        let mut ctx = WorkflowContext::new("l1").fail("Lead not found: l1");
        ctx.completed_at = Some(ctx.started_at + Duration::seconds(3));
        let summary = summarize_at(&ctx, ctx.started_at + Duration::seconds(60));
        assert_eq!(summary.duration, 3);
        assert_eq!(summary.status, WorkflowState::Failed);
        assert_eq!(summary.error.as_deref(), Some("Lead not found: l1"));

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["leadId"], "l1");
        assert_eq!(value["status"], "failed");
        assert!(value.get("finalScore").is_some());
    }
}
