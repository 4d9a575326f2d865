use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::locks::LeadLocks;
use crate::engine::routing::{is_fatal, transition};
use crate::engine::types::*;
use crate::stages::{Stage, StageDeps, builtin_stages};

/// Failures of the trigger surface itself. Stage failures never show up here;
/// they are recorded on the returned context.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("leadId is required and must be a non-empty string")]
    InvalidLeadId,
    #[error("workflow for lead {lead_id} exceeded {seconds}s")]
    Timeout { lead_id: String, seconds: u64 },
}

/// The lead-processing orchestrator.
///
/// Runs one stage at a time, folding each result into the context and asking
/// the transition table where to go next.
pub struct LeadWorkflow {
    stages: HashMap<WorkflowState, Arc<dyn Stage>>,
    locks: LeadLocks,
}

impl LeadWorkflow {
    pub fn new(deps: StageDeps) -> Self {
        Self::with_stages(builtin_stages(&deps))
    }

    /// Build from an explicit stage set. A later stage for the same state
    /// replaces an earlier one.
    pub fn with_stages(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into_iter().map(|s| (s.state(), s)).collect(),
            locks: LeadLocks::new(),
        }
    }

    /// Run the workflow for one lead to a terminal state.
    pub async fn execute(&self, lead_id: &str) -> WorkflowContext {
        let _guard = self.locks.acquire(lead_id).await;
        info!(lead_id = %lead_id, "Starting lead processing workflow");

        let mut ctx = WorkflowContext::new(lead_id);
        while !ctx.current_state.is_terminal() {
            let state = ctx.current_state;
            let Some(stage) = self.stages.get(&state) else {
                error!(lead_id = %lead_id, stage = %state, "No stage registered");
                ctx = ctx.fail(format!("No stage registered for state: {}", state));
                break;
            };
            ctx = run_stage(stage.as_ref(), ctx).await;
        }

        match ctx.current_state {
            WorkflowState::Completed => info!(
                lead_id = %lead_id,
                steps = ctx.steps.len(),
                score = ?ctx.score,
                status = ?ctx.new_status,
                "Workflow completed"
            ),
            _ => error!(
                lead_id = %lead_id,
                error = ctx.error.as_deref().unwrap_or("unknown"),
                "Workflow failed"
            ),
        }
        ctx
    }

    /// Validate the id and run under a wall-clock budget.
    pub async fn trigger(
        &self,
        lead_id: &str,
        budget: Duration,
    ) -> Result<WorkflowContext, WorkflowError> {
        let lead_id = lead_id.trim();
        if lead_id.is_empty() {
            return Err(WorkflowError::InvalidLeadId);
        }
        tokio::time::timeout(budget, self.execute(lead_id))
            .await
            .map_err(|_| WorkflowError::Timeout {
                lead_id: lead_id.to_string(),
                seconds: budget.as_secs(),
            })
    }
}

/// Run one stage and fold the outcome into the context.
///
/// A failing fatal stage ends the run. Any other failure is recorded on its
/// step, the stage's fallback contribution is applied, and routing continues.
async fn run_stage(stage: &dyn Stage, ctx: WorkflowContext) -> WorkflowContext {
    let state = stage.state();
    let ctx = ctx.begin_stage(state);
    debug!(lead_id = %ctx.lead_id, stage = %state, "Running stage");

    match stage.run(&ctx).await {
        Ok(mut effect) => {
            let output = std::mem::take(&mut effect.output);
            let ctx = ctx.finalize_stage(Ok(output)).absorb(effect);
            let next = transition(state, StepStatus::Completed, ctx.lead.as_ref());
            debug!(lead_id = %ctx.lead_id, stage = %state, next = %next, "Stage completed");
            ctx.route_to(next)
        }
        Err(e) => {
            let message = format!("{:#}", e);
            let ctx = ctx.finalize_stage(Err(message.clone()));
            if is_fatal(state) {
                error!(lead_id = %ctx.lead_id, stage = %state, error = %message, "Stage failed");
                return ctx.fail(message);
            }
            warn!(lead_id = %ctx.lead_id, stage = %state, error = %message, "Stage failed, continuing");
            let fallback = stage.fallback(&ctx);
            let ctx = ctx.absorb(fallback);
            let next = transition(state, StepStatus::Failed, ctx.lead.as_ref());
            ctx.route_to(next)
        }
    }
}
