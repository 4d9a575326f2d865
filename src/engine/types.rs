use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crm::{Lead, LeadStatus};

pub use crate::agents::EnrichmentData;

/// Position of a run in the lead-processing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Discovery,
    ProfileScraper,
    ContactFinder,
    Enrichment,
    Scoring,
    StatusUpdate,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Discovery => "discovery",
            WorkflowState::ProfileScraper => "profile_scraper",
            WorkflowState::ContactFinder => "contact_finder",
            WorkflowState::Enrichment => "enrichment",
            WorkflowState::Scoring => "scoring",
            WorkflowState::StatusUpdate => "status_update",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one audit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one stage execution. Finalized once, never changed after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub state: WorkflowState,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowStep {
    pub fn is_skipped(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.get("skipped"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// What a stage contributes to the context. Only the set fields change it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageEffect {
    pub output: Value,
    pub lead: Option<Lead>,
    pub enrichment: Option<EnrichmentData>,
    pub score: Option<u8>,
    pub new_status: Option<LeadStatus>,
}

impl StageEffect {
    pub fn output(output: Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn with_lead(mut self, lead: Lead) -> Self {
        self.lead = Some(lead);
        self
    }
}

/// Per-run aggregate threaded through the stages.
///
/// Every transition consumes the context and returns the next one, so a run
/// is a fold over stage results and `steps` is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub lead_id: String,
    pub current_state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<Lead>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_data: Option<EnrichmentData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowContext {
    pub fn new(lead_id: &str) -> Self {
        Self {
            lead_id: lead_id.to_string(),
            current_state: WorkflowState::Discovery,
            lead: None,
            enrichment_data: None,
            score: None,
            new_status: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
        }
    }

    /// Open a running step for `state`.
    pub fn begin_stage(mut self, state: WorkflowState) -> Self {
        self.current_state = state;
        self.steps.push(WorkflowStep {
            state,
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
        });
        self
    }

    /// Close the open step with its output or error. A no-op when no step is
    /// running.
    pub fn finalize_stage(mut self, result: Result<Value, String>) -> Self {
        if let Some(step) = self
            .steps
            .last_mut()
            .filter(|s| s.status == StepStatus::Running)
        {
            step.completed_at = Some(Utc::now());
            match result {
                Ok(output) => {
                    step.status = StepStatus::Completed;
                    step.output = Some(output);
                }
                Err(error) => {
                    step.status = StepStatus::Failed;
                    step.error = Some(error);
                }
            }
        }
        self
    }

    /// Fold a stage's contribution (minus its step output) into the context.
    pub fn absorb(mut self, effect: StageEffect) -> Self {
        if let Some(lead) = effect.lead {
            self.lead = Some(lead);
        }
        if let Some(enrichment) = effect.enrichment {
            self.enrichment_data = Some(enrichment);
        }
        if let Some(score) = effect.score {
            self.score = Some(score.min(100));
        }
        if let Some(status) = effect.new_status {
            self.new_status = Some(status);
        }
        self
    }

    pub fn route_to(mut self, state: WorkflowState) -> Self {
        self.current_state = state;
        if state.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self
    }

    /// Terminal failure.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.route_to(WorkflowState::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.current_state == WorkflowState::Completed
    }

    pub fn last_step(&self) -> Option<&WorkflowStep> {
        self.steps.last()
    }
}
