pub mod contact_finder;
pub mod discovery;
pub mod enrichment;
pub mod profile_scraper;
pub mod scoring;
pub mod status_update;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::crm::{Lead, NewActivity, filled};
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};
use crate::extraction::Extraction;
use crate::research::Research;
use crate::storage::RecordStore;

pub use contact_finder::ContactFinderStage;
pub use discovery::DiscoveryStage;
pub use enrichment::EnrichmentStage;
pub use profile_scraper::ProfileScraperStage;
pub use scoring::ScoringStage;
pub use status_update::StatusUpdateStage;

/// Capabilities every stage may call. Injected once, shared by all stages.
#[derive(Clone)]
pub struct StageDeps {
    pub store: Arc<dyn RecordStore>,
    pub research: Arc<dyn Research>,
    pub extraction: Arc<dyn Extraction>,
}

/// One step of the lead-processing state machine.
///
/// A stage reads the context and returns what it contributes. It never
/// routes: the orchestrator picks the next state from the transition table.
#[async_trait]
pub trait Stage: Send + Sync {
    fn state(&self) -> WorkflowState;

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect>;

    /// Contribution to apply when `run` fails and the failure is recoverable.
    fn fallback(&self, _ctx: &WorkflowContext) -> StageEffect {
        StageEffect::default()
    }
}

/// The six built-in stages.
pub fn builtin_stages(deps: &StageDeps) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(DiscoveryStage::new(deps.store.clone())),
        Arc::new(ProfileScraperStage::new(deps.clone())),
        Arc::new(ContactFinderStage::new(deps.clone())),
        Arc::new(EnrichmentStage::new(deps.clone())),
        Arc::new(ScoringStage::new(deps.store.clone(), deps.extraction.clone())),
        Arc::new(StatusUpdateStage::new(deps.store.clone())),
    ]
}

pub(crate) fn require_lead(ctx: &WorkflowContext) -> Result<&Lead> {
    ctx.lead
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No lead data available"))
}

/// Append an activity once the lead update has committed. A failed insert is
/// logged and returned as a message for the step output; it never discards
/// the updated lead.
pub(crate) async fn record_activity(store: &dyn RecordStore, activity: NewActivity) -> Option<String> {
    let lead_id = activity.lead_id.clone();
    match store.insert_activity(activity).await {
        Ok(_) => None,
        Err(e) => {
            warn!(lead_id = %lead_id, error = %e, "Failed to record activity");
            Some(e.to_string())
        }
    }
}

/// Add `activityError` to an object output when the activity insert failed.
pub(crate) fn note_activity_error(output: &mut Value, error: Option<String>) {
    if let (Value::Object(map), Some(error)) = (output, error) {
        map.insert("activityError".to_string(), Value::String(error));
    }
}

/// Set `slot` to `candidate` only when the lead has no value for the field.
pub(crate) fn fill_missing(
    slot: &mut Option<String>,
    current: &Option<String>,
    candidate: Option<&String>,
) {
    if filled(current).is_some() {
        return;
    }
    if let Some(value) = candidate.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        *slot = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_missing_never_overwrites() {
        let mut slot = None;
        fill_missing(&mut slot, &Some("CTO".into()), Some(&"VP".to_string()));
        assert_eq!(slot, None);

        fill_missing(&mut slot, &Some("  ".into()), Some(&"VP".to_string()));
        assert_eq!(slot.as_deref(), Some("VP"));

        let mut slot = None;
        fill_missing(&mut slot, &None, Some(&" ".to_string()));
        assert_eq!(slot, None);
    }
}
