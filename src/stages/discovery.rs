use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::engine::routing::Routing;
use crate::engine::types::{StageEffect, WorkflowContext, WorkflowState};
use crate::storage::RecordStore;

use super::Stage;

/// Loads the lead and checks its identity fields. Email is optional here;
/// the contact finder exists to fill it.
pub struct DiscoveryStage {
    store: Arc<dyn RecordStore>,
}

impl DiscoveryStage {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for DiscoveryStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::Discovery
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let lead = self
            .store
            .get_lead(&ctx.lead_id)
            .await
            .with_context(|| format!("Failed to load lead {}", ctx.lead_id))?;
        let Some(lead) = lead else {
            bail!("Lead not found: {}", ctx.lead_id);
        };

        if lead.first_name.trim().is_empty() || lead.last_name.trim().is_empty() {
            bail!("Lead must have a first and last name");
        }

        let routing = Routing::for_lead(&lead);
        info!(
            lead_id = %lead.id,
            has_profiles_to_scrape = routing.has_profiles_to_scrape,
            needs_contact_finding = routing.needs_contact_finding,
            "Lead discovered"
        );

        Ok(StageEffect::output(json!({
            "leadFound": true,
            "hasProfilesToScrape": routing.has_profiles_to_scrape,
            "needsContactFinding": routing.needs_contact_finding,
        }))
        .with_lead(lead))
    }
}
