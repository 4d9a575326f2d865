use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::crm::types::{Activity, ActivityQuery, ActivityType, Lead, LeadQuery, NewActivity, NewLead, filled};
use crate::storage::{RecordStore, StoreError};

pub const RECENT_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("A lead with email {0} already exists")]
    DuplicateEmail(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A lead with its latest activities, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetail {
    pub lead: Lead,
    pub recent_activities: Vec<Activity>,
}

/// Create a lead by hand. Emails are stored lowercase and must be unique.
/// Records a "Lead Created" note on the new lead.
pub async fn create_lead(store: &dyn RecordStore, mut new_lead: NewLead) -> Result<Lead, LeadError> {
    new_lead.email = new_lead
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    if let Some(ref email) = new_lead.email {
        let existing = store.list_leads(&LeadQuery::default()).await?;
        if existing
            .iter()
            .any(|lead| lead.email.as_deref() == Some(email.as_str()))
        {
            return Err(LeadError::DuplicateEmail(email.clone()));
        }
    }

    let lead = store.insert_lead(new_lead).await?;
    store
        .insert_activity(NewActivity {
            lead_id: lead.id.clone(),
            activity_type: ActivityType::Note,
            subject: Some("Lead Created".to_string()),
            content: Some(format!(
                "New lead manually added: {} from {}",
                lead.full_name(),
                filled(&lead.company_name).unwrap_or("Unknown Company")
            )),
            metadata: json!({
                "source": lead.source,
                "created_by": "user",
                "timestamp": Utc::now().to_rfc3339(),
            }),
            agent_id: None,
        })
        .await?;

    info!(lead_id = %lead.id, "Lead created");
    Ok(lead)
}

/// Fetch a lead and its five most recent activities.
pub async fn lead_detail(store: &dyn RecordStore, id: &str) -> Result<Option<LeadDetail>, StoreError> {
    let Some(lead) = store.get_lead(id).await? else {
        return Ok(None);
    };
    let recent_activities = store
        .list_activities(&ActivityQuery {
            limit: Some(RECENT_ACTIVITY_LIMIT),
            ..ActivityQuery::for_lead(id)
        })
        .await?;
    Ok(Some(LeadDetail {
        lead,
        recent_activities,
    }))
}
