pub mod json_store;
pub mod memory_store;
pub mod sql_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::crm::{
    Activity, ActivityQuery, Company, Lead, LeadPatch, LeadQuery, NewActivity, NewCompany, NewLead,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn lead_not_found(id: &str) -> Self {
        StoreError::NotFound {
            entity: "lead",
            id: id.to_string(),
        }
    }
}

/// Typed CRUD access to the CRM tables (leads, activities, companies).
///
/// Updates are last-write-wins per field; there is no cross-call transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a lead by id, `None` if it does not exist.
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, StoreError>;

    /// Apply a partial update and return the updated row. Stamps `updated_at`.
    async fn update_lead(&self, id: &str, patch: &LeadPatch) -> Result<Lead, StoreError>;

    /// Create a lead with a fresh id.
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;

    /// List leads matching the query, newest first.
    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError>;

    /// Append an activity row.
    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError>;

    /// List activities matching the query, newest first.
    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError>;

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError>;

    async fn get_company(&self, id: &str) -> Result<Option<Company>, StoreError>;

    async fn count_companies(&self) -> Result<usize, StoreError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sort newest first and cut to the optional limit.
pub(crate) fn newest_first<T>(
    mut rows: Vec<T>,
    created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
    limit: Option<usize>,
) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}
