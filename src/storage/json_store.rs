use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::warn;

use crate::crm::{
    Activity, ActivityQuery, Company, Lead, LeadPatch, LeadQuery, NewActivity, NewCompany, NewLead,
};
use crate::storage::{RecordStore, StoreError, new_id, newest_first};

const LEADS: &str = "leads";
const ACTIVITIES: &str = "activities";
const COMPANIES: &str = "companies";

/// File-based JSON record store. Each row is a separate JSON file under
/// `<base_dir>/<table>/<id>.json`.
pub struct JsonRecordStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonRecordStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn row_path(&self, table: &str, id: &str) -> PathBuf {
        self.base_dir.join(table).join(format!("{}.json", id))
    }

    async fn read_row<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        // Ids become file names; anything path-like cannot name a row.
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Ok(None);
        }
        let path = self.row_path(table, id);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_row<T: Serialize>(&self, table: &str, id: &str, row: &T) -> Result<(), StoreError> {
        let dir = self.base_dir.join(table);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.row_path(table, id);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(row)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    async fn read_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, StoreError> {
        let dir = self.base_dir.join(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<T>(&data) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable row"),
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, StoreError> {
        let _lock = self.lock.read().await;
        self.read_row(LEADS, id).await
    }

    async fn update_lead(&self, id: &str, patch: &LeadPatch) -> Result<Lead, StoreError> {
        let _lock = self.lock.write().await;
        let mut lead: Lead = self
            .read_row(LEADS, id)
            .await?
            .ok_or_else(|| StoreError::lead_not_found(id))?;
        lead.apply(patch);
        lead.updated_at = Utc::now();
        self.write_row(LEADS, id, &lead).await?;
        Ok(lead)
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let lead = lead
            .into_lead(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;
        let _lock = self.lock.write().await;
        self.write_row(LEADS, &lead.id, &lead).await?;
        Ok(lead)
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let _lock = self.lock.read().await;
        let rows: Vec<Lead> = self
            .read_table::<Lead>(LEADS)
            .await?
            .into_iter()
            .filter(|lead| query.matches(lead))
            .collect();
        Ok(newest_first(rows, |l| l.created_at, query.limit))
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        let activity = activity.into_activity(new_id(), Utc::now());
        let _lock = self.lock.write().await;
        self.write_row(ACTIVITIES, &activity.id, &activity).await?;
        Ok(activity)
    }

    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let _lock = self.lock.read().await;
        let rows: Vec<Activity> = self
            .read_table::<Activity>(ACTIVITIES)
            .await?
            .into_iter()
            .filter(|a| query.matches(a))
            .collect();
        Ok(newest_first(rows, |a| a.created_at, query.limit))
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let company = company
            .into_company(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;
        let _lock = self.lock.write().await;
        self.write_row(COMPANIES, &company.id, &company).await?;
        Ok(company)
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, StoreError> {
        let _lock = self.lock.read().await;
        self.read_row(COMPANIES, id).await
    }

    async fn count_companies(&self) -> Result<usize, StoreError> {
        let _lock = self.lock.read().await;
        Ok(self.read_table::<Company>(COMPANIES).await?.len())
    }
}
