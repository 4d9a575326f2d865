use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::crm::{
    Activity, ActivityQuery, Company, Lead, LeadPatch, LeadQuery, NewActivity, NewCompany, NewLead,
};
use crate::storage::{RecordStore, StoreError, new_id, newest_first};

#[derive(Default)]
struct Tables {
    leads: HashMap<String, Lead>,
    activities: Vec<Activity>,
    companies: HashMap<String, Company>,
}

/// In-memory record store. Holds rows only for the lifetime of the instance.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed lead as-is (fixtures and imports).
    pub fn put_lead(&self, lead: Lead) {
        self.lock().leads.insert(lead.id.clone(), lead);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave the maps half-written.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock().leads.get(id).cloned())
    }

    async fn update_lead(&self, id: &str, patch: &LeadPatch) -> Result<Lead, StoreError> {
        let mut tables = self.lock();
        let lead = tables
            .leads
            .get_mut(id)
            .ok_or_else(|| StoreError::lead_not_found(id))?;
        lead.apply(patch);
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let lead = lead
            .into_lead(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;
        self.lock().leads.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let rows: Vec<Lead> = self
            .lock()
            .leads
            .values()
            .filter(|lead| query.matches(lead))
            .cloned()
            .collect();
        Ok(newest_first(rows, |l| l.created_at, query.limit))
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        let activity = activity.into_activity(new_id(), Utc::now());
        self.lock().activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let rows: Vec<Activity> = self
            .lock()
            .activities
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        Ok(newest_first(rows, |a| a.created_at, query.limit))
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let company = company
            .into_company(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;
        self.lock()
            .companies
            .insert(company.id.clone(), company.clone());
        Ok(company)
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, StoreError> {
        Ok(self.lock().companies.get(id).cloned())
    }

    async fn count_companies(&self) -> Result<usize, StoreError> {
        Ok(self.lock().companies.len())
    }
}
