use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Arguments, Row};
use tracing::info;

use crate::crm::{
    Activity, ActivityQuery, ActivityType, Company, Lead, LeadPatch, LeadQuery, LeadStatus,
    NewActivity, NewCompany, NewLead,
};
use crate::storage::{RecordStore, StoreError, new_id, newest_first};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        score INTEGER NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        title TEXT,
        company_id TEXT,
        company_name TEXT,
        source TEXT NOT NULL,
        source_details TEXT,
        linkedin_url TEXT,
        twitter_url TEXT,
        location TEXT,
        timezone TEXT,
        research_summary TEXT,
        pain_points TEXT NOT NULL,
        buying_signals TEXT NOT NULL,
        personal_notes TEXT,
        owner_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_contacted_at TEXT,
        custom_fields TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        lead_id TEXT NOT NULL,
        type TEXT NOT NULL,
        subject TEXT,
        content TEXT,
        metadata TEXT NOT NULL,
        agent_id TEXT,
        user_id TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS companies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        domain TEXT,
        industry TEXT,
        size TEXT,
        location TEXT,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

const LEAD_COLUMNS: &str = "id, status, score, first_name, last_name, email, phone, title, \
    company_id, company_name, source, source_details, linkedin_url, twitter_url, location, \
    timezone, research_summary, pain_points, buying_signals, personal_notes, owner_id, \
    created_at, updated_at, last_contacted_at, custom_fields";

/// Relational record store over an sqlx `Any` pool (sqlite by default,
/// postgres with the `postgres` feature).
pub struct SqlRecordStore {
    pool: AnyPool,
}

impl SqlRecordStore {
    /// Connect and create the CRM tables if they are missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        // Install any drivers that are compiled in
        sqlx::any::install_default_drivers();

        // Every sqlite in-memory connection is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected record store to {}", redact(url));
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn redact(url: &str) -> String {
    match url.split_once('@') {
        Some((scheme_and_user, host)) => {
            let scheme = scheme_and_user.split("://").next().unwrap_or("db");
            format!("{}://***@{}", scheme, host)
        }
        None => url.to_string(),
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp '{}': {}", value, e)))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(parse_ts).transpose()
}

fn bind_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(format!("failed to bind parameter: {}", e))
}

fn lead_from_row(row: &AnyRow) -> Result<Lead, StoreError> {
    let status: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;
    let score: i64 = row.try_get("score")?;
    let pain_points: String = row.try_get("pain_points")?;
    let buying_signals: String = row.try_get("buying_signals")?;
    let custom_fields: String = row.try_get("custom_fields")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Lead {
        id: row.try_get("id")?,
        status: status.parse().map_err(StoreError::Decode)?,
        score: score.clamp(0, 100) as u8,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        title: row.try_get("title")?,
        company_id: row.try_get("company_id")?,
        company_name: row.try_get("company_name")?,
        source: source.parse().map_err(StoreError::Decode)?,
        source_details: row.try_get("source_details")?,
        linkedin_url: row.try_get("linkedin_url")?,
        twitter_url: row.try_get("twitter_url")?,
        location: row.try_get("location")?,
        timezone: row.try_get("timezone")?,
        research_summary: row.try_get("research_summary")?,
        pain_points: serde_json::from_str(&pain_points)?,
        buying_signals: serde_json::from_str(&buying_signals)?,
        personal_notes: row.try_get("personal_notes")?,
        owner_id: row.try_get("owner_id")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        last_contacted_at: parse_opt_ts(row.try_get("last_contacted_at")?)?,
        custom_fields: serde_json::from_str(&custom_fields)?,
    })
}

fn activity_from_row(row: &AnyRow) -> Result<Activity, StoreError> {
    let kind: String = row.try_get("type")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Activity {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        activity_type: kind.parse().map_err(StoreError::Decode)?,
        subject: row.try_get("subject")?,
        content: row.try_get("content")?,
        metadata: serde_json::from_str(&metadata)?,
        agent_id: row.try_get("agent_id")?,
        user_id: row.try_get("user_id")?,
        created_at: parse_ts(&created_at)?,
    })
}

fn company_from_row(row: &AnyRow) -> Result<Company, StoreError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        industry: row.try_get("industry")?,
        size: row.try_get("size")?,
        location: row.try_get("location")?,
        description: row.try_get("description")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

/// Column/value pairs for the fields a patch sets.
fn patch_assignments(patch: &LeadPatch) -> Result<Vec<(&'static str, Option<String>, Option<i64>)>, StoreError> {
    let mut sets: Vec<(&'static str, Option<String>, Option<i64>)> = Vec::new();
    if let Some(status) = patch.status {
        sets.push(("status", Some(status.to_string()), None));
    }
    if let Some(score) = patch.score {
        sets.push(("score", None, Some(i64::from(score.min(100)))));
    }
    let text_fields = [
        ("email", &patch.email),
        ("phone", &patch.phone),
        ("title", &patch.title),
        ("company_name", &patch.company_name),
        ("linkedin_url", &patch.linkedin_url),
        ("twitter_url", &patch.twitter_url),
        ("location", &patch.location),
        ("research_summary", &patch.research_summary),
        ("personal_notes", &patch.personal_notes),
    ];
    for (column, value) in text_fields {
        if let Some(v) = value {
            sets.push((column, Some(v.clone()), None));
        }
    }
    if let Some(ref points) = patch.pain_points {
        sets.push(("pain_points", Some(serde_json::to_string(points)?), None));
    }
    if let Some(ref signals) = patch.buying_signals {
        sets.push(("buying_signals", Some(serde_json::to_string(signals)?), None));
    }
    if let Some(at) = patch.last_contacted_at {
        sets.push(("last_contacted_at", Some(ts(at)), None));
    }
    Ok(sets)
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, StoreError> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn update_lead(&self, id: &str, patch: &LeadPatch) -> Result<Lead, StoreError> {
        let sets = patch_assignments(patch)?;

        let mut args = AnyArguments::default();
        let mut clauses = Vec::with_capacity(sets.len() + 1);
        for (i, (column, text, int)) in sets.into_iter().enumerate() {
            clauses.push(format!("{} = ${}", column, i + 1));
            match int {
                Some(n) => args.add(n).map_err(bind_err)?,
                None => args.add(text).map_err(bind_err)?,
            }
        }
        clauses.push(format!("updated_at = ${}", clauses.len() + 1));
        args.add(ts(Utc::now())).map_err(bind_err)?;
        let id_param = clauses.len() + 1;
        args.add(id.to_string()).map_err(bind_err)?;

        let sql = format!(
            "UPDATE leads SET {} WHERE id = ${}",
            clauses.join(", "),
            id_param
        );
        let result = sqlx::query_with(&sql, args).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::lead_not_found(id));
        }

        self.get_lead(id)
            .await?
            .ok_or_else(|| StoreError::lead_not_found(id))
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let lead = lead
            .into_lead(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;

        let sql = format!(
            "INSERT INTO leads ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
            LEAD_COLUMNS
        );
        sqlx::query(&sql)
            .bind(lead.id.clone())
            .bind(lead.status.to_string())
            .bind(i64::from(lead.score))
            .bind(lead.first_name.clone())
            .bind(lead.last_name.clone())
            .bind(lead.email.clone())
            .bind(lead.phone.clone())
            .bind(lead.title.clone())
            .bind(lead.company_id.clone())
            .bind(lead.company_name.clone())
            .bind(lead.source.as_str().to_string())
            .bind(lead.source_details.clone())
            .bind(lead.linkedin_url.clone())
            .bind(lead.twitter_url.clone())
            .bind(lead.location.clone())
            .bind(lead.timezone.clone())
            .bind(lead.research_summary.clone())
            .bind(serde_json::to_string(&lead.pain_points)?)
            .bind(serde_json::to_string(&lead.buying_signals)?)
            .bind(lead.personal_notes.clone())
            .bind(lead.owner_id.clone())
            .bind(ts(lead.created_at))
            .bind(ts(lead.updated_at))
            .bind(lead.last_contacted_at.map(ts))
            .bind(serde_json::to_string(&lead.custom_fields)?)
            .execute(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let rows = match query.status {
            Some(status) => {
                let sql = format!("SELECT {} FROM leads WHERE status = $1", LEAD_COLUMNS);
                sqlx::query(&sql)
                    .bind(status.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {} FROM leads", LEAD_COLUMNS);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        let mut leads = Vec::with_capacity(rows.len());
        for row in &rows {
            let lead = lead_from_row(row)?;
            if query.matches(&lead) {
                leads.push(lead);
            }
        }
        Ok(newest_first(leads, |l| l.created_at, query.limit))
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        let activity = activity.into_activity(new_id(), Utc::now());
        sqlx::query(
            "INSERT INTO activities (id, lead_id, type, subject, content, metadata, agent_id, user_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(activity.id.clone())
        .bind(activity.lead_id.clone())
        .bind(activity.activity_type.as_str().to_string())
        .bind(activity.subject.clone())
        .bind(activity.content.clone())
        .bind(serde_json::to_string(&activity.metadata)?)
        .bind(activity.agent_id.clone())
        .bind(activity.user_id.clone())
        .bind(ts(activity.created_at))
        .execute(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let select = "SELECT id, lead_id, type, subject, content, metadata, agent_id, user_id, created_at FROM activities";
        let rows = match (&query.lead_id, query.activity_type) {
            (Some(lead_id), _) => {
                sqlx::query(&format!("{} WHERE lead_id = $1", select))
                    .bind(lead_id.clone())
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, Some(kind)) => {
                sqlx::query(&format!("{} WHERE type = $1", select))
                    .bind(kind.as_str().to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => sqlx::query(select).fetch_all(&self.pool).await?,
        };

        let mut activities = Vec::with_capacity(rows.len());
        for row in &rows {
            let activity = activity_from_row(row)?;
            if query.matches(&activity) {
                activities.push(activity);
            }
        }
        Ok(newest_first(activities, |a| a.created_at, query.limit))
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let company = company
            .into_company(new_id(), Utc::now())
            .map_err(StoreError::Invalid)?;
        sqlx::query(
            "INSERT INTO companies (id, name, domain, industry, size, location, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(company.id.clone())
        .bind(company.name.clone())
        .bind(company.domain.clone())
        .bind(company.industry.clone())
        .bind(company.size.clone())
        .bind(company.location.clone())
        .bind(company.description.clone())
        .bind(ts(company.created_at))
        .bind(ts(company.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(company)
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, domain, industry, size, location, description, created_at, updated_at \
             FROM companies WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(company_from_row).transpose()
    }

    async fn count_companies(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM companies")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as usize)
    }
}
