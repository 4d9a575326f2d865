use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline status of a lead, ordered by sales intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Researching,
    Qualified,
    Contacted,
    Engaged,
    Nurturing,
    Won,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Researching,
        LeadStatus::Qualified,
        LeadStatus::Contacted,
        LeadStatus::Engaged,
        LeadStatus::Nurturing,
        LeadStatus::Won,
        LeadStatus::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Researching => "researching",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Engaged => "engaged",
            LeadStatus::Nurturing => "nurturing",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid lead status '{}'. Use: new, researching, qualified, contacted, engaged, nurturing, won, lost",
                    s
                )
            })
    }
}

/// Where a lead record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    #[default]
    Manual,
    AgentDiscovery,
    Inbound,
    Referral,
    Import,
}

impl LeadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadSource::Manual => "manual",
            LeadSource::AgentDiscovery => "agent_discovery",
            LeadSource::Inbound => "inbound",
            LeadSource::Referral => "referral",
            LeadSource::Import => "import",
        }
    }
}

impl std::str::FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(LeadSource::Manual),
            "agent_discovery" => Ok(LeadSource::AgentDiscovery),
            "inbound" => Ok(LeadSource::Inbound),
            "referral" => Ok(LeadSource::Referral),
            "import" => Ok(LeadSource::Import),
            other => Err(format!("Invalid lead source '{}'", other)),
        }
    }
}

/// A prospective contact tracked through the sales pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub status: LeadStatus,
    /// Always within 0..=100.
    #[serde(default)]
    pub score: u8,

    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,

    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub source_details: Option<String>,

    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub research_summary: Option<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub buying_signals: Vec<String>,
    #[serde(default)]
    pub personal_notes: Option<String>,

    #[serde(default)]
    pub owner_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

/// Returns the trimmed value when the field carries something other than whitespace.
pub fn filled(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Lead {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn has_email(&self) -> bool {
        filled(&self.email).is_some()
    }

    pub fn has_linkedin(&self) -> bool {
        filled(&self.linkedin_url).is_some()
    }

    pub fn has_twitter(&self) -> bool {
        filled(&self.twitter_url).is_some()
    }

    /// Apply a partial update in place. Stores call this and then stamp `updated_at`.
    pub fn apply(&mut self, patch: &LeadPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(score) = patch.score {
            self.score = score.min(100);
        }
        if let Some(ref v) = patch.email {
            self.email = Some(v.clone());
        }
        if let Some(ref v) = patch.phone {
            self.phone = Some(v.clone());
        }
        if let Some(ref v) = patch.title {
            self.title = Some(v.clone());
        }
        if let Some(ref v) = patch.company_name {
            self.company_name = Some(v.clone());
        }
        if let Some(ref v) = patch.linkedin_url {
            self.linkedin_url = Some(v.clone());
        }
        if let Some(ref v) = patch.twitter_url {
            self.twitter_url = Some(v.clone());
        }
        if let Some(ref v) = patch.location {
            self.location = Some(v.clone());
        }
        if let Some(ref v) = patch.research_summary {
            self.research_summary = Some(v.clone());
        }
        if let Some(ref v) = patch.pain_points {
            self.pain_points = v.clone();
        }
        if let Some(ref v) = patch.buying_signals {
            self.buying_signals = v.clone();
        }
        if let Some(ref v) = patch.personal_notes {
            self.personal_notes = Some(v.clone());
        }
        if let Some(at) = patch.last_contacted_at {
            self.last_contacted_at = Some(at);
        }
    }
}

/// Partial lead update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pain_points: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_signals: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<DateTime<Utc>>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        *self == LeadPatch::default()
    }

    /// Names of the fields this patch sets, in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let checks: [(&'static str, bool); 14] = [
            ("status", self.status.is_some()),
            ("score", self.score.is_some()),
            ("email", self.email.is_some()),
            ("phone", self.phone.is_some()),
            ("title", self.title.is_some()),
            ("company_name", self.company_name.is_some()),
            ("linkedin_url", self.linkedin_url.is_some()),
            ("twitter_url", self.twitter_url.is_some()),
            ("location", self.location.is_some()),
            ("research_summary", self.research_summary.is_some()),
            ("pain_points", self.pain_points.is_some()),
            ("buying_signals", self.buying_signals.is_some()),
            ("personal_notes", self.personal_notes.is_some()),
            ("last_contacted_at", self.last_contacted_at.is_some()),
        ];
        for (name, set) in checks {
            if set {
                names.push(name);
            }
        }
        names
    }
}

/// Input for creating a lead. Email is optional; the contact finder fills it later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub personal_notes: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub source_details: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewLead {
    /// Build the stored record, rejecting leads without identity fields.
    pub fn into_lead(self, id: String, now: DateTime<Utc>) -> Result<Lead, String> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err("first_name and last_name are required".to_string());
        }

        Ok(Lead {
            id,
            status: LeadStatus::New,
            score: 0,
            first_name,
            last_name,
            email: non_blank(self.email),
            phone: non_blank(self.phone),
            title: non_blank(self.title),
            company_id: non_blank(self.company_id),
            company_name: non_blank(self.company_name),
            source: self.source.unwrap_or_default(),
            source_details: non_blank(self.source_details),
            linkedin_url: non_blank(self.linkedin_url),
            twitter_url: non_blank(self.twitter_url),
            location: non_blank(self.location),
            timezone: None,
            research_summary: None,
            pain_points: Vec::new(),
            buying_signals: Vec::new(),
            personal_notes: non_blank(self.personal_notes),
            owner_id: None,
            created_at: now,
            updated_at: now,
            last_contacted_at: None,
            custom_fields: serde_json::Map::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    EmailSent,
    EmailReceived,
    Call,
    Meeting,
    Note,
    StatusChange,
    AgentAction,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::EmailSent => "email_sent",
            ActivityType::EmailReceived => "email_received",
            ActivityType::Call => "call",
            ActivityType::Meeting => "meeting",
            ActivityType::Note => "note",
            ActivityType::StatusChange => "status_change",
            ActivityType::AgentAction => "agent_action",
        }
    }
}

impl std::str::FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_sent" => Ok(ActivityType::EmailSent),
            "email_received" => Ok(ActivityType::EmailReceived),
            "call" => Ok(ActivityType::Call),
            "meeting" => Ok(ActivityType::Meeting),
            "note" => Ok(ActivityType::Note),
            "status_change" => Ok(ActivityType::StatusChange),
            "agent_action" => Ok(ActivityType::AgentAction),
            other => Err(format!("Invalid activity type '{}'", other)),
        }
    }
}

/// Persisted, immutable record of something that happened to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub lead_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub lead_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl NewActivity {
    /// An `agent_action` activity attributed to one of the workflow agents.
    pub fn agent_action(
        lead_id: &str,
        agent: &str,
        subject: impl Into<String>,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            lead_id: lead_id.to_string(),
            activity_type: ActivityType::AgentAction,
            subject: Some(subject.into()),
            content: Some(content.into()),
            metadata,
            agent_id: Some(agent.to_string()),
        }
    }

    pub fn into_activity(self, id: String, now: DateTime<Utc>) -> Activity {
        Activity {
            id,
            lead_id: self.lead_id,
            activity_type: self.activity_type,
            subject: self.subject,
            content: self.content,
            metadata: self.metadata,
            agent_id: self.agent_id,
            user_id: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCompany {
    pub fn into_company(self, id: String, now: DateTime<Utc>) -> Result<Company, String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err("company name is required".to_string());
        }
        Ok(Company {
            id,
            name,
            domain: non_blank(self.domain),
            industry: non_blank(self.industry),
            size: non_blank(self.size),
            location: non_blank(self.location),
            description: non_blank(self.description),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Filter for listing leads. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQuery {
    /// Case-insensitive match over name, company, title and research summary.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub min_score: Option<u8>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LeadQuery {
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(status) = self.status
            && lead.status != status
        {
            return false;
        }
        if let Some(min) = self.min_score
            && lead.score < min
        {
            return false;
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            let haystacks = [
                Some(lead.first_name.as_str()),
                Some(lead.last_name.as_str()),
                lead.company_name.as_deref(),
                lead.title.as_deref(),
                lead.research_summary.as_deref(),
            ];
            return haystacks
                .into_iter()
                .flatten()
                .any(|h| h.to_lowercase().contains(&needle));
        }
        true
    }
}

/// Filter for listing activities. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub lead_id: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub subject_contains: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ActivityQuery {
    pub fn for_lead(lead_id: &str) -> Self {
        Self {
            lead_id: Some(lead_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        if let Some(ref lead_id) = self.lead_id
            && &activity.lead_id != lead_id
        {
            return false;
        }
        if let Some(kind) = self.activity_type
            && activity.activity_type != kind
        {
            return false;
        }
        if let Some(ref needle) = self.subject_contains {
            let subject = activity.subject.as_deref().unwrap_or_default();
            if !subject.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since
            && activity.created_at < since
        {
            return false;
        }
        true
    }
}
