//! Integration tests for the lead-processing workflow, run against
//! deterministic research and extraction fakes.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use leadflow::crm::{
    Activity, ActivityQuery, ActivityType, Company, Lead, LeadPatch, LeadQuery, LeadStatus,
    NewActivity, NewCompany, NewLead,
};
use leadflow::engine::types::{StageEffect, StepStatus, WorkflowContext, WorkflowState};
use leadflow::engine::{LeadWorkflow, WorkflowError, get_workflow_summary};
use leadflow::extraction::{Extraction, ExtractionRequest, ExtractionTask};
use leadflow::llm::StructuredOutput;
use leadflow::research::{Research, ScrapeResult};
use leadflow::stages::{Stage, StageDeps, builtin_stages};
use leadflow::storage::memory_store::MemoryRecordStore;
use leadflow::storage::{RecordStore, StoreError};

// --- Fakes ---

#[derive(Default)]
struct FakeResearch {
    fail_search: bool,
    /// Scrapes of URLs containing this fragment fail outright.
    fail_scrape_for: Option<&'static str>,
}

#[async_trait]
impl Research for FakeResearch {
    async fn search(&self, query: &str) -> Result<String> {
        if self.fail_search {
            bail!("search provider unreachable");
        }
        Ok(format!("Results for {}", query))
    }

    async fn scrape_page(&self, url: &str) -> Result<ScrapeResult> {
        if self.fail_scrape_for.is_some_and(|fragment| url.contains(fragment)) {
            bail!("scrape: request failed: timeout");
        }
        Ok(ScrapeResult::page(format!("# Profile\nScraped from {}", url)))
    }
}

fn kind(task: ExtractionTask) -> &'static str {
    match task {
        ExtractionTask::Profile(_) => "profile",
        ExtractionTask::Contact => "contact",
        ExtractionTask::Enrichment => "enrichment",
        ExtractionTask::Scoring => "scoring",
    }
}

/// Answers each task with a canned JSON object. `None` answers are prose
/// with no JSON in them; tasks listed in `failing` return an error.
struct FakeExtraction {
    profile: Option<Value>,
    contact: Option<Value>,
    enrichment: Option<Value>,
    scoring: Option<Value>,
    failing: Vec<&'static str>,
    calls: Mutex<Vec<&'static str>>,
}

impl Default for FakeExtraction {
    fn default() -> Self {
        Self {
            profile: Some(json!({"title": "VP Eng", "confidence": "high"})),
            contact: Some(json!({"email": "a@b.com", "confidence": "high", "searchSummary": "found"})),
            enrichment: Some(json!({
                "researchSummary": "Builds developer tools",
                "painPoints": ["slow CI", "flaky tests"],
                "buyingSignals": ["hiring platform engineers"]
            })),
            scoring: Some(json!({"score": 85, "reasoning": "strong fit"})),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeExtraction {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extraction for FakeExtraction {
    async fn extract(&self, request: ExtractionRequest) -> Result<StructuredOutput> {
        let kind = kind(request.task);
        self.calls.lock().unwrap().push(kind);
        if self.failing.contains(&kind) {
            bail!("{} model call failed", kind);
        }
        let answer = match kind {
            "profile" => &self.profile,
            "contact" => &self.contact,
            "enrichment" => &self.enrichment,
            _ => &self.scoring,
        };
        Ok(match answer {
            Some(value) => StructuredOutput::Parsed(value.clone()),
            None => StructuredOutput::ParseFailed {
                raw: "I could not decide.".into(),
                reason: "no JSON object found".into(),
            },
        })
    }
}

struct Harness {
    store: Arc<MemoryRecordStore>,
    extraction: Arc<FakeExtraction>,
    workflow: LeadWorkflow,
}

fn harness(research: FakeResearch, extraction: FakeExtraction) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let extraction = Arc::new(extraction);
    let deps = StageDeps {
        store: store.clone(),
        research: Arc::new(research),
        extraction: extraction.clone(),
    };
    Harness {
        store,
        extraction,
        workflow: LeadWorkflow::new(deps),
    }
}

async fn add_lead(store: &MemoryRecordStore, new_lead: NewLead) -> Lead {
    store.insert_lead(new_lead).await.unwrap()
}

fn ada() -> NewLead {
    NewLead {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        company_name: Some("Analytical Engines".into()),
        ..NewLead::default()
    }
}

fn states(ctx: &WorkflowContext) -> Vec<WorkflowState> {
    ctx.steps.iter().map(|s| s.state).collect()
}

async fn subjects(store: &MemoryRecordStore, lead_id: &str) -> Vec<String> {
    store
        .list_activities(&ActivityQuery::for_lead(lead_id))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|a| a.subject)
        .collect()
}

// --- Scenarios ---

#[tokio::test]
async fn profile_then_contact_then_qualified() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());
    let lead = add_lead(
        &h.store,
        NewLead {
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    assert_eq!(ctx.current_state, WorkflowState::Completed);
    assert_eq!(
        states(&ctx),
        vec![
            WorkflowState::Discovery,
            WorkflowState::ProfileScraper,
            WorkflowState::ContactFinder,
            WorkflowState::Enrichment,
            WorkflowState::Scoring,
            WorkflowState::StatusUpdate,
        ]
    );
    assert_eq!(ctx.score, Some(85));
    assert_eq!(ctx.new_status, Some(LeadStatus::Qualified));
    assert!(ctx.error.is_none());
    assert!(ctx.completed_at.is_some());

    let stored = h.store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("VP Eng"));
    assert_eq!(stored.email.as_deref(), Some("a@b.com"));
    assert_eq!(stored.score, 85);
    assert_eq!(stored.status, LeadStatus::Qualified);
    assert_eq!(stored.pain_points, vec!["slow CI", "flaky tests"]);

    let subjects = subjects(&h.store, &lead.id).await;
    for expected in [
        "Profile Scraped",
        "Contact Information Search",
        "Lead Enrichment Completed",
        "Lead Processing Workflow Completed",
    ] {
        assert!(subjects.iter().any(|s| s == expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn complete_contact_goes_straight_to_enrichment() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());
    let lead = add_lead(
        &h.store,
        NewLead {
            email: Some("ada@acme.io".into()),
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    assert_eq!(
        states(&ctx),
        vec![
            WorkflowState::Discovery,
            WorkflowState::Enrichment,
            WorkflowState::Scoring,
            WorkflowState::StatusUpdate,
        ]
    );
    assert!(ctx.is_success());
    assert_eq!(h.extraction.calls(), vec!["enrichment", "scoring"]);
}

#[tokio::test]
async fn missing_lead_fails_at_discovery() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());

    let ctx = h.workflow.execute("does-not-exist").await;

    assert_eq!(ctx.current_state, WorkflowState::Failed);
    assert_eq!(ctx.steps.len(), 1);
    assert_eq!(ctx.steps[0].status, StepStatus::Failed);
    assert!(ctx.error.as_deref().unwrap().contains("Lead not found"));
    assert!(h.extraction.calls().is_empty());

    let summary = get_workflow_summary(&ctx);
    assert_eq!(summary.status, WorkflowState::Failed);
    assert!(summary.error.is_some());
}

#[tokio::test]
async fn failed_enrichment_still_scores_and_updates() {
    let h = harness(
        FakeResearch {
            fail_search: true,
            ..FakeResearch::default()
        },
        FakeExtraction {
            scoring: None,
            ..FakeExtraction::default()
        },
    );
    let lead = add_lead(
        &h.store,
        NewLead {
            email: Some("ada@acme.io".into()),
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    assert!(ctx.is_success());
    let enrichment = &ctx.steps[1];
    assert_eq!(enrichment.state, WorkflowState::Enrichment);
    assert_eq!(enrichment.status, StepStatus::Failed);
    assert!(enrichment.error.as_deref().unwrap().contains("unreachable"));
    assert!(ctx.enrichment_data.is_none());

    assert_eq!(
        states(&ctx)[2..],
        [WorkflowState::Scoring, WorkflowState::StatusUpdate]
    );
    assert_eq!(ctx.score, Some(50));
    assert_eq!(ctx.new_status, Some(LeadStatus::Nurturing));
}

// --- Properties ---

#[tokio::test]
async fn out_of_range_scores_are_clamped() {
    for (answer, expected) in [
        (json!({"score": 150}), 100u8),
        (json!({"score": -12}), 0),
        (json!({"score": "64"}), 64),
        (json!({"score": "very high"}), 50),
    ] {
        let h = harness(
            FakeResearch::default(),
            FakeExtraction {
                scoring: Some(answer),
                ..FakeExtraction::default()
            },
        );
        let lead = add_lead(
            &h.store,
            NewLead {
                email: Some("ada@acme.io".into()),
                ..ada()
            },
        )
        .await;

        let ctx = h.workflow.execute(&lead.id).await;
        assert_eq!(ctx.score, Some(expected));
        let stored = h.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.score, expected);
    }
}

#[tokio::test]
async fn existing_fields_are_never_overwritten() {
    let h = harness(
        FakeResearch::default(),
        FakeExtraction {
            profile: Some(json!({
                "title": "VP Eng",
                "companyName": "Other Co",
                "location": "Paris",
                "confidence": "high"
            })),
            contact: Some(json!({
                "email": "other@b.com",
                "linkedinUrl": "https://www.linkedin.com/in/someone-else",
                "confidence": "high"
            })),
            enrichment: Some(json!({
                "researchSummary": "summary",
                "linkedin_url": "https://www.linkedin.com/in/third",
                "location": "Berlin"
            })),
            ..FakeExtraction::default()
        },
    );
    let lead = add_lead(
        &h.store,
        NewLead {
            title: Some("CTO".into()),
            location: Some("London".into()),
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;
    assert!(ctx.is_success());

    let stored = h.store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("CTO"));
    assert_eq!(stored.company_name.as_deref(), Some("Analytical Engines"));
    assert_eq!(stored.location.as_deref(), Some("London"));
    assert_eq!(stored.linkedin_url.as_deref(), Some("https://www.linkedin.com/in/ada"));
    // Only the missing email was filled.
    assert_eq!(stored.email.as_deref(), Some("other@b.com"));
}

#[tokio::test]
async fn intermediate_failures_degrade_instead_of_failing() {
    for (failing, state, next) in [
        ("contact", WorkflowState::ContactFinder, WorkflowState::Enrichment),
        ("enrichment", WorkflowState::Enrichment, WorkflowState::Scoring),
        ("scoring", WorkflowState::Scoring, WorkflowState::StatusUpdate),
    ] {
        let h = harness(
            FakeResearch::default(),
            FakeExtraction {
                failing: vec![failing],
                ..FakeExtraction::default()
            },
        );
        let lead = add_lead(
            &h.store,
            NewLead {
                twitter_url: Some("https://x.com/ada".into()),
                ..ada()
            },
        )
        .await;

        let ctx = h.workflow.execute(&lead.id).await;

        assert_eq!(ctx.current_state, WorkflowState::Completed, "{} failure", failing);
        let pos = ctx.steps.iter().position(|s| s.state == state).unwrap();
        assert_eq!(ctx.steps[pos].status, StepStatus::Failed);
        assert!(ctx.steps[pos].error.is_some());
        assert_eq!(ctx.steps[pos + 1].state, next);
    }
}

#[tokio::test]
async fn failed_linkedin_scrape_still_uses_x_profile() {
    let h = harness(
        FakeResearch {
            fail_scrape_for: Some("linkedin.com"),
            ..FakeResearch::default()
        },
        FakeExtraction::default(),
    );
    let lead = add_lead(
        &h.store,
        NewLead {
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            twitter_url: Some("https://x.com/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    let profile = &ctx.steps[1];
    assert_eq!(profile.state, WorkflowState::ProfileScraper);
    assert_eq!(profile.status, StepStatus::Completed);
    // Only the X page reached extraction.
    assert_eq!(h.extraction.calls().iter().filter(|k| **k == "profile").count(), 1);

    let stored = h.store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("VP Eng"));
}

#[tokio::test]
async fn failed_profile_extraction_degrades_to_low_confidence() {
    let h = harness(
        FakeResearch::default(),
        FakeExtraction {
            failing: vec!["profile"],
            ..FakeExtraction::default()
        },
    );
    let lead = add_lead(
        &h.store,
        NewLead {
            twitter_url: Some("https://x.com/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    assert!(ctx.is_success());
    let profile = &ctx.steps[1];
    assert_eq!(profile.status, StepStatus::Completed);
    let output = profile.output.as_ref().unwrap();
    assert_eq!(output["confidence"], "low");
    assert!(
        output["extractionSummary"]
            .as_str()
            .unwrap()
            .contains("profile model call failed")
    );
    assert_eq!(ctx.steps[2].state, WorkflowState::ContactFinder);
}

/// Memory store whose activity inserts fail for one subject.
struct FailingActivityStore {
    inner: MemoryRecordStore,
    failing_subject: &'static str,
}

#[async_trait]
impl RecordStore for FailingActivityStore {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, StoreError> {
        self.inner.get_lead(id).await
    }

    async fn update_lead(&self, id: &str, patch: &LeadPatch) -> Result<Lead, StoreError> {
        self.inner.update_lead(id, patch).await
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        self.inner.insert_lead(lead).await
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        self.inner.list_leads(query).await
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        if activity.subject.as_deref() == Some(self.failing_subject) {
            return Err(StoreError::Decode("activities table is locked".into()));
        }
        self.inner.insert_activity(activity).await
    }

    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        self.inner.list_activities(query).await
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        self.inner.insert_company(company).await
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, StoreError> {
        self.inner.get_company(id).await
    }

    async fn count_companies(&self) -> Result<usize, StoreError> {
        self.inner.count_companies().await
    }
}

#[tokio::test]
async fn failed_activity_insert_keeps_committed_lead_update() {
    let store = Arc::new(FailingActivityStore {
        inner: MemoryRecordStore::new(),
        failing_subject: "Profile Scraped",
    });
    let extraction = Arc::new(FakeExtraction {
        profile: Some(json!({"email": "scraped@x.com", "confidence": "high"})),
        contact: Some(json!({"email": "other@b.com", "confidence": "high"})),
        ..FakeExtraction::default()
    });
    let workflow = LeadWorkflow::new(StageDeps {
        store: store.clone(),
        research: Arc::new(FakeResearch::default()),
        extraction: extraction.clone(),
    });
    let lead = store
        .insert_lead(NewLead {
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            ..ada()
        })
        .await
        .unwrap();

    let ctx = workflow.execute(&lead.id).await;

    assert!(ctx.is_success());
    let profile = &ctx.steps[1];
    assert_eq!(profile.state, WorkflowState::ProfileScraper);
    assert_eq!(profile.status, StepStatus::Completed);
    assert!(
        profile.output.as_ref().unwrap()["activityError"]
            .as_str()
            .unwrap()
            .contains("locked")
    );

    // Routing saw the email the profile scraper wrote, so contact finding is
    // no longer needed.
    assert_eq!(ctx.steps[2].state, WorkflowState::Enrichment);
    assert!(!extraction.calls().contains(&"contact"));

    let stored = store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.email.as_deref(), Some("scraped@x.com"));
}

#[tokio::test]
async fn failed_scoring_uses_default_score() {
    let h = harness(
        FakeResearch::default(),
        FakeExtraction {
            failing: vec!["scoring"],
            ..FakeExtraction::default()
        },
    );
    let lead = add_lead(&h.store, NewLead { email: Some("ada@acme.io".into()), ..ada() }).await;

    let ctx = h.workflow.execute(&lead.id).await;

    assert_eq!(ctx.score, Some(50));
    assert_eq!(ctx.new_status, Some(LeadStatus::Nurturing));
    // The status update persists the default so stored score and status agree.
    let stored = h.store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.score, 50);
    assert_eq!(stored.status, LeadStatus::Nurturing);
}

#[tokio::test]
async fn every_executed_stage_leaves_one_closed_step() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());
    let lead = add_lead(
        &h.store,
        NewLead {
            linkedin_url: Some("https://www.linkedin.com/in/ada".into()),
            twitter_url: Some("https://x.com/ada".into()),
            ..ada()
        },
    )
    .await;

    let ctx = h.workflow.execute(&lead.id).await;

    let executed = h.extraction.calls();
    // Two profile extractions happen inside one ProfileScraper step.
    assert_eq!(executed.iter().filter(|k| **k == "profile").count(), 2);
    assert_eq!(ctx.steps.len(), 6);
    for step in &ctx.steps {
        assert!(step.completed_at.is_some());
        assert_ne!(step.status, StepStatus::Running);
    }

    let summary = get_workflow_summary(&ctx);
    assert_eq!(summary.steps.len(), ctx.steps.len());
    assert_eq!(summary.final_score, Some(85));
}

#[tokio::test]
async fn status_update_failure_is_fatal() {
    struct BrokenStatusUpdate;

    #[async_trait]
    impl Stage for BrokenStatusUpdate {
        fn state(&self) -> WorkflowState {
            WorkflowState::StatusUpdate
        }

        async fn run(&self, _ctx: &WorkflowContext) -> Result<StageEffect> {
            bail!("database is read-only")
        }
    }

    let store = Arc::new(MemoryRecordStore::new());
    let deps = StageDeps {
        store: store.clone(),
        research: Arc::new(FakeResearch::default()),
        extraction: Arc::new(FakeExtraction::default()),
    };
    let mut stages = builtin_stages(&deps);
    stages.push(Arc::new(BrokenStatusUpdate));
    let workflow = LeadWorkflow::with_stages(stages);

    let lead = add_lead(&store, NewLead { email: Some("ada@acme.io".into()), ..ada() }).await;
    let ctx = workflow.execute(&lead.id).await;

    assert_eq!(ctx.current_state, WorkflowState::Failed);
    assert_eq!(ctx.error.as_deref(), Some("database is read-only"));
    assert_eq!(ctx.last_step().unwrap().state, WorkflowState::StatusUpdate);
}

#[tokio::test]
async fn concurrent_runs_for_one_lead_both_complete() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());
    let lead = add_lead(&h.store, NewLead { email: Some("ada@acme.io".into()), ..ada() }).await;

    let (a, b) = tokio::join!(h.workflow.execute(&lead.id), h.workflow.execute(&lead.id));
    assert!(a.is_success() && b.is_success());

    let completed = h
        .store
        .list_activities(&ActivityQuery {
            activity_type: Some(ActivityType::AgentAction),
            subject_contains: Some("Workflow Completed".into()),
            ..ActivityQuery::for_lead(&lead.id)
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);
}

// --- Trigger ---

#[tokio::test]
async fn trigger_rejects_blank_lead_id() {
    let h = harness(FakeResearch::default(), FakeExtraction::default());
    let err = h
        .workflow
        .trigger("   ", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidLeadId));
}

#[tokio::test]
async fn trigger_enforces_wall_clock_budget() {
    struct SlowResearch;

    #[async_trait]
    impl Research for SlowResearch {
        async fn search(&self, _query: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }

        async fn scrape_page(&self, _url: &str) -> Result<ScrapeResult> {
            Ok(ScrapeResult::unavailable())
        }
    }

    let store = Arc::new(MemoryRecordStore::new());
    let workflow = LeadWorkflow::new(StageDeps {
        store: store.clone(),
        research: Arc::new(SlowResearch),
        extraction: Arc::new(FakeExtraction::default()),
    });
    let lead = add_lead(&store, NewLead { email: Some("ada@acme.io".into()), ..ada() }).await;

    let err = workflow
        .trigger(&lead.id, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout { .. }));
}
