use serde::Serialize;

use crate::crm::Lead;
use crate::engine::types::{StepStatus, WorkflowState};

/// Data-completeness facts that drive the branching transitions.
///
/// `has_profiles_to_scrape` is narrower than "has a profile URL". It also
/// requires incomplete contact details, so a lead with email, LinkedIn and X
/// goes straight to enrichment and its X profile is never scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    pub has_profiles_to_scrape: bool,
    pub needs_contact_finding: bool,
}

impl Routing {
    pub fn for_lead(lead: &Lead) -> Self {
        let needs_contact_finding = !lead.has_email() || !lead.has_linkedin();
        Self {
            has_profiles_to_scrape: (lead.has_linkedin() || lead.has_twitter())
                && needs_contact_finding,
            needs_contact_finding,
        }
    }
}

/// Stages whose failure ends the run.
pub fn is_fatal(state: WorkflowState) -> bool {
    matches!(state, WorkflowState::Discovery | WorkflowState::StatusUpdate)
}

fn after_profile(lead: Option<&Lead>) -> WorkflowState {
    match lead.map(Routing::for_lead) {
        Some(routing) if routing.needs_contact_finding => WorkflowState::ContactFinder,
        _ => WorkflowState::Enrichment,
    }
}

/// The transition table: current state × step outcome → next state.
///
/// `lead` is the context's snapshot after the stage ran. Only Discovery and
/// ProfileScraper branch on it; every other stage has a fixed successor, and
/// only Discovery and StatusUpdate can reach `Failed`.
pub fn transition(state: WorkflowState, outcome: StepStatus, lead: Option<&Lead>) -> WorkflowState {
    use WorkflowState::*;

    let failed = outcome == StepStatus::Failed;
    match state {
        Discovery => match lead.map(Routing::for_lead) {
            _ if failed => Failed,
            None => Failed,
            Some(r) if r.has_profiles_to_scrape => ProfileScraper,
            Some(r) if r.needs_contact_finding => ContactFinder,
            Some(_) => Enrichment,
        },
        ProfileScraper => after_profile(lead),
        ContactFinder => Enrichment,
        Enrichment => Scoring,
        Scoring => StatusUpdate,
        StatusUpdate if failed => Failed,
        StatusUpdate => Completed,
        Completed => Completed,
        Failed => Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::NewLead;
    use chrono::Utc;

    fn lead(email: bool, linkedin: bool, twitter: bool) -> Lead {
        NewLead {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.then(|| "ada@acme.io".to_string()),
            linkedin_url: linkedin.then(|| "https://linkedin.com/in/ada".to_string()),
            twitter_url: twitter.then(|| "https://x.com/ada".to_string()),
            ..NewLead::default()
        }
        .into_lead("l1".into(), Utc::now())
        .unwrap()
    }

    #[test]
    fn routing_facts_per_lead_shape() {
        let r = Routing::for_lead(&lead(false, true, false));
        assert!(r.has_profiles_to_scrape && r.needs_contact_finding);
        let r = Routing::for_lead(&lead(false, false, false));
        assert!(!r.has_profiles_to_scrape && r.needs_contact_finding);
        let r = Routing::for_lead(&lead(true, true, true));
        assert!(!r.has_profiles_to_scrape && !r.needs_contact_finding);
    }

    #[test]
    fn discovery_routes_on_all_combinations() {
        use WorkflowState::*;
        let ok = StepStatus::Completed;
        assert_eq!(transition(Discovery, ok, Some(&lead(false, true, false))), ProfileScraper);
        assert_eq!(transition(Discovery, ok, Some(&lead(true, false, true))), ProfileScraper);
        assert_eq!(transition(Discovery, ok, Some(&lead(true, false, false))), ContactFinder);
        assert_eq!(transition(Discovery, ok, Some(&lead(false, false, false))), ContactFinder);
        assert_eq!(transition(Discovery, ok, Some(&lead(true, true, false))), Enrichment);
        assert_eq!(transition(Discovery, ok, Some(&lead(true, true, true))), Enrichment);
    }

    #[test]
    fn discovery_failure_is_fatal() {
        use WorkflowState::*;
        assert_eq!(transition(Discovery, StepStatus::Failed, None), Failed);
        assert_eq!(transition(Discovery, StepStatus::Completed, None), Failed);
    }

    #[test]
    fn profile_scraper_reevaluates_contact_needs() {
        use WorkflowState::*;
        assert_eq!(
            transition(ProfileScraper, StepStatus::Failed, Some(&lead(false, true, false))),
            ContactFinder
        );
        assert_eq!(
            transition(ProfileScraper, StepStatus::Completed, Some(&lead(true, true, false))),
            Enrichment
        );
    }

    #[test]
    fn fixed_successors_ignore_failure() {
        use WorkflowState::*;
        for outcome in [StepStatus::Completed, StepStatus::Failed] {
            assert_eq!(transition(ContactFinder, outcome, None), Enrichment);
            assert_eq!(transition(Enrichment, outcome, None), Scoring);
            assert_eq!(transition(Scoring, outcome, None), StatusUpdate);
        }
        assert_eq!(transition(StatusUpdate, StepStatus::Completed, None), Completed);
        assert_eq!(transition(StatusUpdate, StepStatus::Failed, None), Failed);
    }

    #[test]
    fn only_discovery_and_status_update_are_fatal() {
        use WorkflowState::*;
        assert!(is_fatal(Discovery));
        assert!(is_fatal(StatusUpdate));
        for state in [ProfileScraper, ContactFinder, Enrichment, Scoring] {
            assert!(!is_fatal(state));
        }
    }
}
