//! The research agents the workflow stages delegate to. Each takes the
//! capabilities as trait objects so they run the same against live providers
//! and test doubles.

pub mod contact;
pub mod enrichment;
pub mod profile;

pub use contact::{ContactResult, find_contact_info};
pub use enrichment::{EnrichmentData, enrich_lead};
pub use profile::{ProfileResult, ProfileType, scrape_profile};
