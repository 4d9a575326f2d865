pub mod leads;
pub mod types;

pub use leads::{LeadDetail, LeadError, create_lead, lead_detail};
pub use types::*;
