pub mod executor;
pub mod locks;
pub mod routing;
pub mod summary;
pub mod types;

pub use executor::{LeadWorkflow, WorkflowError};
pub use summary::{StepSummary, WorkflowSummary, get_workflow_summary};
pub use types::{StepStatus, WorkflowContext, WorkflowState, WorkflowStep};
