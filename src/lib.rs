pub mod agent;
pub mod agents;
pub mod api;
pub mod cli;
pub mod crm;
pub mod engine;
pub mod extraction;
pub mod llm;
pub mod research;
pub mod stages;
pub mod storage;
