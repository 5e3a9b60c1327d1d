pub mod api;
pub mod orchestrator;
pub mod timeout;
pub mod types;
pub mod worker;
