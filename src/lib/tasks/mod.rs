pub mod deployer;
pub mod docker;
pub mod engine;
pub mod maintenance;
pub mod state;
pub mod types;
