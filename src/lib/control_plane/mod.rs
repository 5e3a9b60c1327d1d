pub mod client;
pub mod reporter;
pub mod types;
