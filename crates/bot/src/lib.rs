pub mod config;
pub mod core;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod types;
