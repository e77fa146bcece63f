// ABOUTME: Configuration and environment variable management for autoindex
// ABOUTME: Exposes env var names and the settings structs injected into the loops

pub mod constants;
pub mod settings;

pub use settings::{database_url, ConfigError, IndexerSettings, SchedulerSettings};
