// ABOUTME: Auto-index scheduling for autoindex
// ABOUTME: Selects candidate repositories, resolves their index jobs and enqueues them

pub mod config;
pub mod error;
pub mod gitserver;
pub mod resolver;
pub mod scheduler;

pub use config::{
    parse_json, parse_yaml, AutoIndexConfiguration, BranchConfiguration, IndexConfiguration,
    IndexJob, InstallConfiguration,
};
pub use error::{ConfigurationError, GitserverError, Result, SchedulerError};
pub use gitserver::{GitserverClient, LocalGitserverClient};
pub use resolver::{declared_configuration, resolve};
pub use scheduler::{MetricsSnapshot, QueueOutcome, Scheduler, SchedulerMetrics};
