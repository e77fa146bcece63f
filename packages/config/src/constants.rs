// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across autoindex

// Storage
pub const AUTOINDEX_DATABASE_URL: &str = "AUTOINDEX_DATABASE_URL";

// Indexer: frontend access
pub const AUTOINDEX_FRONTEND_URL: &str = "AUTOINDEX_FRONTEND_URL";
pub const AUTOINDEX_FRONTEND_URL_FROM_DOCKER: &str = "AUTOINDEX_FRONTEND_URL_FROM_DOCKER";
pub const AUTOINDEX_AUTH_TOKEN: &str = "AUTOINDEX_AUTH_TOKEN";

// Indexer: sandbox
pub const AUTOINDEX_USE_FIRECRACKER: &str = "AUTOINDEX_USE_FIRECRACKER";
pub const AUTOINDEX_FIRECRACKER_IMAGE: &str = "AUTOINDEX_FIRECRACKER_IMAGE";
pub const AUTOINDEX_FIRECRACKER_NUM_CPUS: &str = "AUTOINDEX_FIRECRACKER_NUM_CPUS";
pub const AUTOINDEX_FIRECRACKER_MEMORY: &str = "AUTOINDEX_FIRECRACKER_MEMORY";
pub const AUTOINDEX_IMAGE_ARCHIVE_PATH: &str = "AUTOINDEX_IMAGE_ARCHIVE_PATH";
pub const AUTOINDEX_UPLOADER_IMAGE: &str = "AUTOINDEX_UPLOADER_IMAGE";
pub const AUTOINDEX_WORKSPACE_ROOT: &str = "AUTOINDEX_WORKSPACE_ROOT";
pub const AUTOINDEX_WORKER_POLL_INTERVAL_SECS: &str = "AUTOINDEX_WORKER_POLL_INTERVAL_SECS";

// Scheduler
pub const AUTOINDEX_REPOS_ROOT: &str = "AUTOINDEX_REPOS_ROOT";
pub const AUTOINDEX_SCHEDULER_INTERVAL_SECS: &str = "AUTOINDEX_SCHEDULER_INTERVAL_SECS";
pub const AUTOINDEX_SCHEDULER_BATCH_SIZE: &str = "AUTOINDEX_SCHEDULER_BATCH_SIZE";
pub const AUTOINDEX_SCHEDULER_MIN_TIME_SINCE_LAST_ENQUEUE_SECS: &str =
    "AUTOINDEX_SCHEDULER_MIN_TIME_SINCE_LAST_ENQUEUE_SECS";
pub const AUTOINDEX_SCHEDULER_MIN_SEARCH_COUNT: &str = "AUTOINDEX_SCHEDULER_MIN_SEARCH_COUNT";
pub const AUTOINDEX_SCHEDULER_MIN_SEARCH_RATIO: &str = "AUTOINDEX_SCHEDULER_MIN_SEARCH_RATIO";
pub const AUTOINDEX_SCHEDULER_MAX_PRECISE_COUNT: &str = "AUTOINDEX_SCHEDULER_MAX_PRECISE_COUNT";

// Defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite:autoindex.db";
pub const DEFAULT_FIRECRACKER_IMAGE: &str = "sourcegraph/ignite-ubuntu:insiders";
pub const DEFAULT_FIRECRACKER_NUM_CPUS: u32 = 4;
pub const DEFAULT_FIRECRACKER_MEMORY: &str = "12G";
pub const DEFAULT_UPLOADER_IMAGE: &str = "sourcegraph/src-cli:latest";
pub const DEFAULT_WORKER_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_REPOS_ROOT: &str = "./repos";
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 30 * 60;
pub const DEFAULT_SCHEDULER_BATCH_SIZE: u32 = 100;
pub const DEFAULT_SCHEDULER_MIN_TIME_SINCE_LAST_ENQUEUE_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SCHEDULER_MIN_SEARCH_COUNT: u32 = 50;
pub const DEFAULT_SCHEDULER_MIN_SEARCH_RATIO: f64 = 0.5;
pub const DEFAULT_SCHEDULER_MAX_PRECISE_COUNT: u32 = 1;
