// ABOUTME: Indexer and scheduler settings loaded from environment variables
// ABOUTME: Validates values up front so the long-running loops never see malformed config

use crate::constants::*;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for the process that dequeues and executes index jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerSettings {
    pub frontend_url: String,
    pub frontend_url_from_docker: String,
    pub auth_token: String,
    pub use_firecracker: bool,
    pub firecracker_image: String,
    pub firecracker_num_cpus: u32,
    pub firecracker_memory: String,
    pub image_archive_path: PathBuf,
    pub uploader_image: String,
    pub workspace_root: Option<PathBuf>,
    pub poll_interval: Duration,
}

/// Heuristic thresholds and cadence for the scheduling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub batch_size: u32,
    pub minimum_time_since_last_enqueue: Duration,
    pub minimum_search_count: u32,
    pub minimum_search_ratio: f64,
    /// Repositories with more precise hits than this are considered indexed already.
    pub maximum_precise_count: u32,
    pub repos_root: PathBuf,
}

pub fn database_url() -> String {
    env::var(AUTOINDEX_DATABASE_URL).unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

impl IndexerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let frontend_url = required(&lookup, AUTOINDEX_FRONTEND_URL)?;
        validate_url(AUTOINDEX_FRONTEND_URL, &frontend_url)?;

        let frontend_url_from_docker = lookup(AUTOINDEX_FRONTEND_URL_FROM_DOCKER)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| frontend_url.clone());
        validate_url(AUTOINDEX_FRONTEND_URL_FROM_DOCKER, &frontend_url_from_docker)?;

        let auth_token = required(&lookup, AUTOINDEX_AUTH_TOKEN)?;

        let image_archive_path = lookup(AUTOINDEX_IMAGE_ARCHIVE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("autoindex-images"));

        let poll_secs = parsed(
            &lookup,
            AUTOINDEX_WORKER_POLL_INTERVAL_SECS,
            DEFAULT_WORKER_POLL_INTERVAL_SECS,
        )?;

        Ok(Self {
            frontend_url,
            frontend_url_from_docker,
            auth_token,
            use_firecracker: parsed(&lookup, AUTOINDEX_USE_FIRECRACKER, false)?,
            firecracker_image: lookup(AUTOINDEX_FIRECRACKER_IMAGE)
                .unwrap_or_else(|| DEFAULT_FIRECRACKER_IMAGE.to_string()),
            firecracker_num_cpus: parsed(
                &lookup,
                AUTOINDEX_FIRECRACKER_NUM_CPUS,
                DEFAULT_FIRECRACKER_NUM_CPUS,
            )?,
            firecracker_memory: lookup(AUTOINDEX_FIRECRACKER_MEMORY)
                .unwrap_or_else(|| DEFAULT_FIRECRACKER_MEMORY.to_string()),
            image_archive_path,
            uploader_image: lookup(AUTOINDEX_UPLOADER_IMAGE)
                .unwrap_or_else(|| DEFAULT_UPLOADER_IMAGE.to_string()),
            workspace_root: lookup(AUTOINDEX_WORKSPACE_ROOT).map(PathBuf::from),
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}

impl SchedulerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval_secs = parsed(
            &lookup,
            AUTOINDEX_SCHEDULER_INTERVAL_SECS,
            DEFAULT_SCHEDULER_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: AUTOINDEX_SCHEDULER_INTERVAL_SECS,
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        let minimum_search_ratio = parsed(
            &lookup,
            AUTOINDEX_SCHEDULER_MIN_SEARCH_RATIO,
            DEFAULT_SCHEDULER_MIN_SEARCH_RATIO,
        )?;
        if !minimum_search_ratio.is_finite() || !(0.0..=1.0).contains(&minimum_search_ratio) {
            return Err(ConfigError::Invalid {
                name: AUTOINDEX_SCHEDULER_MIN_SEARCH_RATIO,
                value: minimum_search_ratio.to_string(),
                reason: "ratio must be between 0 and 1".to_string(),
            });
        }

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            batch_size: parsed(
                &lookup,
                AUTOINDEX_SCHEDULER_BATCH_SIZE,
                DEFAULT_SCHEDULER_BATCH_SIZE,
            )?,
            minimum_time_since_last_enqueue: Duration::from_secs(parsed(
                &lookup,
                AUTOINDEX_SCHEDULER_MIN_TIME_SINCE_LAST_ENQUEUE_SECS,
                DEFAULT_SCHEDULER_MIN_TIME_SINCE_LAST_ENQUEUE_SECS,
            )?),
            minimum_search_count: parsed(
                &lookup,
                AUTOINDEX_SCHEDULER_MIN_SEARCH_COUNT,
                DEFAULT_SCHEDULER_MIN_SEARCH_COUNT,
            )?,
            minimum_search_ratio,
            maximum_precise_count: parsed(
                &lookup,
                AUTOINDEX_SCHEDULER_MAX_PRECISE_COUNT,
                DEFAULT_SCHEDULER_MAX_PRECISE_COUNT,
            )?,
            repos_root: lookup(AUTOINDEX_REPOS_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPOS_ROOT)),
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<()> {
    Url::parse(value).map(|_| ()).map_err(|e| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
