// ABOUTME: Record types for index jobs and indexable repository candidates
// ABOUTME: Mirrors the lsif_indexes and indexable_repositories tables

use crate::error::{Result, StorageError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Queued,
    Processing,
    Completed,
    Errored,
    Canceled,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "errored" => Ok(Self::Errored),
            "canceled" => Ok(Self::Canceled),
            _ => Err(StorageError::InvalidState(s.to_string())),
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled unit of indexing work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Index {
    pub id: i64,
    pub state: IndexState,
    pub repository_id: i64,
    pub repository_name: String,
    pub commit: String,
    /// Directory within the repository to index; empty means the repository root.
    pub root: String,
    pub install_image: Option<String>,
    pub install_commands: Vec<String>,
    pub indexer: String,
    pub indexer_args: Vec<String>,
    pub failure_message: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the scheduler when enqueueing an index.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIndex {
    pub repository_id: i64,
    pub repository_name: String,
    pub commit: String,
    pub root: String,
    pub install_image: Option<String>,
    pub install_commands: Vec<String>,
    pub indexer: String,
    pub indexer_args: Vec<String>,
}

/// Usage counters for a repository that may deserve auto-indexing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexableRepository {
    pub repository_id: i64,
    pub repository_name: String,
    pub search_count: i64,
    pub precise_count: i64,
    pub search_ratio: f64,
    pub last_index_enqueued_at: Option<DateTime<Utc>>,
}

/// Counter snapshot written by the usage aggregation process.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryUsage {
    pub repository_id: i64,
    pub repository_name: String,
    pub search_count: i64,
    pub precise_count: i64,
}

impl RepositoryUsage {
    /// Share of code navigation hits served by search rather than precise data.
    pub fn search_ratio(&self) -> f64 {
        let total = self.search_count + self.precise_count;
        if total <= 0 {
            return 0.0;
        }
        self.search_count as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexableRepositoryQueryOptions {
    pub limit: u32,
    pub minimum_time_since_last_enqueue: Duration,
    pub minimum_search_count: i64,
    pub minimum_search_ratio: f64,
    pub maximum_precise_count: i64,
}

/// Fixed-width RFC3339 so that string order matches time order in SQL comparisons.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_index_state_round_trips_through_labels() {
        for state in [
            IndexState::Queued,
            IndexState::Processing,
            IndexState::Completed,
            IndexState::Errored,
            IndexState::Canceled,
        ] {
            assert_eq!(IndexState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(IndexState::from_str("failed").is_err());
    }

    #[test]
    fn test_search_ratio() {
        let usage = RepositoryUsage {
            repository_id: 1,
            repository_name: "acme/widgets".to_string(),
            search_count: 30,
            precise_count: 10,
        };
        assert_eq!(usage.search_ratio(), 0.75);

        let idle = RepositoryUsage {
            search_count: 0,
            precise_count: 0,
            ..usage
        };
        assert_eq!(idle.search_ratio(), 0.0);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);

        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert!(a < b);
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert_eq!(parse_timestamp(&b).unwrap(), late);
    }
}
