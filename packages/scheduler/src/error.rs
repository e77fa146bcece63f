// ABOUTME: Error types for gitserver access, configuration resolution and scheduling
// ABOUTME: A missing upstream repository is recognised so ticks can skip it

use autoindex_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitserverError {
    #[error("repository not found: {0}")]
    RepoNotExist(String),

    #[error("revision {revision} not found in {repository}")]
    RevisionNotFound { repository: String, revision: String },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid JSON: {0}")]
    Json(#[from] json5::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{path} is not valid UTF-8")]
    Encoding { path: String },

    #[error(transparent)]
    Gitserver(#[from] GitserverError),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] StorageError),

    #[error("gitserver error: {0}")]
    Gitserver(#[from] GitserverError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl SchedulerError {
    /// True when the repository no longer exists upstream
    pub fn is_repo_not_exist(&self) -> bool {
        matches!(
            self,
            Self::Gitserver(GitserverError::RepoNotExist(_))
                | Self::Configuration(ConfigurationError::Gitserver(
                    GitserverError::RepoNotExist(_)
                ))
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_not_exist_is_recognised_through_wrapping() {
        let direct = SchedulerError::from(GitserverError::RepoNotExist("acme/gone".into()));
        assert!(direct.is_repo_not_exist());

        let wrapped = SchedulerError::from(ConfigurationError::from(
            GitserverError::RepoNotExist("acme/gone".into()),
        ));
        assert!(wrapped.is_repo_not_exist());

        let other = SchedulerError::from(GitserverError::RevisionNotFound {
            repository: "acme/widgets".into(),
            revision: "abc123".into(),
        });
        assert!(!other.is_repo_not_exist());
    }
}
