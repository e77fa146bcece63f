// ABOUTME: Read access to repository content at a commit
// ABOUTME: The local implementation reads git mirrors from a directory with git2

use crate::error::GitserverError;
use async_trait::async_trait;
use git2::{ErrorCode, ObjectType, Repository};
use std::path::{Path, PathBuf};
use tracing::debug;

pub type Result<T> = std::result::Result<T, GitserverError>;

#[async_trait]
pub trait GitserverClient: Send + Sync {
    /// Commit hash the repository's HEAD points at
    async fn head(&self, repository: &str) -> Result<String>;

    /// Contents of `path` at `commit`, or `None` when no such file exists
    async fn read_file(&self, repository: &str, commit: &str, path: &str)
        -> Result<Option<Vec<u8>>>;

    async fn file_exists(&self, repository: &str, commit: &str, path: &str) -> Result<bool> {
        Ok(self.read_file(repository, commit, path).await?.is_some())
    }
}

/// Serves repositories mirrored under `<root>/<name>` or `<root>/<name>.git`
#[derive(Debug, Clone)]
pub struct LocalGitserverClient {
    root: PathBuf,
}

impl LocalGitserverClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, repository: &str) -> Result<PathBuf> {
        let name = repository.trim_matches('/');
        if name.is_empty() || name.split('/').any(|part| part == "..") {
            return Err(GitserverError::RepoNotExist(repository.to_string()));
        }

        let plain = self.root.join(name);
        let bare = self.root.join(format!("{}.git", name));
        [plain, bare]
            .into_iter()
            .find(|path| path.is_dir())
            .ok_or_else(|| GitserverError::RepoNotExist(repository.to_string()))
    }

    async fn with_repository<T, F>(&self, repository: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let path = self.locate(repository)?;
        let name = repository.to_string();

        tokio::task::spawn_blocking(move || {
            let repo = open(&path, &name)?;
            f(&repo)
        })
        .await
        .map_err(|e| GitserverError::Io(std::io::Error::other(e)))?
    }
}

fn open(path: &Path, repository: &str) -> Result<Repository> {
    Repository::open(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => GitserverError::RepoNotExist(repository.to_string()),
        _ => GitserverError::Git(e),
    })
}

#[async_trait]
impl GitserverClient for LocalGitserverClient {
    async fn head(&self, repository: &str) -> Result<String> {
        self.with_repository(repository, |repo| {
            let commit = repo.head()?.peel_to_commit()?;
            Ok(commit.id().to_string())
        })
        .await
    }

    async fn read_file(
        &self,
        repository: &str,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let name = repository.to_string();
        let revision = commit.to_string();
        let file = path.trim_start_matches('/').to_string();

        self.with_repository(repository, move |repo| {
            let object = repo.revparse_single(&revision).map_err(|e| match e.code() {
                ErrorCode::NotFound => GitserverError::RevisionNotFound {
                    repository: name.clone(),
                    revision: revision.clone(),
                },
                _ => GitserverError::Git(e),
            })?;
            let tree = object.peel_to_commit()?.tree()?;

            let entry = match tree.get_path(Path::new(&file)) {
                Ok(entry) => entry,
                Err(e) if e.code() == ErrorCode::NotFound => {
                    debug!(repository = %name, path = %file, "File not present");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            if entry.kind() != Some(ObjectType::Blob) {
                return Ok(None);
            }
            let blob = entry.to_object(repo)?.peel_to_blob()?;
            Ok(Some(blob.content().to_vec()))
        })
        .await
    }
}
