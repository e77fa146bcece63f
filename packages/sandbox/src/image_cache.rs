// ABOUTME: Local tar archives of sandbox images, pulled and saved at most once per host
// ABOUTME: Archives are keyed by image reference and copied into microVMs at boot

use crate::command::CommandRunner;
use crate::error::{SandboxError, SandboxResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const KEY_DIGEST_LEN: usize = 12;

/// Directory of `<key>.tar` image archives.
///
/// Concurrent first-time pulls of the same image are not coordinated; the last
/// rename wins and both writers produce an equivalent archive.
#[derive(Clone)]
pub struct ImageCache {
    archive_dir: PathBuf,
    commander: Arc<dyn CommandRunner>,
}

impl ImageCache {
    pub fn new(archive_dir: impl Into<PathBuf>, commander: Arc<dyn CommandRunner>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            commander,
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Archive key for an image reference: the reference with every non-alphanumeric
    /// character replaced by `_`, suffixed with a digest of the exact reference
    pub fn key(image: &str) -> String {
        let readable: String = image
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = hex::encode(Sha256::digest(image.as_bytes()));
        format!("{}_{}", readable, &digest[..KEY_DIGEST_LEN])
    }

    pub fn archive_path(&self, image: &str) -> PathBuf {
        self.archive_dir.join(format!("{}.tar", Self::key(image)))
    }

    /// Where the archive lands inside a microVM
    pub fn vm_path(image: &str) -> String {
        format!("/{}.tar", Self::key(image))
    }

    /// Return the archive for `image`, pulling and saving it first if absent.
    pub async fn ensure_local(
        &self,
        cancel: &CancellationToken,
        image: &str,
    ) -> SandboxResult<PathBuf> {
        let path = self.archive_path(image);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|source| SandboxError::Archive {
                path: path.clone(),
                source,
            })?
        {
            debug!(image = %image, "Image archive already present");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .map_err(|source| SandboxError::Archive {
                path: self.archive_dir.clone(),
                source,
            })?;

        info!(image = %image, "Pulling image");
        self.commander
            .run(cancel, &argv(&["docker", "pull", image]))
            .await
            .map_err(|source| SandboxError::ImagePull {
                image: image.to_string(),
                source,
            })?;

        let partial = self
            .archive_dir
            .join(format!("{}.{}.partial", Self::key(image), Uuid::new_v4()));
        let partial_arg = partial.to_string_lossy().to_string();

        if let Err(source) = self
            .commander
            .run(cancel, &argv(&["docker", "save", "-o", &partial_arg, image]))
            .await
        {
            remove_partial(&partial).await;
            return Err(SandboxError::ImageSave {
                image: image.to_string(),
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&partial, &path).await {
            remove_partial(&partial).await;
            return Err(SandboxError::Archive { path, source });
        }

        info!(image = %image, path = %path.display(), "Saved image archive");
        Ok(path)
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial archive {}: {}", path.display(), e);
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCommandRunner;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_key_is_derived_from_image_reference() {
        let key = ImageCache::key("sourcegraph/lsif-go:latest");
        assert!(key.starts_with("sourcegraph_lsif_go_latest_"));
        assert_eq!(key.len(), "sourcegraph_lsif_go_latest_".len() + KEY_DIGEST_LEN);
        assert_eq!(key, ImageCache::key("sourcegraph/lsif-go:latest"));
        assert_ne!(key, ImageCache::key("sourcegraph/lsif-node:latest"));
        assert_eq!(
            ImageCache::vm_path("circleci/node:12"),
            format!("/{}.tar", ImageCache::key("circleci/node:12"))
        );
    }

    #[tokio::test]
    async fn test_references_differing_only_in_punctuation_get_their_own_archives() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(RecordingCommandRunner::new());
        let cache = ImageCache::new(dir.path(), recorder.clone());
        let cancel = CancellationToken::new();

        assert_ne!(ImageCache::key("acme/lsif-go:1"), ImageCache::key("acme/lsif_go:1"));

        let dashed = cache.ensure_local(&cancel, "acme/lsif-go:1").await.unwrap();
        let underscored = cache.ensure_local(&cancel, "acme/lsif_go:1").await.unwrap();

        assert_ne!(dashed, underscored);
        assert!(dashed.exists() && underscored.exists());
        let pulls: Vec<String> = recorder
            .command_lines()
            .into_iter()
            .filter(|line| line.starts_with("docker pull"))
            .collect();
        assert_eq!(
            pulls,
            vec!["docker pull acme/lsif-go:1", "docker pull acme/lsif_go:1"]
        );
    }

    #[tokio::test]
    async fn test_ensure_local_pulls_once() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(RecordingCommandRunner::new());
        let cache = ImageCache::new(dir.path().join("images"), recorder.clone());
        let cancel = CancellationToken::new();

        let first = cache.ensure_local(&cancel, "sourcegraph/src-cli:latest").await.unwrap();
        let second = cache.ensure_local(&cancel, "sourcegraph/src-cli:latest").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            dir.path()
                .join("images")
                .join(format!("{}.tar", ImageCache::key("sourcegraph/src-cli:latest")))
        );
        assert!(first.exists());

        let commands = recorder.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], vec!["docker", "pull", "sourcegraph/src-cli:latest"]);
        assert_eq!(commands[1][..3].to_vec(), vec!["docker", "save", "-o"]);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(
            RecordingCommandRunner::new().fail_when(|argv| argv.get(1).map(String::as_str) == Some("save")),
        );
        let cache = ImageCache::new(dir.path(), recorder);

        let err = cache
            .ensure_local(&CancellationToken::new(), "sourcegraph/lsif-go:latest")
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::ImageSave { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_pull_is_reported() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(
            RecordingCommandRunner::new().fail_when(|argv| argv.get(1).map(String::as_str) == Some("pull")),
        );
        let cache = ImageCache::new(dir.path(), recorder.clone());

        let err = cache
            .ensure_local(&CancellationToken::new(), "sourcegraph/lsif-go:latest")
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::ImagePull { ref image, .. } if image == "sourcegraph/lsif-go:latest"));
        assert_eq!(recorder.commands().len(), 1);
    }
}
