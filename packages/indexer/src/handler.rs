// ABOUTME: Runs one index job end to end: checkout, sandbox startup, install, index, upload
// ABOUTME: The sandbox is always torn down and teardown errors are aggregated with step errors

use crate::error::{ErrorList, HandlerError, Result};
use crate::running::RunningIndexes;
use crate::urls::{make_clone_url, make_upload_url};
use autoindex_config::IndexerSettings;
use autoindex_sandbox::{
    CommandRunner, CommandSpec, DockerRunner, FirecrackerOptions, FirecrackerRunner, ImageCache,
    ResourceOptions, Runner,
};
use autoindex_storage::Index;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Environment variable the uploader reads its endpoint from
pub const UPLOAD_ENDPOINT_ENV: &str = "SRC_ENDPOINT";

const UPLOAD_ROUTE: &str = "/.internal-code-intel/lsif/upload";

pub struct Handler {
    commander: Arc<dyn CommandRunner>,
    running: Arc<RunningIndexes>,
    settings: IndexerSettings,
}

impl Handler {
    pub fn new(
        commander: Arc<dyn CommandRunner>,
        running: Arc<RunningIndexes>,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            commander,
            running,
            settings,
        }
    }

    pub fn running(&self) -> &Arc<RunningIndexes> {
        &self.running
    }

    /// Process a single index record. Returns every failure observed, including
    /// teardown failures that follow a failed step.
    pub async fn handle(&self, cancel: &CancellationToken, index: &Index) -> Result<()> {
        let _running = self.running.track(index.id);
        info!(
            index_id = index.id,
            repository = %index.repository_name,
            commit = %index.commit,
            "Handling index"
        );

        // Removed on every return path when dropped.
        let workspace = self.fetch_repository(cancel, index).await?;

        let name = Uuid::new_v4().to_string();
        let runner = self.make_runner(workspace.path(), &name, index);

        self.run_in_sandbox(cancel, index, runner.as_ref()).await
    }

    /// Start `runner`, run the install, index and upload steps in it, then tear it
    /// down on every path. A step error and a teardown error are both returned.
    pub async fn run_in_sandbox(
        &self,
        cancel: &CancellationToken,
        index: &Index,
        runner: &dyn Runner,
    ) -> Result<()> {
        let upload_url = make_upload_url(
            &self.settings.frontend_url_from_docker,
            &self.settings.auth_token,
        )?;

        runner.startup(cancel).await.map_err(HandlerError::Startup)?;

        let steps = AssertUnwindSafe(self.run_steps(cancel, runner, index, &upload_url))
            .catch_unwind()
            .await;

        let mut errors = ErrorList::new();
        let crashed = match steps {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                errors.push(e);
                None
            }
            Err(payload) => Some(payload),
        };

        // Cleanup proceeds even when the job itself was cancelled.
        if let Err(e) = runner.teardown(&CancellationToken::new()).await {
            warn!(index_id = index.id, "Failed to tear down sandbox: {}", e);
            errors.push(HandlerError::Teardown(e));
        }

        if let Some(payload) = crashed {
            panic::resume_unwind(payload);
        }

        errors.into_result()
    }

    async fn run_steps(
        &self,
        cancel: &CancellationToken,
        runner: &dyn Runner,
        index: &Index,
        upload_url: &Url,
    ) -> Result<()> {
        if let Some(install_image) = install_image(index) {
            let spec = CommandSpec::new(index.root.clone(), index.install_commands.clone());
            runner
                .invoke(cancel, install_image, &spec)
                .await
                .map_err(HandlerError::Install)?;
        }

        let spec = CommandSpec::new(index.root.clone(), index.indexer_args.clone());
        runner
            .invoke(cancel, &index.indexer, &spec)
            .await
            .map_err(HandlerError::Index)?;

        let spec = CommandSpec::new(index.root.clone(), upload_command(index))
            .with_env(UPLOAD_ENDPOINT_ENV, upload_url.as_str());
        runner
            .invoke(cancel, &self.settings.uploader_image, &spec)
            .await
            .map_err(HandlerError::Upload)?;

        Ok(())
    }

    /// Create a workspace and check the target commit out into it
    async fn fetch_repository(&self, cancel: &CancellationToken, index: &Index) -> Result<TempDir> {
        let workspace_root = self.settings.workspace_root.clone();
        let workspace = tokio::task::spawn_blocking(move || create_workspace(workspace_root))
            .await
            .map_err(|e| HandlerError::Workspace(io::Error::other(e)))?
            .map_err(HandlerError::Workspace)?;

        let clone_url = make_clone_url(
            &self.settings.frontend_url,
            &self.settings.auth_token,
            &index.repository_name,
        )?;
        let dir = workspace.path().to_string_lossy().to_string();

        let commands: [Vec<&str>; 3] = [
            vec!["-C", dir.as_str(), "init"],
            vec![
                "-C",
                dir.as_str(),
                "-c",
                "protocol.version=2",
                "fetch",
                clone_url.as_str(),
                index.commit.as_str(),
            ],
            vec!["-C", dir.as_str(), "checkout", index.commit.as_str()],
        ];

        for args in commands {
            let argv: Vec<String> = std::iter::once("git")
                .chain(args)
                .map(str::to_string)
                .collect();
            self.commander
                .run(cancel, &argv)
                .await
                .map_err(HandlerError::Checkout)?;
        }

        Ok(workspace)
    }

    fn make_runner(&self, repo_dir: &Path, name: &str, index: &Index) -> Box<dyn Runner> {
        let resources = ResourceOptions {
            num_cpus: self.settings.firecracker_num_cpus,
            memory: self.settings.firecracker_memory.clone(),
        };

        if !self.settings.use_firecracker {
            return Box::new(DockerRunner::new(
                repo_dir,
                resources,
                self.commander.clone(),
            ));
        }

        let mut images = vec![
            self.settings.uploader_image.clone(),
            index.indexer.clone(),
        ];
        images.extend(install_image(index).map(str::to_string));

        Box::new(FirecrackerRunner::new(
            repo_dir,
            resources,
            self.commander.clone(),
            ImageCache::new(&self.settings.image_archive_path, self.commander.clone()),
            FirecrackerOptions {
                name: name.to_string(),
                base_image: self.settings.firecracker_image.clone(),
                images,
            },
        ))
    }
}

fn create_workspace(root: Option<PathBuf>) -> io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("autoindex-");
    match root {
        Some(root) => {
            std::fs::create_dir_all(&root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

fn install_image(index: &Index) -> Option<&str> {
    index
        .install_image
        .as_deref()
        .filter(|image| !image.is_empty())
}

fn upload_command(index: &Index) -> Vec<String> {
    [
        "lsif",
        "upload",
        "-no-progress",
        "-repo",
        index.repository_name.as_str(),
        "-commit",
        index.commit.as_str(),
        "-upload-route",
        UPLOAD_ROUTE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
