// ABOUTME: MicroVM runner: boots an ignite firecracker VM and runs containers inside it
// ABOUTME: Stages image archives into the VM at startup and force-removes the VM on teardown

use super::{flag_pairs, CommandSpec, DockerRunner, ResourceOptions, Runner};
use crate::command::CommandRunner;
use crate::error::{SandboxError, SandboxResult};
use crate::image_cache::ImageCache;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where the workspace is copied inside the VM
pub const FIRECRACKER_MOUNT_PATH: &str = "/repo-dir";

const COMMON_FLAGS: [&str; 4] = ["--runtime", "docker", "--network-plugin", "docker-bridge"];

#[derive(Debug, Clone)]
pub struct FirecrackerOptions {
    /// Unique VM name, used by every ignite command
    pub name: String,
    /// VM base image
    pub base_image: String,
    /// Container images the job will invoke; loaded into the VM at startup
    pub images: Vec<String>,
}

pub struct FirecrackerRunner {
    name: String,
    base_image: String,
    images: BTreeSet<String>,
    repo_dir: PathBuf,
    resources: ResourceOptions,
    commander: Arc<dyn CommandRunner>,
    image_cache: ImageCache,
    docker: DockerRunner,
}

impl FirecrackerRunner {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        resources: ResourceOptions,
        commander: Arc<dyn CommandRunner>,
        image_cache: ImageCache,
        options: FirecrackerOptions,
    ) -> Self {
        let repo_dir = repo_dir.into();
        let docker = DockerRunner::new(repo_dir.clone(), resources.clone(), commander.clone());

        Self {
            name: options.name,
            base_image: options.base_image,
            images: options
                .images
                .into_iter()
                .filter(|image| !image.is_empty())
                .collect(),
            repo_dir,
            resources,
            commander,
            image_cache,
            docker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn common_flags() -> impl Iterator<Item = String> {
        COMMON_FLAGS.iter().map(|flag| flag.to_string())
    }

    fn start_args(&self, archives: &[(PathBuf, String)]) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "ignite".into(),
            "run".into(),
            "--name".into(),
            self.name.clone(),
            "--ssh".into(),
        ];
        args.extend(Self::common_flags());
        args.extend([
            "--cpus".to_string(),
            self.resources.num_cpus.to_string(),
            "--memory".to_string(),
            self.resources.memory.clone(),
        ]);

        let mut copies = vec![format!(
            "{}:{}",
            self.repo_dir.to_string_lossy(),
            FIRECRACKER_MOUNT_PATH
        )];
        copies.extend(
            archives
                .iter()
                .map(|(host, vm)| format!("{}:{}", host.to_string_lossy(), vm)),
        );
        args.extend(flag_pairs("--copy-files", copies.iter().map(String::as_str)));

        args.push(self.base_image.clone());
        args
    }

    fn lifecycle_args(&self, verb: &str, extra: &[&str]) -> Vec<String> {
        let mut args = vec!["ignite".to_string(), verb.to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args.extend(Self::common_flags());
        args.push(self.name.clone());
        args
    }

    async fn boot(&self, cancel: &CancellationToken) -> SandboxResult<()> {
        let mut archives = Vec::with_capacity(self.images.len());
        for image in &self.images {
            let host = self.image_cache.ensure_local(cancel, image).await?;
            archives.push((host, ImageCache::vm_path(image)));
        }

        info!(vm = %self.name, "Starting firecracker vm");
        if let Err(source) = self.commander.run(cancel, &self.start_args(&archives)).await {
            // `ignite run` can fail after registering the vm.
            self.discard().await;
            return Err(SandboxError::VmStart {
                name: self.name.clone(),
                source,
            });
        }

        for image in &self.images {
            let load = vec![
                "ignite".to_string(),
                "exec".to_string(),
                self.name.clone(),
                "--".to_string(),
                "docker".to_string(),
                "load".to_string(),
                "-i".to_string(),
                ImageCache::vm_path(image),
            ];
            if let Err(source) = self.commander.run(cancel, &load).await {
                self.discard().await;
                return Err(SandboxError::ImageLoad {
                    image: image.clone(),
                    source,
                });
            }
        }

        Ok(())
    }

    /// Remove a half-started vm. Runs uncancelled so a cancelled boot still cleans up.
    async fn discard(&self) {
        if let Err(e) = self.teardown(&CancellationToken::new()).await {
            warn!(vm = %self.name, "Failed to clean up vm after failed startup: {}", e);
        }
    }
}

#[async_trait]
impl Runner for FirecrackerRunner {
    async fn startup(&self, cancel: &CancellationToken) -> SandboxResult<()> {
        self.boot(cancel).await?;
        self.docker.startup(cancel).await
    }

    async fn teardown(&self, cancel: &CancellationToken) -> SandboxResult<()> {
        info!(vm = %self.name, "Tearing down firecracker vm");

        if let Err(e) = self.commander.run(cancel, &self.lifecycle_args("stop", &[])).await {
            warn!(vm = %self.name, "Failed to stop firecracker vm: {}", e);
        }
        if let Err(e) = self
            .commander
            .run(cancel, &self.lifecycle_args("rm", &["-f"]))
            .await
        {
            warn!(vm = %self.name, "Failed to remove firecracker vm: {}", e);
        }

        self.docker.teardown(cancel).await
    }

    async fn invoke(
        &self,
        cancel: &CancellationToken,
        image: &str,
        spec: &CommandSpec,
    ) -> SandboxResult<()> {
        let args = self.make_args(image, spec, FIRECRACKER_MOUNT_PATH);
        self.commander.run(cancel, &args).await?;
        Ok(())
    }

    fn make_args(&self, image: &str, spec: &CommandSpec, mount_point: &str) -> Vec<String> {
        let mut args = vec![
            "ignite".to_string(),
            "exec".to_string(),
            self.name.clone(),
            "--".to_string(),
        ];
        args.extend(self.docker.make_args(image, spec, mount_point));
        args
    }
}
