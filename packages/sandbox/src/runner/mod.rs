// ABOUTME: Sandbox runner abstraction shared by the docker and firecracker variants
// ABOUTME: Defines the startup/invoke/teardown lifecycle and the command specification

mod docker;
mod firecracker;

pub use docker::{working_directory, DockerRunner, DOCKER_MOUNT_PATH};
pub use firecracker::{FirecrackerOptions, FirecrackerRunner, FIRECRACKER_MOUNT_PATH};

use crate::error::SandboxResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// A command to run inside a sandbox image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Directory within the repository, relative to the mount path
    pub root: String,
    pub command: Vec<String>,
    /// Sorted so the generated argv is stable
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(root: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            root: root.into(),
            command,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// CPU and memory limits applied to containers and VMs alike
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOptions {
    pub num_cpus: u32,
    /// Size string understood by docker and ignite, e.g. `12G`
    pub memory: String,
}

/// Lifecycle of one sandbox serving a single job.
///
/// `startup` must precede any `invoke`; `teardown` is called exactly once by
/// the owner on every exit path after a successful startup.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn startup(&self, cancel: &CancellationToken) -> SandboxResult<()>;

    async fn teardown(&self, cancel: &CancellationToken) -> SandboxResult<()>;

    async fn invoke(
        &self,
        cancel: &CancellationToken,
        image: &str,
        spec: &CommandSpec,
    ) -> SandboxResult<()>;

    /// Host argv that runs `spec` in `image` with the workspace mounted from `mount_point`
    fn make_args(&self, image: &str, spec: &CommandSpec, mount_point: &str) -> Vec<String>;
}

/// Expand `(flag, values)` pairs into `flag v1 flag v2 ...`
pub(crate) fn flag_pairs<'a, I>(flag: &str, values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| [flag.to_string(), value.to_string()])
        .collect()
}
