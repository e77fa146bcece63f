// ABOUTME: Container runner: one fresh, auto-removed docker container per invocation
// ABOUTME: Mounts the job workspace at /data and works from the job's root inside it

use super::{flag_pairs, CommandSpec, ResourceOptions, Runner};
use crate::command::CommandRunner;
use crate::error::SandboxResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where the workspace is mounted inside containers
pub const DOCKER_MOUNT_PATH: &str = "/data";

pub struct DockerRunner {
    repo_dir: PathBuf,
    resources: ResourceOptions,
    commander: Arc<dyn CommandRunner>,
}

impl DockerRunner {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        resources: ResourceOptions,
        commander: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            resources,
            commander,
        }
    }
}

/// Working directory for a job root: the mount path itself for the repository
/// root, otherwise the root joined onto the mount path. `..` never climbs above
/// the mount path.
pub fn working_directory(root: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in root.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        DOCKER_MOUNT_PATH.to_string()
    } else {
        format!("{}/{}", DOCKER_MOUNT_PATH, parts.join("/"))
    }
}

#[async_trait]
impl Runner for DockerRunner {
    async fn startup(&self, _cancel: &CancellationToken) -> SandboxResult<()> {
        Ok(())
    }

    async fn teardown(&self, _cancel: &CancellationToken) -> SandboxResult<()> {
        Ok(())
    }

    async fn invoke(
        &self,
        cancel: &CancellationToken,
        image: &str,
        spec: &CommandSpec,
    ) -> SandboxResult<()> {
        let mount_point = self.repo_dir.to_string_lossy();
        let args = self.make_args(image, spec, &mount_point);
        debug!(image = %image, "Invoking container");
        self.commander.run(cancel, &args).await?;
        Ok(())
    }

    fn make_args(&self, image: &str, spec: &CommandSpec, mount_point: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "docker".into(),
            "run".into(),
            "--rm".into(),
            "--cpus".into(),
            self.resources.num_cpus.to_string(),
            "--memory".into(),
            self.resources.memory.clone(),
            "-v".into(),
            format!("{}:{}", mount_point, DOCKER_MOUNT_PATH),
            "-w".into(),
            working_directory(&spec.root),
        ];

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        args.extend(flag_pairs("-e", env.iter().map(String::as_str)));

        args.push(image.to_string());
        args.extend(spec.command.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCommandRunner;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn resources() -> ResourceOptions {
        ResourceOptions {
            num_cpus: 4,
            memory: "12G".to_string(),
        }
    }

    #[rstest]
    #[case("", "/data")]
    #[case(".", "/data")]
    #[case("/", "/data")]
    #[case("web", "/data/web")]
    #[case("web/", "/data/web")]
    #[case("./web/client", "/data/web/client")]
    #[case("..", "/data")]
    #[case("../..", "/data")]
    #[case("web/../lib", "/data/lib")]
    #[case("web/../../../etc", "/data/etc")]
    fn test_working_directory(#[case] root: &str, #[case] expected: &str) {
        assert_eq!(working_directory(root), expected);
    }

    #[test]
    fn test_make_args() {
        let runner = DockerRunner::new(
            "/tmp/ws",
            resources(),
            Arc::new(RecordingCommandRunner::new()),
        );
        let spec = CommandSpec::new("web/", vec!["lsif-tsc".into(), "-p".into(), ".".into()])
            .with_env("B", "2")
            .with_env("A", "1");

        assert_eq!(
            runner.make_args("sourcegraph/lsif-node:latest", &spec, "/tmp/ws"),
            vec![
                "docker", "run", "--rm", "--cpus", "4", "--memory", "12G", "-v",
                "/tmp/ws:/data", "-w", "/data/web", "-e", "A=1", "-e", "B=2",
                "sourcegraph/lsif-node:latest", "lsif-tsc", "-p", ".",
            ]
        );
    }

    #[tokio::test]
    async fn test_invoke_runs_one_container_per_call() {
        let recorder = Arc::new(RecordingCommandRunner::new());
        let runner = DockerRunner::new("/tmp/ws", resources(), recorder.clone());
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new("", vec!["lsif-go".into()]);

        runner.startup(&cancel).await.unwrap();
        runner.invoke(&cancel, "sourcegraph/lsif-go:latest", &spec).await.unwrap();
        runner.invoke(&cancel, "sourcegraph/lsif-go:latest", &spec).await.unwrap();
        runner.teardown(&cancel).await.unwrap();

        let commands = recorder.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|argv| argv[0] == "docker" && argv[1] == "run" && argv[2] == "--rm"));
        assert!(commands[0].contains(&"/tmp/ws:/data".to_string()));
    }

    #[tokio::test]
    async fn test_invoke_surfaces_command_failure() {
        let recorder = Arc::new(
            RecordingCommandRunner::new().fail_when(|argv| argv.iter().any(|a| a == "lsif-go")),
        );
        let runner = DockerRunner::new("/tmp/ws", resources(), recorder);
        let spec = CommandSpec::new("", vec!["lsif-go".into()]);

        let err = runner
            .invoke(&CancellationToken::new(), "sourcegraph/lsif-go:latest", &spec)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit status 1"));
    }
}
