// ABOUTME: Test double for CommandRunner that records argv instead of spawning processes
// ABOUTME: Enabled for downstream crates through the `test-utils` feature

use crate::command::{CommandRunner, HostCommand};
use crate::error::{CommandError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

type Predicate = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Records every command it is asked to run.
///
/// Allow-list checks still apply. `docker save -o <path>` creates an empty
/// file at `<path>` so image archives appear as they would on a real host.
#[derive(Default)]
pub struct RecordingCommandRunner {
    commands: Mutex<Vec<Vec<String>>>,
    fail: Option<Predicate>,
    panic: Option<Predicate>,
}

impl RecordingCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands matching `predicate` exit with status 1
    pub fn fail_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.fail = Some(Box::new(predicate));
        self
    }

    /// Commands matching `predicate` panic mid-run
    pub fn panic_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.panic = Some(Box::new(predicate));
        self
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.lock().clone()
    }

    /// Recorded commands joined with spaces
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().iter().map(|argv| argv.join(" ")).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<String>>> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn run(&self, cancel: &CancellationToken, argv: &[String]) -> Result<()> {
        let command = HostCommand::from_argv(argv)?;
        self.lock().push(argv.to_vec());

        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled {
                command: command.command_line(),
            });
        }
        if self.panic.as_ref().is_some_and(|p| p(argv)) {
            panic!("simulated crash running {}", command.command_line());
        }
        if self.fail.as_ref().is_some_and(|p| p(argv)) {
            return Err(CommandError::Failed {
                command: command.command_line(),
                code: Some(1),
            });
        }

        if let [docker, save, flag, path, ..] = argv {
            if docker == "docker" && save == "save" && flag == "-o" {
                std::fs::write(path, b"").map_err(|source| CommandError::Spawn {
                    command: command.command_line(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}
