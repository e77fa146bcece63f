// ABOUTME: Error types for host command execution and sandbox lifecycle steps
// ABOUTME: Every command failure carries the (credential-redacted) command line

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("illegal command '{0}'")]
    Disallowed(String),

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed `{command}`: {}", exit_status(.code))]
    Failed { command: String, code: Option<i32> },

    #[error("failed `{command}`: canceled")]
    Cancelled { command: String },

    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("output reader for `{command}` failed: {message}")]
    Stream { command: String, message: String },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to pull {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to save {image}: {source}")]
    ImageSave {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to load {image}: {source}")]
    ImageLoad {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to start firecracker vm {name}: {source}")]
    VmStart {
        name: String,
        #[source]
        source: CommandError,
    },

    #[error("image archive error at {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
