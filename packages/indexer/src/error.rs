// ABOUTME: Error types for the index job handler and worker
// ABOUTME: ErrorList keeps every failure observable when teardown fails after a step failed

use autoindex_sandbox::{CommandError, SandboxError};
use autoindex_storage::StorageError;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to fetch repository: {0}")]
    Checkout(#[source] CommandError),

    #[error("invalid url {url}: {reason}")]
    Url { url: String, reason: String },

    #[error("failed to start sandbox: {0}")]
    Startup(#[source] SandboxError),

    #[error("failed to install dependencies: {0}")]
    Install(#[source] SandboxError),

    #[error("failed to index repository: {0}")]
    Index(#[source] SandboxError),

    #[error("failed to upload index: {0}")]
    Upload(#[source] SandboxError),

    #[error("failed to tear down sandbox: {0}")]
    Teardown(#[source] SandboxError),

    #[error("{0}")]
    Aggregate(ErrorList),

    #[error("store error: {0}")]
    Store(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, HandlerError>;

/// Accumulates errors from steps that must all run
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<HandlerError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: HandlerError) {
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[HandlerError] {
        &self.errors
    }

    /// `Ok` when empty, the lone error when there is one, otherwise an aggregate.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(HandlerError::Aggregate(self)),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
