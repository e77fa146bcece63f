// ABOUTME: Index job execution for autoindex
// ABOUTME: Checks repositories out, runs indexers in a sandbox and uploads the results

pub mod error;
pub mod handler;
pub mod running;
pub mod urls;
pub mod worker;

pub use error::{ErrorList, HandlerError, Result};
pub use handler::{Handler, UPLOAD_ENDPOINT_ENV};
pub use running::{RunningGuard, RunningIndexes};
pub use urls::{make_clone_url, make_upload_url};
pub use worker::{PollOutcome, Worker};
