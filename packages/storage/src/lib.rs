// ABOUTME: Persistence for autoindex: the index job queue and repository usage candidates
// ABOUTME: SQLite via sqlx with embedded migrations

pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StorageError};
pub use store::{IndexStore, IndexTransaction};
pub use types::{
    format_timestamp, parse_timestamp, Index, IndexState, IndexableRepository,
    IndexableRepositoryQueryOptions, NewIndex, RepositoryUsage,
};
