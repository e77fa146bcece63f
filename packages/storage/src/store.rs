// ABOUTME: SQLite-backed index queue and indexable repository store
// ABOUTME: Provides the transactional enqueue contract and the worker dequeue surface

use crate::error::{Result, StorageError};
use crate::types::{
    format_timestamp, parse_timestamp, Index, IndexState, IndexableRepository,
    IndexableRepositoryQueryOptions, NewIndex, RepositoryUsage,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const INDEX_COLUMNS: &str = "id, state, repository_id, repository_name, commit_hash, root, \
     install_image, install_commands, indexer, indexer_args, failure_message, \
     queued_at, started_at, finished_at";

const IS_QUEUED_QUERY: &str = "SELECT COUNT(*) FROM lsif_indexes \
    WHERE repository_id = ?1 AND commit_hash = ?2 AND state IN ('queued', 'processing')";

#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        debug!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;

        info!("Database connection established");
        Ok(store)
    }

    /// Single-connection in-memory store. The connection never idles out, so the
    /// database lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // INDEXABLE REPOSITORIES
    // ========================================================================

    /// Candidates that satisfy every scheduling threshold as of `now`.
    pub async fn indexable_repositories(
        &self,
        options: &IndexableRepositoryQueryOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<IndexableRepository>> {
        let cutoff = chrono::Duration::from_std(options.minimum_time_since_last_enqueue)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let rows = sqlx::query(
            r#"
            SELECT repository_id, repository_name, search_count, precise_count,
                   search_ratio, last_index_enqueued_at
            FROM indexable_repositories
            WHERE (last_index_enqueued_at IS NULL OR last_index_enqueued_at <= ?1)
              AND search_count >= ?2
              AND precise_count <= ?3
              AND search_ratio >= ?4
            ORDER BY search_count DESC, repository_id
            LIMIT ?5
            "#,
        )
        .bind(format_timestamp(cutoff))
        .bind(options.minimum_search_count)
        .bind(options.maximum_precise_count)
        .bind(options.minimum_search_ratio)
        .bind(options.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_indexable_repository).collect()
    }

    pub async fn get_indexable_repository(
        &self,
        repository_id: i64,
    ) -> Result<Option<IndexableRepository>> {
        let row = sqlx::query(
            r#"
            SELECT repository_id, repository_name, search_count, precise_count,
                   search_ratio, last_index_enqueued_at
            FROM indexable_repositories
            WHERE repository_id = ?1
            "#,
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_indexable_repository).transpose()
    }

    /// Record fresh usage counters. Never touches the last-enqueue timestamp.
    pub async fn upsert_indexable_repository(
        &self,
        usage: &RepositoryUsage,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexable_repositories (
                repository_id, repository_name, search_count, precise_count,
                search_ratio, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (repository_id) DO UPDATE SET
                repository_name = excluded.repository_name,
                search_count = excluded.search_count,
                precise_count = excluded.precise_count,
                search_ratio = excluded.search_ratio,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(usage.repository_id)
        .bind(&usage.repository_name)
        .bind(usage.search_count)
        .bind(usage.precise_count)
        .bind(usage.search_ratio())
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // INDEXES
    // ========================================================================

    /// Whether an index for the pair is waiting or already running.
    pub async fn is_queued(&self, repository_id: i64, commit: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(IS_QUEUED_QUERY)
            .bind(repository_id)
            .bind(commit)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn transact(&self) -> Result<IndexTransaction> {
        let tx = self.pool.begin().await?;
        Ok(IndexTransaction { tx })
    }

    pub async fn get_index(&self, id: i64) -> Result<Index> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM lsif_indexes WHERE id = ?1",
            INDEX_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound(id))?;

        row_to_index(&row)
    }

    pub async fn list_indexes(&self, repository_id: i64) -> Result<Vec<Index>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM lsif_indexes WHERE repository_id = ?1 ORDER BY id",
            INDEX_COLUMNS
        ))
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_index).collect()
    }

    /// Claim the oldest queued index, moving it to `processing`.
    pub async fn dequeue(&self, now: DateTime<Utc>) -> Result<Option<Index>> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM lsif_indexes
            WHERE state = 'queued'
            ORDER BY queued_at, id
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        let claimed = sqlx::query(
            r#"
            UPDATE lsif_indexes SET state = 'processing', started_at = ?1
            WHERE id = ?2 AND state = 'queued'
            "#,
        )
        .bind(format_timestamp(now))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            // Another worker got there first.
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM lsif_indexes WHERE id = ?1",
            INDEX_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let index = row_to_index(&row)?;

        tx.commit().await?;
        debug!(index_id = id, "Dequeued index");

        Ok(Some(index))
    }

    pub async fn mark_complete(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.finish(id, IndexState::Completed, None, now).await
    }

    pub async fn mark_errored(&self, id: i64, message: &str, now: DateTime<Utc>) -> Result<()> {
        self.finish(id, IndexState::Errored, Some(message), now).await
    }

    async fn finish(
        &self,
        id: i64,
        state: IndexState,
        failure_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE lsif_indexes
            SET state = ?1, failure_message = ?2, finished_at = ?3
            WHERE id = ?4 AND state = 'processing'
            "#,
        )
        .bind(state.as_str())
        .bind(failure_message)
        .bind(format_timestamp(now))
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}

/// Unit of work for enqueueing. Dropping it without `commit` rolls everything back.
pub struct IndexTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl IndexTransaction {
    pub async fn insert_index(&mut self, index: &NewIndex, now: DateTime<Utc>) -> Result<i64> {
        let install_commands = serde_json::to_string(&index.install_commands)?;
        let indexer_args = serde_json::to_string(&index.indexer_args)?;

        let result = sqlx::query(
            r#"
            INSERT INTO lsif_indexes (
                state, repository_id, repository_name, commit_hash, root,
                install_image, install_commands, indexer, indexer_args, queued_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(IndexState::Queued.as_str())
        .bind(index.repository_id)
        .bind(&index.repository_name)
        .bind(&index.commit)
        .bind(&index.root)
        .bind(index.install_image.as_deref())
        .bind(&install_commands)
        .bind(&index.indexer)
        .bind(&indexer_args)
        .bind(format_timestamp(now))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StorageError::AlreadyQueued {
                    repository_id: index.repository_id,
                    commit: index.commit.clone(),
                }
            }
            other => StorageError::Database(other),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Same check as `IndexStore::is_queued`, on the transaction's connection.
    pub async fn is_queued(&mut self, repository_id: i64, commit: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(IS_QUEUED_QUERY)
            .bind(repository_id)
            .bind(commit)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count > 0)
    }

    /// Stamp the repository as enqueued at `at`; an older timestamp never overwrites a newer one.
    pub async fn update_last_enqueued(
        &mut self,
        repository_id: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let at = format_timestamp(at);
        sqlx::query(
            r#"
            UPDATE indexable_repositories
            SET last_index_enqueued_at = ?1, updated_at = ?1
            WHERE repository_id = ?2
              AND (last_index_enqueued_at IS NULL OR last_index_enqueued_at < ?1)
            "#,
        )
        .bind(&at)
        .bind(repository_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn row_to_indexable_repository(row: &SqliteRow) -> Result<IndexableRepository> {
    Ok(IndexableRepository {
        repository_id: row.try_get("repository_id")?,
        repository_name: row.try_get("repository_name")?,
        search_count: row.try_get("search_count")?,
        precise_count: row.try_get("precise_count")?,
        search_ratio: row.try_get("search_ratio")?,
        last_index_enqueued_at: optional_timestamp(row, "last_index_enqueued_at")?,
    })
}

fn row_to_index(row: &SqliteRow) -> Result<Index> {
    Ok(Index {
        id: row.try_get("id")?,
        state: IndexState::from_str(&row.try_get::<String, _>("state")?)?,
        repository_id: row.try_get("repository_id")?,
        repository_name: row.try_get("repository_name")?,
        commit: row.try_get("commit_hash")?,
        root: row.try_get("root")?,
        install_image: row.try_get("install_image")?,
        install_commands: serde_json::from_str(&row.try_get::<String, _>("install_commands")?)?,
        indexer: row.try_get("indexer")?,
        indexer_args: serde_json::from_str(&row.try_get::<String, _>("indexer_args")?)?,
        failure_message: row.try_get("failure_message")?,
        queued_at: parse_timestamp(&row.try_get::<String, _>("queued_at")?)?,
        started_at: optional_timestamp(row, "started_at")?,
        finished_at: optional_timestamp(row, "finished_at")?,
    })
}

fn optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<String>, _>(column)?
        .as_deref()
        .map(parse_timestamp)
        .transpose()
}
