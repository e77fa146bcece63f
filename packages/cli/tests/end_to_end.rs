// ABOUTME: Scheduler and worker wired to one store: a Go repository goes from candidate to completed
// ABOUTME: Commands are recorded rather than spawned, so no git, docker or ignite is needed

use async_trait::async_trait;
use autoindex_config::{IndexerSettings, SchedulerSettings};
use autoindex_indexer::{Handler, PollOutcome, RunningIndexes, Worker};
use autoindex_sandbox::testing::RecordingCommandRunner;
use autoindex_scheduler::{GitserverClient, GitserverError, Scheduler};
use autoindex_storage::{IndexState, IndexStore, RepositoryUsage};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const UPLOADER: &str = "sourcegraph/src-cli:latest";
const GO_INDEXER: &str = "sourcegraph/lsif-go:latest";

/// `acme/widgets` at `abc123`, a Go module without declared configuration
struct GoRepository;

#[async_trait]
impl GitserverClient for GoRepository {
    async fn head(&self, repository: &str) -> Result<String, GitserverError> {
        match repository {
            "acme/widgets" => Ok("abc123".to_string()),
            other => Err(GitserverError::RepoNotExist(other.to_string())),
        }
    }

    async fn read_file(
        &self,
        _repository: &str,
        _commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitserverError> {
        Ok((path == "go.mod").then(|| b"module acme/widgets\n".to_vec()))
    }
}

fn scheduler_settings() -> SchedulerSettings {
    SchedulerSettings {
        interval: Duration::from_secs(60),
        batch_size: 10,
        minimum_time_since_last_enqueue: Duration::from_secs(3600),
        minimum_search_count: 10,
        minimum_search_ratio: 0.5,
        maximum_precise_count: 5,
        repos_root: PathBuf::from("/nonexistent"),
    }
}

fn indexer_settings(scratch: &TempDir) -> IndexerSettings {
    IndexerSettings {
        frontend_url: "https://sourcegraph.test".to_string(),
        frontend_url_from_docker: "https://sourcegraph.test".to_string(),
        auth_token: "hunter2".to_string(),
        use_firecracker: true,
        firecracker_image: "sourcegraph/ignite-ubuntu:insiders".to_string(),
        firecracker_num_cpus: 2,
        firecracker_memory: "4G".to_string(),
        image_archive_path: scratch.path().join("images"),
        uploader_image: UPLOADER.to_string(),
        workspace_root: Some(scratch.path().join("jobs")),
        poll_interval: Duration::from_millis(10),
    }
}

fn count(commands: &[Vec<String>], predicate: impl Fn(&[String]) -> bool) -> usize {
    commands.iter().filter(|c| predicate(c)).count()
}

fn invokes(commands: &[Vec<String>], image: &str) -> usize {
    count(commands, |c| {
        c.iter().any(|a| a == "run") && c.iter().any(|a| a == image)
    })
}

#[tokio::test]
async fn test_go_repository_is_scheduled_and_indexed() {
    let store = IndexStore::in_memory().await.unwrap();
    store
        .upsert_indexable_repository(
            &RepositoryUsage {
                repository_id: 1,
                repository_name: "acme/widgets".to_string(),
                search_count: 100,
                precise_count: 0,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let scheduler = Scheduler::new(store.clone(), Arc::new(GoRepository), &scheduler_settings());
    scheduler.handle().await.unwrap();

    let queued = store.list_indexes(1).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].root, "");
    assert_eq!(queued[0].install_image, None);
    assert_eq!(queued[0].indexer, GO_INDEXER);
    assert_eq!(queued[0].indexer_args, vec!["lsif-go", "--no-animation"]);

    let scratch = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingCommandRunner::new());
    let handler = Handler::new(
        recorder.clone(),
        Arc::new(RunningIndexes::new()),
        indexer_settings(&scratch),
    );
    let worker = Worker::new(store.clone(), handler, Duration::from_millis(10));
    let cancel = CancellationToken::new();

    assert_eq!(
        worker.poll(&cancel).await.unwrap(),
        PollOutcome::Completed(queued[0].id)
    );
    assert_eq!(worker.poll(&cancel).await.unwrap(), PollOutcome::Idle);
    assert_eq!(
        store.get_index(queued[0].id).await.unwrap().state,
        IndexState::Completed
    );

    let commands = recorder.commands();
    assert_eq!(count(&commands, |c| c[0] == "git"), 3);
    // No install image, so only the indexer and uploader are pulled.
    assert_eq!(count(&commands, |c| c[0] == "docker" && c[1] == "pull"), 2);
    assert_eq!(invokes(&commands, GO_INDEXER), 1);
    assert_eq!(invokes(&commands, UPLOADER), 1);
    assert_eq!(count(&commands, |c| c[0] == "ignite" && c[1] == "rm"), 1);

    // Completed work no longer blocks the next enqueue; the stamp does.
    assert!(store.is_queued(1, "abc123").await.is_ok_and(|queued| !queued));
    let repo = store.get_indexable_repository(1).await.unwrap().unwrap();
    assert!(repo.last_index_enqueued_at.is_some());
}
