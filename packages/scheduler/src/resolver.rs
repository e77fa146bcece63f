// ABOUTME: Resolves the index jobs for a repository at a commit
// ABOUTME: Declared configuration wins; otherwise a Go or TypeScript heuristic applies

use crate::config::{
    parse_json, parse_yaml, AutoIndexConfiguration, IndexConfiguration, IndexJob,
    InstallConfiguration,
};
use crate::error::ConfigurationError;
use crate::gitserver::GitserverClient;
use tracing::debug;

pub const GO_MANIFEST: &str = "go.mod";
pub const GO_INDEXER: &str = "sourcegraph/lsif-go:latest";
pub const GO_ARGUMENTS: [&str; 2] = ["lsif-go", "--no-animation"];

pub const TYPESCRIPT_INSTALL_IMAGE: &str = "circleci/node:12";
pub const TYPESCRIPT_INSTALL_COMMANDS: [&str; 4] =
    ["yarn", "install", "--frozen-lockfile", "--non-interactive"];
pub const TYPESCRIPT_INDEXER: &str = "sourcegraph/lsif-node:latest";
pub const TYPESCRIPT_ARGUMENTS: [&str; 3] = ["lsif-tsc", "-p", "."];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

/// Declared configuration files, in lookup order
const CONFIGURATION_FILES: [(&str, Format); 3] = [
    ("autoindex.json", Format::Json),
    ("autoindex.yml", Format::Yaml),
    ("autoindex.yaml", Format::Yaml),
];

/// Index jobs for `repository` at `commit`. Never empty; a malformed declaration
/// is an error, and a declaration without jobs falls back to the heuristics.
pub async fn resolve(
    client: &dyn GitserverClient,
    repository: &str,
    commit: &str,
) -> Result<Vec<IndexJob>, ConfigurationError> {
    match declared_configuration(client, repository, commit).await? {
        Some(configuration) if !configuration.index_jobs.is_empty() => {
            debug!(repository = %repository, jobs = configuration.index_jobs.len(), "Using declared configuration");
            return Ok(configuration.index_jobs);
        }
        Some(_) => {
            debug!(repository = %repository, "Declared configuration lists no jobs");
        }
        None => {}
    }

    if client.file_exists(repository, commit, GO_MANIFEST).await? {
        return Ok(vec![go_job()]);
    }
    Ok(vec![typescript_job()])
}

/// The first configuration file present at `commit`, parsed
pub async fn declared_configuration(
    client: &dyn GitserverClient,
    repository: &str,
    commit: &str,
) -> Result<Option<AutoIndexConfiguration>, ConfigurationError> {
    for (path, format) in CONFIGURATION_FILES {
        let Some(bytes) = client.read_file(repository, commit, path).await? else {
            continue;
        };
        let text = std::str::from_utf8(&bytes).map_err(|_| ConfigurationError::Encoding {
            path: path.to_string(),
        })?;

        let configuration = match format {
            Format::Json => parse_json(text)?,
            Format::Yaml => parse_yaml(text)?,
        };
        return Ok(Some(configuration));
    }
    Ok(None)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn go_job() -> IndexJob {
    IndexJob {
        root: String::new(),
        install: InstallConfiguration::default(),
        index: IndexConfiguration {
            indexer: GO_INDEXER.to_string(),
            arguments: strings(&GO_ARGUMENTS),
        },
    }
}

fn typescript_job() -> IndexJob {
    IndexJob {
        root: String::new(),
        install: InstallConfiguration {
            image: TYPESCRIPT_INSTALL_IMAGE.to_string(),
            commands: strings(&TYPESCRIPT_INSTALL_COMMANDS),
        },
        index: IndexConfiguration {
            indexer: TYPESCRIPT_INDEXER.to_string(),
            arguments: strings(&TYPESCRIPT_ARGUMENTS),
        },
    }
}
