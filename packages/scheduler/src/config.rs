// ABOUTME: Declared auto-index configuration schema and its JSON and YAML readers
// ABOUTME: Absent or null lists normalise to empty so both dialects yield identical values

use crate::error::ConfigurationError;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoIndexConfiguration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub branches: BranchConfiguration,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index_jobs: Vec<IndexJob>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BranchConfiguration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude: Vec<String>,
}

/// One unit of indexing work; also the resolver's output
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexJob {
    /// Empty means the repository root
    #[serde(default, deserialize_with = "null_as_default")]
    pub root: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub install: InstallConfiguration,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: IndexConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstallConfiguration {
    /// Empty skips the install phase
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexConfiguration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub indexer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse JSON that may contain comments and trailing commas
pub fn parse_json(input: &str) -> Result<AutoIndexConfiguration, ConfigurationError> {
    Ok(json5::from_str(input)?)
}

pub fn parse_yaml(input: &str) -> Result<AutoIndexConfiguration, ConfigurationError> {
    Ok(serde_yaml::from_str(input)?)
}
