use crate::model::{AuthMethod, Authentication, RepositoryPair};
use anyhow::Context;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{trace, warn};

pub const DEFAULT_CONFIG_FILE: &str = ".git-synchronizer.yaml";
pub const DEFAULT_WORKING_DIRECTORY: &str = "/tmp/git-synchronizer";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "multiple repositories set to be synchronized to the same destination repository: {destination} (source {source_url})"
    )]
    DuplicateDestination {
        destination: String,
        source_url: String,
    },
}

/// Contents of the YAML config file. Every key is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default)]
    pub repositories: Vec<RepositoryPair>,
    #[serde(default)]
    pub defaults: RepositoryPair,
    #[serde(default)]
    pub ignored_errors: Vec<String>,
    pub log_level: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl MirrorConfig {
    /// Loads the config file. A missing file yields an empty config so a run
    /// without configuration mirrors nothing and succeeds. Reporting the
    /// missing file is left to the caller, which may not have logging yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(data).context("deserialize yaml")?;
        Ok(config)
    }

    /// Applies defaults and validation, returning the pairs ready to mirror.
    pub fn prepared_repositories(&self) -> Result<Vec<RepositoryPair>, ConfigError> {
        let mut repositories = self.repositories.clone();
        apply_default_auth(&mut repositories, &self.defaults);
        validate_repositories(&repositories)?;
        Ok(repositories)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let dirs = BaseDirs::new().context("resolve home directory")?;
    Ok(dirs.home_dir().join(DEFAULT_CONFIG_FILE))
}

/// Fills in the default auth method for every side that does not set one.
/// The default token name is only taken along with the `token` method.
pub fn apply_default_auth(repositories: &mut [RepositoryPair], defaults: &RepositoryPair) {
    for pair in repositories.iter_mut() {
        inherit_auth(&mut pair.source.auth, &defaults.source.auth);
        inherit_auth(&mut pair.destination.auth, &defaults.destination.auth);
    }
    if tracing::enabled!(tracing::Level::TRACE) {
        match serde_json::to_string_pretty(repositories) {
            Ok(json) => trace!(repositories = %json, "effective repositories"),
            Err(err) => warn!(error = %err, "could not serialize repositories"),
        }
    }
}

fn inherit_auth(auth: &mut Authentication, default: &Authentication) {
    if auth.method.is_some() {
        return;
    }
    auth.method = default.method;
    if auth.method == Some(AuthMethod::Token) {
        auth.token_name = default.token_name.clone();
    }
}

/// Rejects pairs sharing a destination; warns when project names differ.
pub fn validate_repositories(repositories: &[RepositoryPair]) -> Result<(), ConfigError> {
    let mut destinations = HashSet::new();
    for pair in repositories {
        if !destinations.insert(pair.destination.url.as_str()) {
            return Err(ConfigError::DuplicateDestination {
                destination: pair.destination.url.clone(),
                source_url: pair.source.url.clone(),
            });
        }
        let source_name = pair.source.project_name();
        let destination_name = pair.destination.project_name();
        if source_name != destination_name {
            warn!(
                source = %source_name,
                destination = %destination_name,
                "source and destination project names differ"
            );
        }
    }
    Ok(())
}
