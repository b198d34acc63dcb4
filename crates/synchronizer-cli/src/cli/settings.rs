use super::*;

/// Effective run settings. Flags and their environment variables win over
/// the config file, which wins over the built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Settings {
    pub(super) config_path: PathBuf,
    pub(super) log_level: LevelFilter,
    pub(super) working_directory: PathBuf,
    /// Level name that was not recognised and replaced by `info`.
    pub(super) unknown_log_level: Option<String>,
}

impl Settings {
    pub(super) fn resolve(
        cli: &Cli,
        config_path: PathBuf,
        file: Option<&MirrorConfig>,
    ) -> Self {
        let raw_level = cli
            .log_level
            .clone()
            .or_else(|| file.and_then(|config| config.log_level.clone()))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let parsed = logging::parse_level(&raw_level);
        let unknown_log_level = parsed.is_none().then_some(raw_level);
        let log_level = parsed.unwrap_or(LevelFilter::INFO);
        let working_directory = cli
            .working_directory
            .clone()
            .or_else(|| file.and_then(|config| config.working_directory.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKING_DIRECTORY));
        Self {
            config_path,
            log_level,
            working_directory,
            unknown_log_level,
        }
    }
}

pub(super) fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => default_config_path(),
    }
}
