use super::*;

/// Resolves settings before logging exists. A config file that fails to load
/// is reported once logging is up.
pub(super) fn prepare(cli: &Cli) -> anyhow::Result<(Settings, anyhow::Result<MirrorConfig>)> {
    let config_path = settings::config_path(cli)?;
    let loaded = MirrorConfig::load(&config_path);
    let settings = Settings::resolve(cli, config_path, loaded.as_ref().ok());
    Ok((settings, loaded))
}

pub(super) fn run(settings: &Settings, config: MirrorConfig) -> anyhow::Result<RunReport> {
    if let Some(level) = &settings.unknown_log_level {
        warn!(level = %level, "unknown log level; using info");
    }
    if !settings.config_path.exists() {
        warn!(path = %settings.config_path.display(), "config file not found; using empty configuration");
    }
    info!(
        config = %settings.config_path.display(),
        working_directory = %settings.working_directory.display(),
        log_level = %settings.log_level,
        "starting synchronization"
    );

    let repositories = config
        .prepared_repositories()
        .context("validate repositories")?;
    let _lock = WorkingDirectoryLock::acquire(&settings.working_directory)?;

    let context = MirrorContext::new(
        &settings.working_directory,
        ErrorClassifier::new(config.ignored_errors.iter().cloned()),
    );
    let report = Orchestrator::new(Arc::new(Git2Client), context).run(&repositories);
    report.log_summary();
    Ok(report)
}
