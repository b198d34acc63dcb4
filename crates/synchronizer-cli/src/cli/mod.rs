use crate::logging;
use anyhow::Context;
use clap::Parser;
use git_synchronizer_core::classify::ErrorClassifier;
use git_synchronizer_core::config::{
    DEFAULT_LOG_LEVEL, DEFAULT_WORKING_DIRECTORY, MirrorConfig, default_config_path,
};
use git_synchronizer_core::git_sync::Git2Client;
use git_synchronizer_core::lockfile::WorkingDirectoryLock;
use git_synchronizer_core::orchestrator::{Orchestrator, RunReport};
use git_synchronizer_core::worker::MirrorContext;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

mod app;
mod args;
mod settings;

use args::*;
use settings::Settings;

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = app::prepare(&cli).and_then(|(settings, loaded)| {
        logging::init(settings.log_level)?;
        app::run(&settings, loaded?)
    });
    match result {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(err) => {
            error!(error = %format!("{err:#}"), "synchronization aborted");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
