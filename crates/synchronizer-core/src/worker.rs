use crate::classify::{Classification, ErrorClassifier, render_error};
use crate::git::{
    DESTINATION_REMOTE, GitClient, GitError, SOURCE_REMOTE, Transfer, all_branches_fetch_refspec,
};
use crate::model::{RepoAuth, RepositoryPair};
use crate::plan::{RefOperation, SyncPlan, plan};
use crate::refs::{RefSet, fetch_ref_set};
use crate::retry::RetryBudgets;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Read-only settings shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct MirrorContext {
    pub working_directory: PathBuf,
    pub classifier: ErrorClassifier,
    pub budgets: RetryBudgets,
}

impl MirrorContext {
    pub fn new(working_directory: impl Into<PathBuf>, classifier: ErrorClassifier) -> Self {
        Self {
            working_directory: working_directory.into(),
            classifier,
            budgets: RetryBudgets::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: RetryBudgets) -> Self {
        self.budgets = budgets;
        self
    }
}

/// A repository pair with its credentials resolved.
#[derive(Debug, Clone)]
pub struct MirrorJob {
    pub source: String,
    pub destination: String,
    pub source_auth: Option<RepoAuth>,
    pub destination_auth: Option<RepoAuth>,
}

impl MirrorJob {
    pub fn resolve<F>(pair: &RepositoryPair, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            source: pair.source.url.clone(),
            destination: pair.destination.url.clone(),
            source_auth: pair.source.auth.resolve(&lookup),
            destination_auth: pair.destination.auth.resolve(&lookup),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MirrorStage {
    Preparing,
    Cloning,
    ListingSource,
    FetchingBranches,
    CreatingDestinationRemote,
    ListingDestination,
    Pushing,
    Deleting,
    Done,
}

/// Result of one worker run, handed to the orchestrator exactly once.
#[derive(Debug, Clone)]
pub struct MirrorStatus {
    /// Non-ignored failures, in the order they happened.
    pub errors: Vec<String>,
    /// Furthest stage the run reached.
    pub stage: MirrorStage,
    pub clone_finished_at: Instant,
    pub clone_duration: Duration,
    pub push_duration: Duration,
}

struct PhaseTimings {
    clone_finished_at: Instant,
    clone_duration: Duration,
    push_duration: Duration,
}

/// Makes the destination of one pair a copy of its source.
pub struct MirrorWorker<'a, C: GitClient> {
    client: &'a C,
    context: &'a MirrorContext,
    job: &'a MirrorJob,
    stage: MirrorStage,
    errors: Vec<String>,
}

impl<'a, C: GitClient> MirrorWorker<'a, C> {
    pub fn new(client: &'a C, context: &'a MirrorContext, job: &'a MirrorJob) -> Self {
        Self {
            client,
            context,
            job,
            stage: MirrorStage::Preparing,
            errors: Vec::new(),
        }
    }

    pub fn run(mut self) -> MirrorStatus {
        let started = Instant::now();
        let timings = match create_workdir(&self.context.working_directory) {
            Ok(workdir) => {
                let timings = self.mirror(&workdir.path().join("repo"), started);
                if let Err(err) = workdir.close() {
                    warn!(repo = %self.job.source, error = %err, "failed to remove working directory");
                }
                timings
            }
            Err(err) => {
                let message = format!(
                    "Error while creating working directory for {}: {err}",
                    self.job.source
                );
                let classification = self.context.classifier.classify_message(&message);
                self.record(message, classification);
                None
            }
        };
        let timings = timings.unwrap_or_else(|| PhaseTimings {
            clone_finished_at: Instant::now(),
            clone_duration: Duration::ZERO,
            push_duration: Duration::ZERO,
        });
        MirrorStatus {
            errors: self.errors,
            stage: self.stage,
            clone_finished_at: timings.clone_finished_at,
            clone_duration: timings.clone_duration,
            push_duration: timings.push_duration,
        }
    }

    /// Returns `None` when a step the rest of the run depends on failed.
    fn mirror(&mut self, directory: &Path, started: Instant) -> Option<PhaseTimings> {
        let job = self.job;
        let context = self.context;
        let budgets = &context.budgets;

        self.enter(MirrorStage::Cloning);
        let handle = budgets
            .policy(budgets.clone)
            .run_git(&job.source, "cloning repository", || {
                self.client
                    .clone_repo(&job.source, directory, job.source_auth.as_ref())
            });
        let handle = self.require(handle, "cloning repository from", &job.source)?;

        self.enter(MirrorStage::ListingSource);
        let source_refs = fetch_ref_set(
            self.client,
            &handle,
            SOURCE_REMOTE,
            &job.source,
            job.source_auth.as_ref(),
            &budgets.policy(budgets.list),
        );
        let source_refs =
            self.require(source_refs, "getting branches and tags from", &job.source)?;

        self.enter(MirrorStage::FetchingBranches);
        info!(repo = %job.source, "fetching all branches");
        let refspec = all_branches_fetch_refspec();
        let fetched = budgets
            .policy(budgets.fetch)
            .run_git(&job.source, "fetching branches", || {
                self.client
                    .fetch(&handle, SOURCE_REMOTE, &refspec, job.source_auth.as_ref())
            });
        if let Ok(Transfer::UpToDate) = fetched {
            info!(repo = %job.source, "repository up-to-date");
        }
        self.require(fetched, "fetching branches from", &job.source)?;

        let clone_duration = started.elapsed();
        let clone_finished_at = Instant::now();

        self.enter(MirrorStage::CreatingDestinationRemote);
        let created = self
            .client
            .create_remote(&handle, DESTINATION_REMOTE, &job.destination);
        self.require(created, "creating remote for", &job.destination)?;

        self.enter(MirrorStage::ListingDestination);
        let destination_refs = self.list_destination(&handle);

        let plan = plan(&source_refs, &destination_refs);
        self.apply(&handle, &plan);
        self.enter(MirrorStage::Done);

        Some(PhaseTimings {
            clone_finished_at,
            clone_duration,
            push_duration: clone_finished_at.elapsed(),
        })
    }

    /// A destination that cannot be listed is still pushed to. Without its
    /// refs nothing is detected as stale, so deletions wait for a later run.
    fn list_destination(&mut self, handle: &C::Handle) -> RefSet {
        let job = self.job;
        let budgets = &self.context.budgets;
        let listed = fetch_ref_set(
            self.client,
            handle,
            DESTINATION_REMOTE,
            &job.destination,
            job.destination_auth.as_ref(),
            &budgets.policy(budgets.list),
        );
        match listed {
            Ok(refs) => refs,
            Err(err) => {
                self.record_git_failure("getting branches and tags from", &job.destination, &err);
                warn!(repo = %job.destination, "destination refs unknown; skipping deletions this run");
                RefSet::default()
            }
        }
    }

    fn apply(&mut self, handle: &C::Handle, plan: &SyncPlan) {
        let job = self.job;
        self.enter(MirrorStage::Pushing);
        info!(source = %job.source, destination = %job.destination, "pushing all branches and tags");
        for operation in plan.operations() {
            if operation.is_delete() && self.stage != MirrorStage::Deleting {
                self.enter(MirrorStage::Deleting);
            }
            if operation.is_delete() {
                info!(repo = %job.destination, refspec = %operation.refspec(), "removing ref");
            }
            let outcome = apply_ref_operation(
                self.client,
                handle,
                &operation,
                &job.destination,
                job.destination_auth.as_ref(),
                &self.context.budgets,
            );
            match outcome {
                Ok(transfer) => {
                    debug!(repo = %job.destination, operation = ?operation, outcome = ?transfer, "ref operation done");
                }
                Err(err) => self.record_git_failure(&operation.activity(), &job.destination, &err),
            }
        }
    }

    fn enter(&mut self, stage: MirrorStage) {
        debug!(repo = %self.job.source, stage = ?stage, "mirror stage");
        self.stage = stage;
    }

    fn require<T>(&mut self, result: Result<T, GitError>, activity: &str, url: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_git_failure(activity, url, &err);
                None
            }
        }
    }

    fn record_git_failure(&mut self, activity: &str, url: &str, err: &GitError) {
        let message = render_error(activity, url, err);
        let classification = self.context.classifier.classify(err, &message);
        self.record(message, classification);
    }

    fn record(&mut self, message: String, classification: Classification) {
        match classification {
            Classification::Ignored => {
                warn!(repo = %self.job.source, error = %message, "ignoring configured error");
            }
            Classification::Real => {
                error!(repo = %self.job.source, error = %message, "mirror error");
                self.errors.push(message);
            }
        }
    }
}

/// Pushes one planned ref operation to the destination remote under its own
/// retry budget.
pub fn apply_ref_operation<C: GitClient>(
    client: &C,
    handle: &C::Handle,
    operation: &RefOperation,
    destination: &str,
    auth: Option<&RepoAuth>,
    budgets: &RetryBudgets,
) -> Result<Transfer, GitError> {
    let refspec = operation.refspec();
    let activity = operation.activity();
    budgets
        .policy(operation.budget(budgets))
        .run_git(destination, &activity, || {
            client.push(handle, DESTINATION_REMOTE, &refspec, auth)
        })
}

fn create_workdir(root: &Path) -> std::io::Result<TempDir> {
    tempfile::Builder::new().prefix("mirror-").tempdir_in(root)
}
