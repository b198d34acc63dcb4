use crate::git::GitClient;
use crate::model::RepositoryPair;
use crate::worker::{MirrorContext, MirrorJob, MirrorStatus, MirrorWorker};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info};

/// Outcome of mirroring every configured pair.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: OffsetDateTime,
    pub pairs: usize,
    pub received: usize,
    pub errors: Vec<String>,
    pub wall_clock: Duration,
    /// Time from the start of the run until the slowest clone finished.
    pub last_clone_offset: Duration,
    pub total_clone_duration: Duration,
    pub total_push_duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Share of the wall-clock time spent before the last clone finished.
    pub fn last_clone_percent(&self) -> f64 {
        if self.wall_clock.is_zero() {
            return 0.0;
        }
        100.0 * self.last_clone_offset.as_secs_f64() / self.wall_clock.as_secs_f64()
    }

    pub fn log_summary(&self) {
        info!(
            started_at = %format_timestamp(self.started_at),
            pairs = self.pairs,
            "last clone finished {} after synchronization had started ({:.1}% of total synchronization time)",
            format_duration(self.last_clone_offset),
            self.last_clone_percent()
        );
        info!(
            "synchronization took {} (wall-clock time)",
            format_duration(self.wall_clock)
        );
        debug!(
            "total clone duration: {} (worker time)",
            format_duration(self.total_clone_duration)
        );
        debug!(
            "total push duration: {} (worker time)",
            format_duration(self.total_push_duration)
        );
        if !self.errors.is_empty() {
            error!(count = self.errors.len(), "the following errors have been encountered:");
            for message in &self.errors {
                error!("{message}");
            }
        }
    }
}

/// Folds worker statuses into run totals. Only the orchestrator thread owns
/// one of these.
struct Aggregate {
    started: Instant,
    received: usize,
    errors: Vec<String>,
    last_clone_end: Option<Instant>,
    total_clone_duration: Duration,
    total_push_duration: Duration,
}

impl Aggregate {
    fn new(started: Instant) -> Self {
        Self {
            started,
            received: 0,
            errors: Vec::new(),
            last_clone_end: None,
            total_clone_duration: Duration::ZERO,
            total_push_duration: Duration::ZERO,
        }
    }

    fn absorb(&mut self, status: MirrorStatus) {
        self.received += 1;
        self.errors.extend(status.errors);
        if self
            .last_clone_end
            .is_none_or(|latest| latest < status.clone_finished_at)
        {
            self.last_clone_end = Some(status.clone_finished_at);
        }
        self.total_clone_duration += status.clone_duration;
        self.total_push_duration += status.push_duration;
    }

    fn into_report(self, started_at: OffsetDateTime, pairs: usize) -> RunReport {
        let last_clone_offset = self
            .last_clone_end
            .map(|end| end.saturating_duration_since(self.started))
            .unwrap_or_default();
        RunReport {
            started_at,
            pairs,
            received: self.received,
            errors: self.errors,
            wall_clock: self.started.elapsed(),
            last_clone_offset,
            total_clone_duration: self.total_clone_duration,
            total_push_duration: self.total_push_duration,
        }
    }
}

/// Runs one [`MirrorWorker`] thread per repository pair and collects their
/// statuses.
pub struct Orchestrator<C> {
    client: Arc<C>,
    context: Arc<MirrorContext>,
}

impl<C> Orchestrator<C>
where
    C: GitClient + 'static,
{
    pub fn new(client: Arc<C>, context: MirrorContext) -> Self {
        Self {
            client,
            context: Arc::new(context),
        }
    }

    /// Mirrors every pair, resolving tokens from the process environment.
    pub fn run(&self, pairs: &[RepositoryPair]) -> RunReport {
        let jobs = pairs
            .iter()
            .map(|pair| MirrorJob::resolve(pair, process_env))
            .collect();
        self.run_jobs(jobs)
    }

    pub fn run_jobs(&self, jobs: Vec<MirrorJob>) -> RunReport {
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();
        let pairs = jobs.len();
        let mut aggregate = Aggregate::new(started);

        // Sized so no worker blocks handing off its status.
        let (tx, rx) = mpsc::sync_channel::<MirrorStatus>(pairs.max(1));
        let mut workers = Vec::with_capacity(pairs);
        for (index, job) in jobs.into_iter().enumerate() {
            info!(source = %job.source, destination = %job.destination, "mirroring");
            let source = job.source.clone();
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let context = Arc::clone(&self.context);
            let spawned = thread::Builder::new()
                .name(format!("mirror-{index}"))
                .spawn(move || {
                    let status = MirrorWorker::new(client.as_ref(), &context, &job).run();
                    let _ = tx.send(status);
                });
            match spawned {
                Ok(handle) => workers.push((source, handle)),
                Err(err) => aggregate
                    .errors
                    .push(format!("Error while starting mirror worker for {source}: {err}")),
            }
        }
        drop(tx);

        let expected = workers.len();
        while aggregate.received < expected {
            let Ok(status) = rx.recv() else {
                break;
            };
            aggregate.absorb(status);
            info!(
                "finished mirroring {} out of {} repositories",
                aggregate.received, pairs
            );
        }

        for (source, handle) in workers {
            if handle.join().is_err() {
                aggregate
                    .errors
                    .push(format!("Error while mirroring {source}: worker panicked"));
            }
        }

        aggregate.into_report(started_at, pairs)
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}

/// Whole seconds as `1h2m3s`, `4m0s` or `5s`.
pub fn format_duration(duration: Duration) -> String {
    let total = (duration.as_secs_f64().round()) as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorClassifier;
    use crate::git::{GitError, Transfer};
    use crate::model::RepoAuth;
    use crate::retry::{Backoff, RetryBudgets};
    use crate::test_support::FakeGitClient;
    use std::path::Path;

    fn context(root: &Path, ignored: &[&str]) -> MirrorContext {
        MirrorContext::new(root, ErrorClassifier::new(ignored.iter().copied())).with_budgets(
            RetryBudgets::uniform(
                Duration::from_millis(30),
                Backoff {
                    initial_interval: Duration::from_millis(2),
                    multiplier: 1.5,
                    randomization_factor: 0.5,
                    max_interval: Duration::from_millis(10),
                },
            ),
        )
    }

    fn jobs(count: usize) -> Vec<MirrorJob> {
        (0..count)
            .map(|index| MirrorJob {
                source: format!("https://source.example.com/repo-{index}"),
                destination: format!("https://destination.example.com/repo-{index}"),
                source_auth: None,
                destination_auth: None,
            })
            .collect()
    }

    #[test]
    fn all_clean_workers_succeed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = Arc::new(FakeGitClient::default());
        let orchestrator = Orchestrator::new(Arc::clone(&client), context(tmp.path(), &[]));

        let report = orchestrator.run_jobs(jobs(4));

        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.pairs, 4);
        assert_eq!(report.received, 4);
        let clones = client
            .calls()
            .iter()
            .filter(|call| call.starts_with("clone "))
            .count();
        assert_eq!(clones, 4);
    }

    #[test]
    fn one_real_error_fails_the_run() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = Arc::new(FakeGitClient::default());
        client.script_clone(
            "https://source.example.com/repo-2",
            vec![Err(GitError::AuthRequired)],
        );
        let orchestrator = Orchestrator::new(Arc::clone(&client), context(tmp.path(), &[]));

        let report = orchestrator.run_jobs(jobs(3));

        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.received, 3);
        assert_eq!(
            report.errors,
            vec![
                "Error while cloning repository from https://source.example.com/repo-2: authentication required"
                    .to_string()
            ]
        );
    }

    #[test]
    fn ignored_errors_keep_the_run_successful() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = Arc::new(FakeGitClient::default());
        client.script_push(
            "+refs/tags/*:refs/tags/*",
            vec![Err(GitError::transient("tag protection rule"))],
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&client),
            context(tmp.path(), &["tag protection rule"]),
        );

        let report = orchestrator.run_jobs(jobs(3));

        assert!(report.is_success(), "{:?}", report.errors);
    }

    #[test]
    fn no_pairs_is_an_immediate_success() {
        let tmp = tempfile::TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(Arc::new(FakeGitClient::default()), context(tmp.path(), &[]));
        let report = orchestrator.run(&[]);
        assert!(report.is_success());
        assert_eq!(report.received, 0);
        assert_eq!(report.last_clone_offset, Duration::ZERO);
        assert_eq!(report.last_clone_percent(), 0.0);
    }

    #[test]
    fn timing_totals_cover_all_workers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = Arc::new(FakeGitClient::default());
        let orchestrator = Orchestrator::new(client, context(tmp.path(), &[]));
        let report = orchestrator.run_jobs(jobs(2));
        assert!(report.last_clone_offset <= report.wall_clock);
        assert!(report.last_clone_percent() <= 100.0);
        report.log_summary();
    }

    struct PanickingClient;

    impl GitClient for PanickingClient {
        type Handle = ();

        fn clone_repo(
            &self,
            url: &str,
            _directory: &Path,
            _auth: Option<&RepoAuth>,
        ) -> Result<(), GitError> {
            if url.ends_with("repo-1") {
                panic!("simulated worker crash");
            }
            Err(GitError::transient("offline"))
        }

        fn list_remote(&self, _: &(), _: &str, _: Option<&RepoAuth>) -> Result<Vec<String>, GitError> {
            Ok(Vec::new())
        }

        fn fetch(&self, _: &(), _: &str, _: &str, _: Option<&RepoAuth>) -> Result<Transfer, GitError> {
            Ok(Transfer::UpToDate)
        }

        fn create_remote(&self, _: &(), _: &str, _: &str) -> Result<(), GitError> {
            Ok(())
        }

        fn push(&self, _: &(), _: &str, _: &str, _: Option<&RepoAuth>) -> Result<Transfer, GitError> {
            Ok(Transfer::UpToDate)
        }
    }

    #[test]
    fn panicking_worker_is_reported_as_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(Arc::new(PanickingClient), context(tmp.path(), &["offline"]));

        let report = orchestrator.run_jobs(jobs(3));

        assert_eq!(report.received, 2);
        assert_eq!(
            report.errors,
            vec!["Error while mirroring https://source.example.com/repo-1: worker panicked".to_string()]
        );
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn formats_durations_like_wall_clock() {
        assert_eq!(format_duration(Duration::from_millis(400)), "0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_duration(Duration::from_secs(3600 + 120 + 3)), "1h2m3s");
    }
}
