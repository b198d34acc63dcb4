use crate::git::GitError;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Git failures worth another attempt. Missing or rejected credentials are
/// never retried.
pub fn git_retry_decision(err: &GitError) -> RetryDecision {
    match err {
        GitError::AuthRequired => RetryDecision::Stop,
        GitError::Transient(_) => RetryDecision::Retry,
    }
}

/// Exponential backoff with randomised delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_interval)
    }

    /// Picks a delay uniformly from `interval * (1 ± randomization_factor)`.
    pub fn randomized(&self, interval: Duration) -> Duration {
        let factor = self.randomization_factor.clamp(0.0, 1.0);
        let spread = 1.0 - factor + 2.0 * factor * fastrand::f64();
        interval.mul_f64(spread)
    }
}

/// Retries an operation until it succeeds, is classified as permanent, or
/// the next wait would push the total elapsed time past `max_elapsed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn new(max_elapsed: Duration) -> Self {
        Self {
            backoff: Backoff::default(),
            max_elapsed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn run<T, E, F, C>(&self, mut operation: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        C: Fn(&E) -> RetryDecision,
    {
        let started = Instant::now();
        let mut interval = self.backoff.initial_interval;
        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if classify(&err) == RetryDecision::Stop {
                return Err(err);
            }
            let delay = self.backoff.randomized(interval);
            if started.elapsed() + delay > self.max_elapsed {
                return Err(err);
            }
            thread::sleep(delay);
            interval = self.backoff.next_interval(interval);
        }
    }

    /// Runs a git operation, logging every transient failure that will be
    /// retried or reported.
    pub fn run_git<T, F>(&self, repo: &str, activity: &str, mut operation: F) -> Result<T, GitError>
    where
        F: FnMut() -> Result<T, GitError>,
    {
        self.run(
            || {
                let result = operation();
                if let Err(GitError::Transient(message)) = &result {
                    warn!(repo = %repo, activity = %activity, error = %message, "git operation failed; retrying within budget");
                }
                result
            },
            git_retry_decision,
        )
    }
}

/// Time budgets per git operation of a mirror run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudgets {
    pub clone: Duration,
    pub list: Duration,
    pub fetch: Duration,
    pub push_branch: Duration,
    pub push_tags: Duration,
    pub delete: Duration,
    pub backoff: Backoff,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            clone: Duration::from_secs(120),
            list: Duration::from_secs(60),
            fetch: Duration::from_secs(60),
            push_branch: Duration::from_secs(120),
            push_tags: Duration::from_secs(60),
            delete: Duration::from_secs(60),
            backoff: Backoff::default(),
        }
    }
}

impl RetryBudgets {
    pub fn policy(&self, max_elapsed: Duration) -> RetryPolicy {
        RetryPolicy::new(max_elapsed).with_backoff(self.backoff)
    }

    /// The same budget for every operation.
    pub fn uniform(max_elapsed: Duration, backoff: Backoff) -> Self {
        Self {
            clone: max_elapsed,
            list: max_elapsed,
            fetch: max_elapsed,
            push_branch: max_elapsed,
            push_tags: max_elapsed,
            delete: max_elapsed,
            backoff,
        }
    }
}
