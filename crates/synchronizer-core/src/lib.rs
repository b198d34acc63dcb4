pub mod classify;
pub mod config;
pub mod git;
pub mod git_sync;
pub mod lockfile;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod refs;
pub mod retry;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
