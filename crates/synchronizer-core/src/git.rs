use crate::model::RepoAuth;
use std::path::Path;
use thiserror::Error;

pub const REF_BRANCH_PREFIX: &str = "refs/heads/";
pub const REF_TAG_PREFIX: &str = "refs/tags/";
pub const SOURCE_REMOTE: &str = "origin";
pub const DESTINATION_REMOTE: &str = "destination";

/// Failure reported by the git client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    #[error("authentication required")]
    AuthRequired,
    #[error("{0}")]
    Transient(String),
}

impl GitError {
    pub fn transient(message: impl Into<String>) -> Self {
        GitError::Transient(message.into())
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, GitError::AuthRequired)
    }
}

/// Successful outcome of a fetch or push.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Transfer {
    Updated,
    UpToDate,
}

/// The operations the mirror engine needs from a git implementation.
pub trait GitClient: Send + Sync {
    type Handle;

    fn clone_repo(
        &self,
        url: &str,
        directory: &Path,
        auth: Option<&RepoAuth>,
    ) -> Result<Self::Handle, GitError>;

    /// Lists the full reference names advertised by `remote`.
    fn list_remote(
        &self,
        handle: &Self::Handle,
        remote: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Vec<String>, GitError>;

    fn fetch(
        &self,
        handle: &Self::Handle,
        remote: &str,
        refspec: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError>;

    fn create_remote(&self, handle: &Self::Handle, name: &str, url: &str) -> Result<(), GitError>;

    /// Pushes a single refspec. Force is requested with a leading `+`.
    fn push(
        &self,
        handle: &Self::Handle,
        remote: &str,
        refspec: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError>;
}

pub fn branch_push_refspec(branch: &str) -> String {
    format!("+{REF_BRANCH_PREFIX}{branch}:{REF_BRANCH_PREFIX}{branch}")
}

pub fn all_tags_push_refspec() -> String {
    format!("+{REF_TAG_PREFIX}*:{REF_TAG_PREFIX}*")
}

pub fn all_branches_fetch_refspec() -> String {
    format!("{REF_BRANCH_PREFIX}*:{REF_BRANCH_PREFIX}*")
}

pub fn branch_delete_refspec(branch: &str) -> String {
    format!(":{REF_BRANCH_PREFIX}{branch}")
}

pub fn tag_delete_refspec(tag: &str) -> String {
    format!(":{REF_TAG_PREFIX}{tag}")
}
