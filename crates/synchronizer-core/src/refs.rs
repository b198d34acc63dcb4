use crate::git::{GitClient, GitError, REF_BRANCH_PREFIX, REF_TAG_PREFIX};
use crate::model::RepoAuth;
use crate::retry::RetryPolicy;
use std::collections::BTreeSet;
use tracing::debug;

/// Branch and tag names advertised by one remote, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSet {
    branches: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl RefSet {
    pub fn new<B, T>(branches: B, tags: T) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            branches: branches.into_iter().map(Into::into).collect(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Partitions full reference names by prefix. Anything that is neither a
    /// branch nor a tag (`HEAD`, `refs/pull/*`, ...) is dropped.
    pub fn from_ref_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for name in names {
            let name = name.as_ref();
            if let Some(branch) = name.strip_prefix(REF_BRANCH_PREFIX) {
                set.branches.insert(branch.to_string());
            } else if let Some(tag) = name.strip_prefix(REF_TAG_PREFIX) {
                set.tags.insert(tag.to_string());
            }
        }
        set
    }

    pub fn branches(&self) -> &BTreeSet<String> {
        &self.branches
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.tags.is_empty()
    }
}

/// Lists `remote` under `policy` and partitions the result.
pub fn fetch_ref_set<C: GitClient>(
    client: &C,
    handle: &C::Handle,
    remote: &str,
    repo_url: &str,
    auth: Option<&RepoAuth>,
    policy: &RetryPolicy,
) -> Result<RefSet, GitError> {
    let names = policy.run_git(repo_url, "listing remote", || {
        client.list_remote(handle, remote, auth)
    })?;
    let set = RefSet::from_ref_names(&names);
    debug!(repo = %repo_url, branches = ?set.branches, tags = ?set.tags, "listed remote refs");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use crate::test_support::{FakeGitClient, FakeHandle};
    use std::time::Duration;

    #[test]
    fn partitions_and_sorts_ref_names() {
        let set = RefSet::from_ref_names([
            "HEAD",
            "refs/heads/main",
            "refs/tags/v2",
            "refs/heads/Dev",
            "refs/heads/feature/x",
            "refs/pull/1/head",
            "refs/tags/v1",
        ]);
        let branches: Vec<&str> = set.branches().iter().map(String::as_str).collect();
        let tags: Vec<&str> = set.tags().iter().map(String::as_str).collect();
        assert_eq!(branches, vec!["Dev", "feature/x", "main"]);
        assert_eq!(tags, vec!["v1", "v2"]);
    }

    #[test]
    fn empty_listing_is_empty_set() {
        let set = RefSet::from_ref_names(Vec::<String>::new());
        assert!(set.is_empty());
    }

    #[test]
    fn fetch_ref_set_retries_transient_listing() {
        let client = FakeGitClient::default();
        client.script_list(
            "origin",
            vec![
                Err(GitError::transient("timeout")),
                Ok(vec!["refs/heads/main".into(), "refs/tags/v1".into()]),
            ],
        );
        let policy = RetryPolicy::new(Duration::from_secs(2)).with_backoff(Backoff {
            initial_interval: Duration::from_millis(1),
            ..Backoff::default()
        });
        let handle = FakeHandle::new("https://a/b");
        let set = fetch_ref_set(&client, &handle, "origin", &handle.url, None, &policy).unwrap();
        assert_eq!(set, RefSet::new(["main"], ["v1"]));
        assert_eq!(client.list_calls("origin"), 2);
    }

    #[test]
    fn fetch_ref_set_stops_on_auth_required() {
        let client = FakeGitClient::default();
        client.script_list("origin", vec![Err(GitError::AuthRequired)]);
        let policy = RetryPolicy::new(Duration::from_secs(2));
        let handle = FakeHandle::new("https://a/b");
        let err =
            fetch_ref_set(&client, &handle, "origin", &handle.url, None, &policy).unwrap_err();
        assert_eq!(err, GitError::AuthRequired);
        assert_eq!(client.list_calls("origin"), 1);
    }
}
