use crate::git::{GitClient, GitError, Transfer};
use crate::model::RepoAuth;
use git2::{Oid, Repository, Signature};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// Handle returned by [`FakeGitClient::clone_repo`].
#[derive(Debug, Clone)]
pub(crate) struct FakeHandle {
    pub(crate) url: String,
}

impl FakeHandle {
    pub(crate) fn new(url: &str) -> Self {
        Self { url: url.to_string() }
    }
}

/// Scripted git client. Each script is consumed front to back and its last
/// entry repeats once the others are used up.
#[derive(Default)]
pub(crate) struct FakeGitClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    clones: HashMap<String, VecDeque<Result<(), GitError>>>,
    lists: HashMap<String, VecDeque<Result<Vec<String>, GitError>>>,
    fetches: VecDeque<Result<Transfer, GitError>>,
    create_remote: VecDeque<Result<(), GitError>>,
    pushes: HashMap<String, VecDeque<Result<Transfer, GitError>>>,
    calls: Vec<String>,
}

fn next<T: Clone>(script: Option<&mut VecDeque<T>>, default: T) -> T {
    match script {
        Some(script) if script.len() > 1 => script.pop_front().unwrap_or(default),
        Some(script) => script.front().cloned().unwrap_or(default),
        None => default,
    }
}

impl FakeGitClient {
    pub(crate) fn script_clone(&self, url: &str, results: Vec<Result<(), GitError>>) {
        self.state
            .lock()
            .unwrap()
            .clones
            .insert(url.to_string(), results.into());
    }

    pub(crate) fn script_list(&self, remote: &str, results: Vec<Result<Vec<String>, GitError>>) {
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(remote.to_string(), results.into());
    }

    pub(crate) fn script_fetch(&self, results: Vec<Result<Transfer, GitError>>) {
        self.state.lock().unwrap().fetches = results.into();
    }

    pub(crate) fn script_create_remote(&self, results: Vec<Result<(), GitError>>) {
        self.state.lock().unwrap().create_remote = results.into();
    }

    pub(crate) fn script_push(&self, refspec: &str, results: Vec<Result<Transfer, GitError>>) {
        self.state
            .lock()
            .unwrap()
            .pushes
            .insert(refspec.to_string(), results.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn list_calls(&self, remote: &str) -> usize {
        let prefix = format!("list {remote}");
        self.calls().iter().filter(|call| **call == prefix).count()
    }

    pub(crate) fn push_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("push ").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

impl GitClient for FakeGitClient {
    type Handle = FakeHandle;

    fn clone_repo(
        &self,
        url: &str,
        directory: &Path,
        _auth: Option<&RepoAuth>,
    ) -> Result<FakeHandle, GitError> {
        assert!(directory.parent().is_some_and(Path::exists));
        let mut state = self.record(format!("clone {url}"));
        next(state.clones.get_mut(url), Ok(())).map(|()| FakeHandle::new(url))
    }

    fn list_remote(
        &self,
        _handle: &FakeHandle,
        remote: &str,
        _auth: Option<&RepoAuth>,
    ) -> Result<Vec<String>, GitError> {
        let mut state = self.record(format!("list {remote}"));
        next(state.lists.get_mut(remote), Ok(Vec::new()))
    }

    fn fetch(
        &self,
        _handle: &FakeHandle,
        remote: &str,
        refspec: &str,
        _auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError> {
        let mut state = self.record(format!("fetch {remote} {refspec}"));
        let fetches = &mut state.fetches;
        next(Some(fetches), Ok(Transfer::Updated))
    }

    fn create_remote(&self, _handle: &FakeHandle, name: &str, url: &str) -> Result<(), GitError> {
        let mut state = self.record(format!("remote {name} {url}"));
        let results = &mut state.create_remote;
        next(Some(results), Ok(()))
    }

    fn push(
        &self,
        _handle: &FakeHandle,
        _remote: &str,
        refspec: &str,
        _auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError> {
        let mut state = self.record(format!("push {refspec}"));
        next(state.pushes.get_mut(refspec), Ok(Transfer::Updated))
    }
}

/// Commits a single file on `refname`, on top of its current tip if any.
/// Works on bare repositories.
pub(crate) fn commit_on(repo: &Repository, refname: &str, contents: &str) -> Oid {
    let blob = repo.blob(contents.as_bytes()).unwrap();
    let mut tree = repo.treebuilder(None).unwrap();
    tree.insert("file.txt", blob, 0o100644).unwrap();
    let tree = repo.find_tree(tree.write().unwrap()).unwrap();
    let parent = repo
        .refname_to_id(refname)
        .ok()
        .map(|oid| repo.find_commit(oid).unwrap());
    let parents: Vec<_> = parent.iter().collect();
    let sig = Signature::now("tester", "tester@example.com").unwrap();
    repo.commit(Some(refname), &sig, &sig, contents, &tree, &parents)
        .unwrap()
}
