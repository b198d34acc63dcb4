use crate::git::{GitClient, GitError, REF_BRANCH_PREFIX, REF_TAG_PREFIX, Transfer};
use crate::model::RepoAuth;
use git2::{
    AutotagOption, Cred, ErrorClass, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks,
    Repository, build::RepoBuilder,
};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Remote refs are fetched under `refs/listing/<remote>/` to be enumerated.
/// An empty remote then simply yields no references.
const LISTING_NAMESPACE: &str = "refs/listing";

/// [`GitClient`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Client;

impl GitClient for Git2Client {
    type Handle = Repository;

    fn clone_repo(
        &self,
        url: &str,
        directory: &Path,
        auth: Option<&RepoAuth>,
    ) -> Result<Repository, GitError> {
        // A failed attempt can leave a partial clone behind.
        if directory.exists() {
            fs::remove_dir_all(directory)
                .map_err(|err| GitError::transient(format!("clear clone directory: {err}")))?;
        }
        let attempts = Cell::new(0);
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(auth, &attempts));
        debug!(repo = %url, path = %directory.display(), "cloning repo");
        let mut builder = RepoBuilder::new();
        builder.bare(true).fetch_options(fo);
        builder.clone(url, directory).map_err(map_git_error)
    }

    fn list_remote(
        &self,
        handle: &Repository,
        remote: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Vec<String>, GitError> {
        let namespace = format!("{LISTING_NAMESPACE}/{remote}/");
        clear_namespace(handle, &namespace)?;
        let refspecs = [
            format!("+{REF_BRANCH_PREFIX}*:{namespace}heads/*"),
            format!("+{REF_TAG_PREFIX}*:{namespace}tags/*"),
        ];
        let mut remote = handle.find_remote(remote).map_err(map_git_error)?;
        let attempts = Cell::new(0);
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(auth, &attempts))
            .download_tags(AutotagOption::None);
        remote
            .fetch(&refspecs, Some(&mut fo), None)
            .map_err(map_git_error)?;

        let names = namespace_refs(handle, &namespace)?
            .iter()
            .filter_map(|name| name.strip_prefix(namespace.as_str()))
            .map(|suffix| format!("refs/{suffix}"))
            .collect();
        Ok(names)
    }

    fn fetch(
        &self,
        handle: &Repository,
        remote: &str,
        refspec: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError> {
        let mut remote = handle.find_remote(remote).map_err(map_git_error)?;
        let attempts = Cell::new(0);
        let updated = Cell::new(0usize);
        let mut callbacks = remote_callbacks(auth, &attempts);
        callbacks.update_tips(|_refname, old, new| {
            if old != new {
                updated.set(updated.get() + 1);
            }
            true
        });
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(callbacks);
        remote
            .fetch(&[refspec], Some(&mut fo), None)
            .map_err(map_git_error)?;
        if updated.get() == 0 {
            Ok(Transfer::UpToDate)
        } else {
            Ok(Transfer::Updated)
        }
    }

    fn create_remote(&self, handle: &Repository, name: &str, url: &str) -> Result<(), GitError> {
        handle.remote(name, url).map_err(map_git_error)?;
        Ok(())
    }

    fn push(
        &self,
        handle: &Repository,
        remote: &str,
        refspec: &str,
        auth: Option<&RepoAuth>,
    ) -> Result<Transfer, GitError> {
        let refspecs = expand_push_refspec(handle, refspec)?;
        if refspecs.is_empty() {
            return Ok(Transfer::UpToDate);
        }
        let mut remote = handle.find_remote(remote).map_err(map_git_error)?;
        let attempts = Cell::new(0);
        let changed = Cell::new(false);
        let rejected = RefCell::new(Vec::new());
        let mut callbacks = remote_callbacks(auth, &attempts);
        callbacks.push_negotiation(|updates| {
            if updates.iter().any(|update| update.src() != update.dst()) {
                changed.set(true);
            }
            Ok(())
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(status) = status {
                rejected.borrow_mut().push(format!("{refname}: {status}"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .push(&refspecs, Some(&mut options))
            .map_err(map_git_error)?;

        let rejections = rejected.take();
        if !rejections.is_empty() {
            return Err(GitError::transient(format!(
                "push rejected: {}",
                rejections.join(", ")
            )));
        }
        if changed.get() {
            Ok(Transfer::Updated)
        } else {
            Ok(Transfer::UpToDate)
        }
    }
}

/// Expands a wildcard refspec such as `+refs/tags/*:refs/tags/*` into one
/// refspec per matching local reference. Plain refspecs pass through.
fn expand_push_refspec(repo: &Repository, refspec: &str) -> Result<Vec<String>, GitError> {
    if !refspec.contains('*') {
        return Ok(vec![refspec.to_string()]);
    }
    let (force, spec) = match refspec.strip_prefix('+') {
        Some(spec) => ("+", spec),
        None => ("", refspec),
    };
    let (src, dst) = spec
        .split_once(':')
        .ok_or_else(|| GitError::transient(format!("invalid refspec {refspec}")))?;
    let src_prefix = src.trim_end_matches('*');
    let dst_prefix = dst.trim_end_matches('*');
    let references = repo.references_glob(src).map_err(map_git_error)?;
    let mut expanded = Vec::new();
    for reference in references {
        let reference = reference.map_err(map_git_error)?;
        let Some(name) = reference.name() else {
            continue;
        };
        if let Some(suffix) = name.strip_prefix(src_prefix) {
            expanded.push(format!("{force}{name}:{dst_prefix}{suffix}"));
        }
    }
    expanded.sort();
    Ok(expanded)
}

fn namespace_refs(repo: &Repository, namespace: &str) -> Result<Vec<String>, GitError> {
    let mut names = Vec::new();
    for reference in repo.references().map_err(map_git_error)? {
        let reference = reference.map_err(map_git_error)?;
        if let Some(name) = reference.name().filter(|name| name.starts_with(namespace)) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Drops refs left by an earlier listing so deleted remote refs disappear.
fn clear_namespace(repo: &Repository, namespace: &str) -> Result<(), GitError> {
    for name in namespace_refs(repo, namespace)? {
        repo.find_reference(&name)
            .and_then(|mut reference| reference.delete())
            .map_err(map_git_error)?;
    }
    Ok(())
}

fn remote_callbacks<'a>(auth: Option<&'a RepoAuth>, attempts: &'a Cell<u32>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed| {
        attempts.set(attempts.get() + 1);
        // libgit2 asks again after a rejected credential; stop after one try.
        match auth {
            Some(auth) if attempts.get() == 1 => {
                Cred::userpass_plaintext(&auth.username, &auth.token)
            }
            _ => Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Http,
                "authentication required",
            )),
        }
    });
    callbacks
}

fn map_git_error(err: git2::Error) -> GitError {
    if is_auth_error(&err) {
        GitError::AuthRequired
    } else {
        GitError::Transient(err.message().to_string())
    }
}

fn is_auth_error(err: &git2::Error) -> bool {
    if err.code() == ErrorCode::Auth {
        return true;
    }
    let message = err.message().to_ascii_lowercase();
    message.contains("authentication required") || message.contains("status code: 401")
}
