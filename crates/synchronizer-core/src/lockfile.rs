use anyhow::{Context, bail};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = ".git-synchronizer.lock";

/// Exclusive claim on a working directory for the length of one run.
/// Released when dropped.
#[derive(Debug)]
pub struct WorkingDirectoryLock {
    path: PathBuf,
    file: File,
}

impl WorkingDirectoryLock {
    /// Creates `directory` if needed and locks it. Returns `None` when
    /// another run already holds the lock.
    pub fn try_acquire(directory: &Path) -> anyhow::Result<Option<Self>> {
        fs::create_dir_all(directory).with_context(|| {
            format!("create working directory {}", directory.display())
        })?;
        let path = directory.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lockfile {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, file })),
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock working directory exclusively"),
        }
    }

    /// Like [`Self::try_acquire`], but a held lock is an error.
    pub fn acquire(directory: &Path) -> anyhow::Result<Self> {
        match Self::try_acquire(directory)? {
            Some(lock) => Ok(lock),
            None => bail!(
                "working directory {} is in use by another synchronization run",
                directory.display()
            ),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingDirectoryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    matches!(err.raw_os_error(), Some(33))
}
