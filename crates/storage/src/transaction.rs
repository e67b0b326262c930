//! Atomic replacement of a whole directory tree.
//!
//! A transaction moves the tracked root out of the way (to a timestamped
//! backup next to it) and hands out a fresh, empty temporary directory as the
//! only place the caller may write to. Commit swaps the temporary tree into
//! place and throws the backup away; rollback throws the temporary tree away
//! and puts the backup back. At no point is the root path observably
//! half-written: it is either absent while its backup sits next to it, or it
//! is a complete tree.
//!
//! ```text
//!            begin()                commit()
//!   root -------------> [Staged] -------------> [Committed]
//!                          |
//!                          | rollback() / error / drop
//!                          v
//!                     [RolledBack]
//! ```

use crate::error::{ErrorKind, Result};
use crate::path::resolve;
use quill_asyncutils::RetryPolicy;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// The temporary tree is the write target; the original sits in the backup.
    Staged,
    /// The temporary tree replaced the original.
    Committed,
    /// The original is back where it was.
    RolledBack,
}

/// Guard over one atomic rewrite of a tracked root.
///
/// Dropping a transaction that is still [`Staged`](TransactionState::Staged)
/// (an error unwound past it, or the future owning it was cancelled) rolls it
/// back synchronously, so cleanup runs exactly once on every exit path.
#[derive(Debug)]
pub struct FsTransaction {
    root: PathBuf,
    temp: PathBuf,
    /// `None` when the root did not exist when the transaction began.
    backup: Option<PathBuf>,
    /// Moved from the backup into the temporary tree; moved back on rollback.
    carried: Vec<String>,
    state: TransactionState,
    retry: RetryPolicy,
}

impl FsTransaction {
    /// Stage a rewrite of `root` using the default directory-delete policy.
    pub async fn begin(root: impl Into<PathBuf>) -> Result<Self> {
        Self::begin_with(root, RetryPolicy::DIRECTORY_DELETE).await
    }

    pub async fn begin_with(root: impl Into<PathBuf>, retry: RetryPolicy) -> Result<Self> {
        let root = root.into();
        let parent = root.parent().ok_or_else(|| ErrorKind::InvalidPath(root.clone()))?;
        let name = root.file_name().and_then(|n| n.to_str()).ok_or_else(|| ErrorKind::InvalidPath(root.clone()))?;
        let stamp = UtcDateTime::now().unix_timestamp_nanos();
        let temp = parent.join(format!(".{name}.quill-tmp-{stamp}"));
        let backup = parent.join(format!(".{name}.quill-backup-{stamp}"));

        fs::create_dir(&temp).await.map_err(|e| ErrorKind::from_io(e, &temp))?;
        let backup = match fs::rename(&root, &backup).await {
            Ok(()) => Some(backup),
            // Nothing to preserve: the root is created by the commit.
            Err(e) if e.kind() == IoErrorKind::NotFound => None,
            Err(e) => {
                _ = fs::remove_dir(&temp).await;
                exn::bail!(ErrorKind::from_io(e, &root));
            },
        };
        tracing::debug!(
            root = %root.display(),
            temp = %temp.display(),
            backup = ?backup.as_ref().map(|b| b.display().to_string()),
            "filesystem transaction staged"
        );
        Ok(Self { root, temp, backup, carried: Vec::new(), state: TransactionState::Staged, retry })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The temporary tree all work must happen in.
    pub fn workspace(&self) -> &Path {
        &self.temp
    }

    /// Where the original tree is parked, if there was one.
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Create a directory (and its parents) in the temporary tree.
    pub async fn create_dir(&self, relative: &str) -> Result<()> {
        let target = resolve(&self.temp, relative)?;
        fs::create_dir_all(&target).await.map_err(|e| ErrorKind::from_io(e, &target))?;
        Ok(())
    }

    /// Write a file into the temporary tree, creating parent directories.
    pub async fn write(&self, relative: &str, contents: &[u8]) -> Result<()> {
        let target = resolve(&self.temp, relative)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        fs::write(&target, contents).await.map_err(|e| ErrorKind::from_io(e, &target))?;
        Ok(())
    }

    /// Carry an unchanged file over from the backup without copying its
    /// bytes. Falls back to a copy on filesystems without hard links.
    pub async fn link_from_backup(&self, relative: &str) -> Result<()> {
        let backup = self.backup.as_deref().ok_or_else(|| ErrorKind::NotFound(PathBuf::from(relative)))?;
        let source = resolve(backup, relative)?;
        let target = resolve(&self.temp, relative)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        if let Err(err) = fs::hard_link(&source, &target).await {
            if err.kind() == IoErrorKind::NotFound {
                exn::bail!(ErrorKind::NotFound(source));
            }
            tracing::debug!(path = relative, error = %err, "hard link failed; copying instead");
            fs::copy(&source, &target).await.map_err(|e| ErrorKind::from_io(e, &source))?;
        }
        Ok(())
    }

    /// Move an entry the caller does not manage (an ignored directory, a
    /// symlink) from the backup into the temporary tree untouched. Must run
    /// before anything else is written at that path.
    pub async fn carry_from_backup(&mut self, relative: &str) -> Result<()> {
        let backup = self.backup.as_deref().ok_or_else(|| ErrorKind::NotFound(PathBuf::from(relative)))?;
        let source = resolve(backup, relative)?;
        let target = resolve(&self.temp, relative)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        fs::rename(&source, &target).await.map_err(|e| ErrorKind::from_io(e, &source))?;
        self.carried.push(relative.to_string());
        Ok(())
    }

    /// Swap the temporary tree into place and delete the backup.
    ///
    /// If the swap itself fails the transaction is rolled back before the
    /// error is returned. A backup that cannot be deleted (even after a retry)
    /// is reported as an error, but the new tree is already live.
    pub async fn commit(mut self) -> Result<()> {
        if let Err(err) = fs::rename(&self.temp, &self.root).await {
            tracing::error!(root = %self.root.display(), error = %err, "could not move new tree into place");
            let cause = ErrorKind::from_io(err, &self.root);
            self.rollback_inner().await?;
            exn::bail!(cause);
        }
        self.state = TransactionState::Committed;
        tracing::debug!(root = %self.root.display(), "filesystem transaction committed");
        if let Some(backup) = &self.backup {
            remove_tree(&self.retry, backup).await.map_err(|e| ErrorKind::from_io(e, backup))?;
        }
        Ok(())
    }

    /// Discard the temporary tree and restore the original.
    pub async fn rollback(mut self) -> Result<()> {
        self.rollback_inner().await
    }

    async fn rollback_inner(&mut self) -> Result<()> {
        // Mark first: whatever happens below, Drop must not try again.
        self.state = TransactionState::RolledBack;
        let preserved = self.backup.clone().unwrap_or_else(|| self.temp.clone());
        if let Some(backup) = &self.backup {
            for relative in self.carried.iter().rev() {
                if let Err(err) = fs::rename(self.temp.join(relative), backup.join(relative)).await {
                    tracing::error!(path = relative, error = %err, "could not move untracked entry back");
                    exn::bail!(ErrorKind::RollbackFailed(self.temp.clone()));
                }
            }
        }
        if let Err(err) = remove_tree(&self.retry, &self.temp).await {
            tracing::error!(temp = %self.temp.display(), error = %err, "could not remove temporary tree");
            exn::bail!(ErrorKind::RollbackFailed(preserved));
        }
        if let Some(backup) = &self.backup
            && let Err(err) = fs::rename(backup, &self.root).await
        {
            tracing::error!(backup = %backup.display(), error = %err, "could not restore original tree");
            exn::bail!(ErrorKind::RollbackFailed(preserved));
        }
        tracing::info!(root = %self.root.display(), "filesystem transaction rolled back");
        Ok(())
    }

    fn rollback_blocking(&mut self) {
        self.state = TransactionState::RolledBack;
        if let Some(backup) = &self.backup {
            for relative in self.carried.iter().rev() {
                if let Err(err) = std::fs::rename(self.temp.join(relative), backup.join(relative)) {
                    tracing::error!(
                        path = relative,
                        error = %err,
                        "rollback incomplete: untracked entry left in the temporary tree"
                    );
                    return;
                }
            }
        }
        let removed = self.retry.run_blocking("remove temporary tree", |_| match std::fs::remove_dir_all(&self.temp) {
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            other => other,
        });
        if removed.is_err() {
            tracing::error!(temp = %self.temp.display(), "rollback incomplete: temporary tree left behind");
            return;
        }
        if let Some(backup) = &self.backup
            && let Err(err) = std::fs::rename(backup, &self.root)
        {
            tracing::error!(
                backup = %backup.display(),
                error = %err,
                "rollback incomplete: original tree is still at its backup location"
            );
            return;
        }
        tracing::info!(root = %self.root.display(), "filesystem transaction rolled back on drop");
    }
}

impl Drop for FsTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Staged {
            self.rollback_blocking();
        }
    }
}

async fn remove_tree(retry: &RetryPolicy, path: &Path) -> std::io::Result<()> {
    retry
        .run("remove directory tree", |_| async move {
            match fs::remove_dir_all(path).await {
                Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
                other => other,
            }
        })
        .await
}
