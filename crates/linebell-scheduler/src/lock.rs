//! Run lock — stops overlapping scheduled runs from sending twice.
//!
//! The lock is a plain file holding the owner's pid. Only its existence and
//! mtime matter: a lock younger than the TTL means a run is in progress, an
//! older one is treated as left behind by a crashed run and replaced.
//! This is a single-host safeguard, not a strict mutex.

use chrono::{DateTime, Utc};
use linebell_core::config::LockConfig;
use linebell_core::error::{LinebellError, Result};
use linebell_core::types::LockRecord;
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Time-boxed advisory lock anchored to a file path.
#[derive(Debug, Clone)]
pub struct ExclusivityGuard {
    path: PathBuf,
    ttl: Duration,
}

impl ExclusivityGuard {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(LinebellError::Config("lock path must not be empty".into()));
        }
        if ttl.is_zero() {
            return Err(LinebellError::Config("lock TTL must be positive".into()));
        }
        Ok(Self { path, ttl })
    }

    pub fn from_config(config: &LockConfig) -> Result<Self> {
        Self::new(config.expanded_path()?, config.ttl()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Take the lock, replacing it if it has outlived the TTL.
    ///
    /// Creation uses `create_new`, so two processes cannot both create the
    /// file. After a stale lock is removed creation is retried once; losing
    /// that race reports `LockHeld`.
    pub fn acquire(&self) -> Result<RunLock> {
        self.ensure_parent()?;

        for attempt in 0..2 {
            match create_exclusive(&self.path) {
                Ok(()) => {
                    tracing::debug!("🔒 Acquired run lock {}", self.path.display());
                    return Ok(RunLock {
                        path: self.path.clone(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LinebellError::lock_io(&self.path, e)),
            }

            let age = match lock_age(&self.path) {
                Ok(age) => age,
                // Released between our create and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(LinebellError::lock_io(&self.path, e)),
            };

            if age < self.ttl || attempt > 0 {
                return Err(LinebellError::LockHeld {
                    path: self.path.clone(),
                    age_secs: age.as_secs(),
                });
            }

            tracing::warn!(
                "⚠️ Removing stale run lock {} (age={}s, ttl={}s)",
                self.path.display(),
                age.as_secs(),
                self.ttl.as_secs()
            );
            remove_if_present(&self.path).map_err(|e| LinebellError::lock_io(&self.path, e))?;
        }

        Err(LinebellError::LockHeld {
            path: self.path.clone(),
            age_secs: 0,
        })
    }

    /// Remove the lock file. Missing file is fine.
    pub fn release(&self) -> Result<()> {
        remove_if_present(&self.path).map_err(|e| LinebellError::lock_io(&self.path, e))
    }

    /// Run `body` while holding the lock.
    ///
    /// The lock is released on every exit path. If both the body and the
    /// release fail, the body's error is returned.
    pub async fn scope<F, T>(&self, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let lock = self.acquire()?;
        let result = body.await;
        match (result, lock.release()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                tracing::warn!("Failed to release run lock after error: {release_err}");
                Err(e)
            }
        }
    }

    /// Snapshot of the lock file, if any.
    pub fn inspect(&self) -> Result<Option<LockRecord>> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LinebellError::lock_io(&self.path, e)),
        };
        let modified = meta
            .modified()
            .map_err(|e| LinebellError::lock_io(&self.path, e))?;
        let owner_pid = match std::fs::read_to_string(&self.path) {
            Ok(content) => content.trim().parse().ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LinebellError::lock_io(&self.path, e)),
        };

        Ok(Some(LockRecord {
            path: self.path.clone(),
            owner_pid,
            modified: DateTime::<Utc>::from(modified),
            age: age_since(modified),
        }))
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| LinebellError::lock_io(&self.path, e))?;
        }
        Ok(())
    }
}

/// A held run lock. Released explicitly with [`RunLock::release`] or on drop.
#[must_use = "dropping a RunLock releases it immediately"]
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release now, reporting I/O errors.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_if_present(&self.path).map_err(|e| LinebellError::lock_io(&self.path, e))?;
        tracing::debug!("🔓 Released run lock {}", self.path.display());
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_if_present(&self.path) {
            tracing::warn!("Failed to release run lock {}: {e}", self.path.display());
        }
    }
}

fn create_exclusive(path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    if let Err(e) = write!(file, "{}", std::process::id()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn lock_age(path: &Path) -> std::io::Result<Duration> {
    Ok(age_since(std::fs::metadata(path)?.modified()?))
}

/// mtime in the future counts as brand new.
fn age_since(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}
