//! Cross-process mutual exclusion for update runs.
//!
//! The lock is a JSON file `{ pid, timestamp, hostname }` in the config
//! directory. Creation uses an exclusive open so two processes racing on an
//! empty directory cannot both win. An existing lock that cannot be read or
//! parsed counts as absent; one older than [`STALE_LOCK_AGE`] may be reclaimed
//! when the caller asks for it.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::{Context, Result},
    serde::{Deserialize, Serialize},
    tokio::{
        fs,
        io::{AsyncWrite, AsyncWriteExt},
    },
    tracing::{debug, warn},
};

use autoupdate_config::UpdateContext;

pub const STALE_LOCK_AGE: Duration = Duration::from_secs(2 * 60 * 60);

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockData {
    pub pid: u32,
    /// Epoch milliseconds at acquisition.
    pub timestamp: i64,
    pub hostname: String,
}

impl LockData {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            timestamp: crate::now_ms(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }

    /// A lock is stale once strictly more than [`STALE_LOCK_AGE`] has passed.
    /// Timestamps in the future are never stale.
    pub fn is_stale(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > STALE_LOCK_AGE.as_millis() as i64
    }
}

pub struct LockManager {
    config_dir: PathBuf,
    path: PathBuf,
}

impl LockManager {
    pub fn new(ctx: &UpdateContext) -> Self {
        Self::at(&ctx.config_dir, &ctx.lock_path)
    }

    pub fn at(config_dir: &Path, lock_path: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            path: lock_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lock holder, or `None` when the file is missing or unreadable.
    pub async fn read(&self) -> Option<LockData> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "ignoring malformed lock file");
                None
            },
        }
    }

    /// Take the lock and return a guard that removes the file when released
    /// or dropped. `None` in the same cases [`LockManager::acquire`] fails.
    pub async fn acquire_guard(&self, force: bool) -> Option<LockGuard> {
        self.acquire(force).await.then(|| LockGuard {
            path: self.path.clone(),
            released: false,
        })
    }

    /// Try to take the lock. Returns `false` when another live run holds it,
    /// when a stale lock exists and `force` is not set, or on any I/O failure.
    pub async fn acquire(&self, force: bool) -> bool {
        match self.try_acquire(force).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to acquire update lock");
                false
            },
        }
    }

    async fn try_acquire(&self, force: bool) -> Result<bool> {
        fs::create_dir_all(&self.config_dir)
            .await
            .with_context(|| format!("failed to create {}", self.config_dir.display()))?;

        let data = LockData::current();
        match self.create_exclusive(&data).await {
            Ok(()) => {
                debug!(pid = data.pid, "update lock acquired");
                return Ok(true);
            },
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {},
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to create {}", self.path.display()));
            },
        }

        match self.read().await {
            Some(existing) if !existing.is_stale(crate::now_ms()) => {
                debug!(pid = existing.pid, host = %existing.hostname, "update lock already held");
                return Ok(false);
            },
            Some(existing) if !force => {
                debug!(pid = existing.pid, "stale update lock present, not forcing");
                return Ok(false);
            },
            Some(existing) => {
                debug!(pid = existing.pid, "stale update lock detected, forcing acquisition");
            },
            None => {
                debug!("unreadable update lock, replacing it");
            },
        }

        self.overwrite(&data).await?;
        debug!(pid = data.pid, "update lock acquired");
        Ok(true)
    }

    async fn create_exclusive(&self, data: &LockData) -> std::io::Result<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        write_new_lock(file, &self.path, encode(data).as_bytes()).await
    }

    async fn overwrite(&self, data: &LockData) -> Result<()> {
        fs::write(&self.path, encode(data))
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Remove the lock file. A missing file is fine; other failures are
    /// logged and otherwise ignored.
    pub async fn release(&self) {
        log_removal(&self.path, fs::remove_file(&self.path).await);
    }
}

/// A held lock. [`LockGuard::release`] removes the file; a guard dropped
/// without being released removes it synchronously.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.released = true;
        log_removal(&self.path, fs::remove_file(&self.path).await);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            debug!(path = %self.path.display(), "lock guard dropped before release");
            log_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(pid = std::process::id(), "update lock released"),
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to release update lock");
        },
    }
}

/// Write the contents of a freshly created lock file. On failure the file is
/// removed so no empty lock is left behind.
async fn write_new_lock<W>(mut file: W, path: &Path, contents: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(contents).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        drop(file);
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove partial lock file");
        }
    }
    written
}

fn encode(data: &LockData) -> String {
    // LockData has only plain fields, serialization cannot fail.
    serde_json::to_string_pretty(data).unwrap_or_default()
}
