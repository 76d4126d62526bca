//! Bounded history of past update runs.
//!
//! The file holds at most [`MAX_ENTRIES`] entries; appending beyond that
//! evicts the oldest ones first.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::{Context, Result},
    chrono::{SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
    tokio::fs,
    tracing::debug,
};

pub const MAX_ENTRIES: usize = 5;
pub const MAX_ERRORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,
    pub plugins_updated: Vec<String>,
    pub errors: Vec<String>,
    /// Milliseconds.
    pub duration: u64,
    pub success: bool,
}

impl HistoryEntry {
    /// Entry stamped with the current time. Duplicate plugin names are
    /// dropped and errors are capped at [`MAX_ERRORS`].
    pub fn new(plugins: &[String], errors: &[String], duration: Duration, success: bool) -> Self {
        let mut plugins_updated: Vec<String> = Vec::with_capacity(plugins.len());
        for name in plugins {
            if !plugins_updated.contains(name) {
                plugins_updated.push(name.clone());
            }
        }
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            plugins_updated,
            errors: errors.iter().take(MAX_ERRORS).cloned().collect(),
            duration: duration.as_millis() as u64,
            success,
        }
    }
}

/// On-disk document: `{ "entries": [...] }`, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularLog {
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
}

impl CircularLog {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > MAX_ENTRIES {
            let excess = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..excess);
        }
    }
}

pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt history reads as empty.
    pub async fn read(&self) -> CircularLog {
        let Ok(raw) = fs::read_to_string(&self.path).await else {
            return CircularLog::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(path = %self.path.display(), error = %e, "ignoring malformed history");
            CircularLog::default()
        })
    }

    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut log = self.read().await;
        log.push(entry);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&log)?;
        fs::write(&self.path, format!("{json}\n"))
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
