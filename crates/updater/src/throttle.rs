//! Persisted last-run / last-success timestamps.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    serde::{Deserialize, Serialize},
    tokio::fs,
    tracing::debug,
};

use autoupdate_config::UpdateContext;

/// Contents of `.auto-update.json`, epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
}

pub struct ThrottleStore {
    config_dir: PathBuf,
    path: PathBuf,
}

impl ThrottleStore {
    pub fn new(ctx: &UpdateContext) -> Self {
        Self::at(&ctx.config_dir, &ctx.throttle_path)
    }

    pub fn at(config_dir: &Path, path: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            path: path.to_path_buf(),
        }
    }

    /// Missing or corrupt state reads as empty.
    pub async fn read(&self) -> ThrottleState {
        let Ok(raw) = fs::read_to_string(&self.path).await else {
            return ThrottleState::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(path = %self.path.display(), error = %e, "ignoring malformed throttle state");
            ThrottleState::default()
        })
    }

    pub async fn write(&self, state: &ThrottleState) -> Result<()> {
        fs::create_dir_all(&self.config_dir)
            .await
            .with_context(|| format!("failed to create {}", self.config_dir.display()))?;
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(last_run = ?state.last_run, last_success = ?state.last_success, "throttle state written");
        Ok(())
    }
}
