//! Local updater settings stored next to the host config.

use std::path::Path;

use {
    anyhow::{Context, Result},
    serde::Deserialize,
    tracing::debug,
};

/// Contents of `opencode-plugin-auto-update.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSettings {
    #[serde(default)]
    pub ignore_throttle: Option<bool>,
    /// Companion executable invoked with `update` after plugins are refreshed.
    #[serde(default)]
    pub extension_updater: Option<String>,
}

impl LocalSettings {
    /// Load settings, treating a missing or malformed file as empty.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "using default local settings");
                Self::default()
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        // A literal `null` document is accepted as "no settings".
        let parsed: Option<Self> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(parsed.unwrap_or_default())
    }
}
