//! Reading, normalizing and rewriting the host's `opencode.json`.
//!
//! Only the `plugin` array is interpreted. Every other key is carried through
//! a rewrite untouched and in its original order.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    serde_json::{Map, Value},
    tokio::fs,
    tracing::{debug, warn},
};

pub const PLUGIN_KEY: &str = "plugin";
pub const LEGACY_PLUGIN_KEY: &str = "plugins";

#[derive(Debug, Clone)]
pub struct HostConfig {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl HostConfig {
    /// Load the config, or `None` when it is missing, unparseable or not a
    /// JSON object.
    pub async fn load(path: &Path) -> Option<Self> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "host config not readable");
                return None;
            },
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(doc)) => Some(Self {
                path: path.to_path_buf(),
                doc,
            }),
            Ok(_) => {
                debug!(path = %path.display(), "host config is not a JSON object");
                None
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "host config not parseable");
                None
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fold a legacy `plugins` array into `plugin`: `plugin` entries first,
    /// then `plugins`, keeping the first occurrence of each. The legacy key is
    /// removed. Returns whether the document changed.
    pub fn migrate_legacy_key(&mut self) -> bool {
        let Some(legacy) = self.doc.get(LEGACY_PLUGIN_KEY).and_then(Value::as_array) else {
            return false;
        };

        let current = self
            .doc
            .get(PLUGIN_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut merged: Vec<Value> = Vec::with_capacity(current.len() + legacy.len());
        for entry in current.iter().chain(legacy) {
            if !merged.contains(entry) {
                merged.push(entry.clone());
            }
        }

        // Rebuild so `plugin` keeps its position, or takes over the legacy
        // key's position when it did not exist yet.
        let had_plugin_key = self.doc.contains_key(PLUGIN_KEY);
        let mut merged = Some(Value::Array(merged));
        let mut doc = Map::with_capacity(self.doc.len());
        for (key, value) in std::mem::take(&mut self.doc) {
            if key == PLUGIN_KEY || (key == LEGACY_PLUGIN_KEY && !had_plugin_key) {
                if let Some(merged) = merged.take() {
                    doc.insert(PLUGIN_KEY.to_string(), merged);
                }
            } else if key != LEGACY_PLUGIN_KEY {
                doc.insert(key, value);
            }
        }
        self.doc = doc;
        true
    }

    /// The `plugin` array as spec strings. `None` when the key is absent, not
    /// an array, or holds anything other than strings.
    pub fn plugin_specs(&self) -> Option<Vec<String>> {
        let entries = self.doc.get(PLUGIN_KEY)?.as_array()?;
        let specs: Option<Vec<String>> = entries
            .iter()
            .map(|entry| entry.as_str().map(str::to_string))
            .collect();
        if specs.is_none() {
            warn!(path = %self.path.display(), "plugin array contains non-string entries, leaving it alone");
        }
        specs
    }

    pub fn set_plugin_specs(&mut self, specs: &[String]) {
        let array = specs.iter().cloned().map(Value::String).collect();
        self.doc.insert(PLUGIN_KEY.to_string(), Value::Array(array));
    }

    /// Write the document back as pretty JSON with a trailing newline.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.doc)?;
        fs::write(&self.path, format!("{json}\n"))
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), "host config written");
        Ok(())
    }
}
