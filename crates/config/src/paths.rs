//! Well-known file locations inside the host configuration directory.
//!
//! ```text
//! ~/.config/opencode/
//! ├── opencode.json                        # host config, owns the `plugin` array
//! ├── opencode-plugin-auto-update.json     # local updater settings
//! ├── .auto-update.lock                    # run lock
//! ├── .auto-update.json                    # throttle state
//! ├── .auto-update-history.json            # last five runs
//! └── node_modules/                        # package manager install target
//! ```

use std::path::{Path, PathBuf};

use directories::BaseDirs;

pub const HOST_CONFIG_FILE: &str = "opencode.json";
pub const SETTINGS_FILE: &str = "opencode-plugin-auto-update.json";
pub const LOCK_FILE: &str = ".auto-update.lock";
pub const THROTTLE_FILE: &str = ".auto-update.json";
pub const HISTORY_FILE: &str = ".auto-update-history.json";

/// `$HOME/.config/opencode` on every platform.
pub fn default_config_dir() -> PathBuf {
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(".config").join("opencode"),
        None => PathBuf::from(".config").join("opencode"),
    }
}

pub fn host_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(HOST_CONFIG_FILE)
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn lock_path(config_dir: &Path) -> PathBuf {
    config_dir.join(LOCK_FILE)
}

pub fn throttle_path(config_dir: &Path) -> PathBuf {
    config_dir.join(THROTTLE_FILE)
}

pub fn history_path(config_dir: &Path) -> PathBuf {
    config_dir.join(HISTORY_FILE)
}
