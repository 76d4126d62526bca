//! Background auto-updater for host CLI plugins.
//!
//! A run takes the cross-process lock, consults the throttle state, reads the
//! host's `opencode.json`, upgrades every registry plugin through an external
//! package manager, writes the refreshed list back and records the run in a
//! bounded history file. Skip conditions and per-plugin failures never turn
//! into errors for the host; see [`update::Updater::run`].

pub mod error;
pub mod history;
pub mod host_config;
pub mod lock;
pub mod package_manager;
pub mod plugin;
pub mod report;
pub mod runner;
pub mod spec;
pub mod throttle;
pub mod update;

pub use {
    error::UpdateError,
    plugin::AutoUpdatePlugin,
    update::{RunOutcome, RunSummary, UpdateResult, Updater},
};

/// Wall-clock time in epoch milliseconds, the unit of every persisted timestamp.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
