//! Configuration for the plugin auto-updater.
//!
//! Options come from three layers, highest priority first: values set by the
//! caller, `OPENCODE_AUTO_UPDATE_*` environment variables, and built-in
//! defaults. Resolution produces an [`UpdateContext`], the single object that
//! is threaded through every step of an update run.

pub mod env;
pub mod options;
pub mod paths;
pub mod settings;

pub use {
    options::{ThrottlePolicy, UpdateContext, UpdateOptions},
    settings::LocalSettings,
};
