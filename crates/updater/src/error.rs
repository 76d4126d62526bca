//! Recoverable failures of a single update step.
//!
//! These never abort a run: the orchestrator logs them, keeps the affected
//! plugin entry unchanged and records the message in the run history.

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("{manager} failed to install {name}: {message}")]
    InstallFailed {
        name: String,
        manager: &'static str,
        message: String,
    },

    #[error("unable to read installed version for {name}")]
    VersionUnreadable { name: String },

    #[error("extension updater {program} is not available")]
    ExtensionUpdaterUnavailable { program: String },

    #[error("extension updater {program} failed: {message}")]
    ExtensionUpdateFailed { program: String, message: String },
}
