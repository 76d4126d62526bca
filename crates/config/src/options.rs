//! Caller-facing options and the resolved per-run context.

use std::{path::PathBuf, time::Duration};

use crate::{
    env::{self, EnvLookup},
    paths,
    settings::LocalSettings,
};

pub const DEFAULT_INTERVAL_HOURS: f64 = 24.0;

/// How often an update run may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    /// Every run proceeds.
    Disabled,
    /// A run proceeds only once `interval` has passed since the last run.
    Every(Duration),
}

impl ThrottlePolicy {
    /// A non-positive interval disables throttling. Intervals too large for a
    /// [`Duration`] saturate at [`Duration::MAX`].
    pub fn from_hours(hours: f64) -> Self {
        if !hours.is_finite() || hours <= 0.0 {
            return Self::Disabled;
        }
        Self::Every(Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(Duration::MAX))
    }

    /// Interval in milliseconds, saturating at `u64::MAX`.
    pub fn interval_ms(&self) -> Option<u64> {
        match self {
            Self::Disabled => None,
            Self::Every(interval) => Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Whether a run that last started at `last_run_ms` must be skipped at `now_ms`.
    pub fn is_throttled(&self, last_run_ms: Option<i64>, now_ms: i64) -> bool {
        let (Some(interval_ms), Some(last_run_ms)) = (self.interval_ms(), last_run_ms) else {
            return false;
        };
        i128::from(now_ms) - i128::from(last_run_ms) < i128::from(interval_ms)
    }
}

/// Options supplied by the caller. Unset fields fall back to the environment
/// and then to defaults.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub config_dir: Option<PathBuf>,
    pub interval_hours: Option<f64>,
    pub disabled: Option<bool>,
    pub debug: Option<bool>,
    pub preserve_pinned: Option<bool>,
    pub ignore_throttle: Option<bool>,
    pub history_path: Option<PathBuf>,
    pub extension_updater: Option<String>,
    pub reclaim_stale_lock: Option<bool>,
}

impl UpdateOptions {
    /// Resolve against the process environment.
    pub fn resolve(self) -> UpdateContext {
        self.resolve_with(&env::process_env)
    }

    /// Fill unset fields from the local settings file. Ignoring the throttle
    /// is on when either the environment or the settings ask for it.
    pub fn with_local_settings(mut self, settings: &LocalSettings, lookup: &impl EnvLookup) -> Self {
        if self.ignore_throttle.is_none() {
            let from_env = env::flag(lookup, env::BYPASS_THROTTLE);
            self.ignore_throttle = Some(from_env || settings.ignore_throttle.unwrap_or(false));
        }
        if self.extension_updater.is_none() {
            self.extension_updater = settings.extension_updater.clone();
        }
        self
    }

    /// Config directory these options point at.
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(paths::default_config_dir)
    }

    pub fn resolve_with(self, lookup: &impl EnvLookup) -> UpdateContext {
        let config_dir = self.config_dir.unwrap_or_else(paths::default_config_dir);
        let interval_hours = self.interval_hours.unwrap_or_else(|| {
            env::number(lookup, env::INTERVAL_HOURS, DEFAULT_INTERVAL_HOURS)
        });
        let history_path = self
            .history_path
            .unwrap_or_else(|| paths::history_path(&config_dir));

        UpdateContext {
            config_path: paths::host_config_path(&config_dir),
            lock_path: paths::lock_path(&config_dir),
            throttle_path: paths::throttle_path(&config_dir),
            history_path,
            disabled: self
                .disabled
                .unwrap_or_else(|| env::flag(lookup, env::DISABLED)),
            debug: self.debug.unwrap_or_else(|| env::flag(lookup, env::DEBUG)),
            ignore_throttle: self
                .ignore_throttle
                .unwrap_or_else(|| env::flag(lookup, env::BYPASS_THROTTLE)),
            preserve_pinned: self
                .preserve_pinned
                .unwrap_or_else(|| env::flag(lookup, env::PINNED)),
            throttle: ThrottlePolicy::from_hours(interval_hours),
            extension_updater: self.extension_updater.filter(|exe| !exe.trim().is_empty()),
            reclaim_stale_lock: self.reclaim_stale_lock.unwrap_or(true),
            config_dir,
        }
    }
}

/// Everything one update run needs, resolved once per invocation.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub lock_path: PathBuf,
    pub throttle_path: PathBuf,
    pub history_path: PathBuf,
    pub disabled: bool,
    pub debug: bool,
    pub ignore_throttle: bool,
    pub preserve_pinned: bool,
    pub throttle: ThrottlePolicy,
    pub extension_updater: Option<String>,
    pub reclaim_stale_lock: bool,
}

impl UpdateContext {
    /// Context rooted at `config_dir` with every flag at its default and the
    /// environment ignored.
    pub fn for_dir(config_dir: impl Into<PathBuf>) -> Self {
        UpdateOptions {
            config_dir: Some(config_dir.into()),
            ..Default::default()
        }
        .resolve_with(&env::no_env)
    }
}
