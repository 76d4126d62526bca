//! The update run: lock, throttle, config normalization, per-plugin upgrade,
//! persistence and history.
//!
//! ```text
//! Idle ─► LockAcquired ─► ThrottleChecked ─► ConfigLoaded ─► Updating ─► Persisting ─► Done
//!            │                  │                  │              │            │
//!            └──────────────────┴──────── Failed ◄─┴──────────────┴────────────┘
//! ```
//!
//! The lock is released on every exit path once it has been taken, including
//! a run future dropped mid-flight.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    tokio::fs,
    tracing::{debug, error, info, warn},
};

use autoupdate_config::UpdateContext;

use crate::{
    history::{HistoryEntry, HistoryLog},
    host_config::HostConfig,
    lock::LockManager,
    now_ms,
    package_manager::{self, PackageManager},
    report::{RunReport, ToastVariant},
    runner::{CommandRunner, ProcessRunner},
    spec::{self, PluginSpec},
    throttle::{ThrottleState, ThrottleStore},
};

/// Outcome of the per-plugin upgrade pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// The plugin list to persist, in original order.
    pub plugins: Vec<String>,
    /// Whether any entry differs from its original string.
    pub changed: bool,
    /// Names of the plugins whose entry changed.
    pub updated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Disabled,
    LockHeld,
    Throttled,
    NoConfig,
    NoPlugins,
    Completed(UpdateResult),
    Failed(String),
}

impl RunOutcome {
    /// Only runs that did real work are written to the history log.
    pub fn records_history(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub report: RunReport,
}

impl RunSummary {
    /// Toast style for the host notification of this run.
    pub fn toast_variant(&self) -> ToastVariant {
        match &self.outcome {
            RunOutcome::Failed(_) => ToastVariant::Error,
            RunOutcome::Completed(_) if !self.report.errors.is_empty() => ToastVariant::Warning,
            RunOutcome::Completed(result) if result.changed => ToastVariant::Success,
            _ => ToastVariant::Info,
        }
    }
}

pub struct Updater {
    ctx: UpdateContext,
    runner: Arc<dyn CommandRunner>,
}

impl Updater {
    pub fn new(ctx: UpdateContext) -> Self {
        Self::with_runner(ctx, Arc::new(ProcessRunner))
    }

    pub fn with_runner(ctx: UpdateContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self { ctx, runner }
    }

    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    /// Run one update pass. Never fails: every problem ends up in the
    /// returned outcome and report.
    pub async fn run(&self) -> RunSummary {
        let mut report = RunReport::echoing(self.ctx.debug);

        if self.ctx.disabled {
            debug!("auto-update disabled");
            return RunSummary {
                outcome: RunOutcome::Disabled,
                report,
            };
        }

        let lock = LockManager::new(&self.ctx);
        let Some(guard) = lock.acquire_guard(self.ctx.reclaim_stale_lock).await else {
            report.log("[auto-update] Lock already held, skipping.");
            debug!(path = %lock.path().display(), "update lock held, skipping");
            return RunSummary {
                outcome: RunOutcome::LockHeld,
                report,
            };
        };

        let started = Instant::now();
        let outcome = match self.run_locked(&mut report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("{e:#}");
                error!(error = %message, "failed to update plugins");
                report.error(format!("[auto-update] Failed to update plugins: {message}"));
                RunOutcome::Failed(message)
            },
        };

        if outcome.records_history() {
            self.record_history(&outcome, &report, started).await;
        }

        guard.release().await;
        RunSummary { outcome, report }
    }

    async fn run_locked(&self, report: &mut RunReport) -> Result<RunOutcome> {
        let throttle = ThrottleStore::new(&self.ctx);
        let state = throttle.read().await;
        let now = now_ms();

        if !self.ctx.ignore_throttle && self.ctx.throttle.is_throttled(state.last_run, now) {
            report.log("[auto-update] Throttled, skipping update.");
            debug!(last_run = ?state.last_run, "throttled");
            return Ok(RunOutcome::Throttled);
        }

        // Recorded before any work so a crash mid-run still counts as a run.
        let state = ThrottleState {
            last_run: Some(now),
            ..state
        };
        throttle.write(&state).await?;

        let Some(mut config) = HostConfig::load(&self.ctx.config_path).await else {
            report.log("[auto-update] No config found, skipping.");
            return Ok(RunOutcome::NoConfig);
        };

        if config.migrate_legacy_key() {
            config.save().await?;
            report.log("[auto-update] Migrated legacy \"plugins\" key to \"plugin\".");
            info!(path = %config.path().display(), "migrated legacy plugins key");
        }

        let plugins = match config.plugin_specs() {
            Some(plugins) if !plugins.is_empty() => plugins,
            _ => {
                report.log("[auto-update] No plugins found to update.");
                return Ok(RunOutcome::NoPlugins);
            },
        };

        fs::create_dir_all(&self.ctx.config_dir)
            .await
            .with_context(|| format!("failed to create {}", self.ctx.config_dir.display()))?;

        let manager = PackageManager::detect(self.runner.as_ref()).await;
        report.log(format!(
            "[auto-update] Starting update of {} plugin(s) with {manager}",
            plugins.len()
        ));
        info!(
            plugin_count = plugins.len(),
            %manager,
            preserve_pinned = self.ctx.preserve_pinned,
            ignore_throttle = self.ctx.ignore_throttle,
            "starting plugin update"
        );

        let result = self.update_plugins(&plugins, manager, report).await;

        if result.changed {
            config.set_plugin_specs(&result.plugins);
            config.save().await?;
            report.log("[auto-update] Config updated.");
        }

        if let Some(program) = &self.ctx.extension_updater {
            self.update_extensions(program, report).await;
        }

        throttle
            .write(&ThrottleState {
                last_run: Some(now),
                last_success: Some(now_ms()),
            })
            .await?;

        report.log("[auto-update] Update complete.");
        info!(updated = result.updated.len(), "plugin update complete");
        Ok(RunOutcome::Completed(result))
    }

    /// Upgrade each registry entry in order. A failed entry is kept as is.
    pub async fn update_plugins(
        &self,
        plugins: &[String],
        manager: PackageManager,
        report: &mut RunReport,
    ) -> UpdateResult {
        let mut result = UpdateResult {
            plugins: Vec::with_capacity(plugins.len()),
            ..Default::default()
        };

        for entry in plugins {
            if !spec::is_registry(entry) {
                report.log(format!("[auto-update] Skipping non-registry plugin: {entry}"));
                result.plugins.push(entry.clone());
                continue;
            }

            let parsed = PluginSpec::parse(entry);
            if self.ctx.preserve_pinned && parsed.is_pinned() {
                report.log(format!("[auto-update] Preserving pinned plugin: {entry}"));
                result.plugins.push(entry.clone());
                continue;
            }

            report.log(format!("[auto-update] Updating plugin: {}", parsed.name));
            match manager
                .install_latest(self.runner.as_ref(), &parsed.name, &self.ctx.config_dir)
                .await
            {
                Ok(version) => {
                    let next = parsed.with_version(&version);
                    report.log(format!("[auto-update] Installed: {next}"));
                    if next != *entry {
                        result.changed = true;
                        result.updated.push(parsed.name.clone());
                    }
                    result.plugins.push(next);
                },
                Err(e) => {
                    warn!(plugin = %parsed.name, error = %e, "plugin update failed");
                    report.error(format!("[auto-update] {e}"));
                    result.plugins.push(entry.clone());
                },
            }
        }

        result
    }

    async fn update_extensions(&self, program: &str, report: &mut RunReport) {
        match package_manager::update_extensions(self.runner.as_ref(), program).await {
            Ok(_) => report.log(format!("[auto-update] Extensions updated with {program}.")),
            Err(e) => {
                warn!(program, error = %e, "extension update failed");
                report.error(format!("[auto-update] {e}"));
            },
        }
    }

    async fn record_history(&self, outcome: &RunOutcome, report: &RunReport, started: Instant) {
        let (updated, success) = match outcome {
            RunOutcome::Completed(result) => (result.updated.as_slice(), true),
            _ => (&[][..], false),
        };
        let entry = HistoryEntry::new(updated, &report.errors, started.elapsed(), success);
        let log = HistoryLog::new(&self.ctx.history_path);
        if let Err(e) = log.append(entry).await {
            warn!(path = %log.path().display(), error = %e, "failed to record update history");
        }
    }
}
