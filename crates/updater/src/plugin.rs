//! Host integration: the plugin descriptor the host loads.
//!
//! The host triggers at most one update per process. A run starts either
//! from a short startup timer or from the host's config hook, whichever
//! comes first; later triggers are ignored. The guard lives on the plugin
//! instance rather than in process-wide state.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    tokio::task::JoinHandle,
    tracing::{debug, error},
};

use autoupdate_config::{LocalSettings, UpdateOptions, env, paths};

use crate::{
    report::Notifier,
    runner::{CommandRunner, ProcessRunner},
    update::{RunSummary, Updater},
};

pub const PLUGIN_NAME: &str = "opencode-plugin-auto-update";
pub const STARTUP_DELAY: Duration = Duration::from_millis(1500);

pub struct AutoUpdatePlugin {
    options: UpdateOptions,
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<Notifier>,
    started: AtomicBool,
    startup_timer: Mutex<Option<JoinHandle<()>>>,
    run_task: Mutex<Option<JoinHandle<RunSummary>>>,
}

impl AutoUpdatePlugin {
    /// Build the plugin, folding in the local settings file and environment.
    pub fn new(options: UpdateOptions, notifier: Notifier) -> Arc<Self> {
        Self::with_runner(options, notifier, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        options: UpdateOptions,
        notifier: Notifier,
        runner: Arc<dyn CommandRunner>,
    ) -> Arc<Self> {
        let settings = LocalSettings::load(&paths::settings_path(&options.config_dir()));
        let options = options.with_local_settings(&settings, &env::process_env);
        Arc::new(Self {
            options,
            runner,
            notifier: Arc::new(notifier),
            started: AtomicBool::new(false),
            startup_timer: Mutex::new(None),
            run_task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the update after `delay` unless something else starts it first.
    pub fn schedule_startup(self: &Arc<Self>, delay: Duration) {
        let plugin = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("startup timer fired");
            plugin.start();
        });
        if let Some(previous) = lock(&self.startup_timer).replace(handle) {
            previous.abort();
        }
    }

    /// Config hook: cancel the pending startup timer and start now.
    pub fn on_config(self: &Arc<Self>, log_level: Option<&str>) {
        debug!(log_level = log_level.unwrap_or("unset"), "config hook invoked");
        if let Some(timer) = lock(&self.startup_timer).take() {
            timer.abort();
        }
        self.start();
    }

    /// Launch the single background run. Returns `false` if one was already
    /// started.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let ctx = self.options.clone().resolve();
        debug!(
            ignore_throttle = ctx.ignore_throttle,
            verbose = ctx.debug,
            "starting auto-update"
        );
        let updater = Updater::with_runner(ctx, Arc::clone(&self.runner));
        let notifier = Arc::clone(&self.notifier);

        let handle = tokio::spawn(async move {
            let summary = updater.run().await;
            debug!(
                logs = summary.report.logs.len(),
                errors = summary.report.errors.len(),
                "update finished"
            );
            let variant = summary.toast_variant();
            if let Err(e) = notifier
                .notify_user(&summary.report.message(), variant)
                .await
            {
                error!(error = %e, "failed to notify user");
            }
            summary
        });
        *lock(&self.run_task) = Some(handle);
        true
    }

    /// Wait for the background run, if one was started and not yet awaited.
    pub async fn wait(&self) -> Option<RunSummary> {
        let handle = lock(&self.run_task).take()?;
        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "update task did not complete");
                None
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
