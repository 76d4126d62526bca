#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end update runs against a temporary config directory, with the
//! package manager replaced by [`common::ScriptedRunner`].

mod common;

use std::{path::Path, sync::Arc, time::Duration};

use {
    autoupdate_config::{ThrottlePolicy, UpdateContext},
    autoupdate_updater::{
        RunOutcome, Updater,
        history::HistoryLog,
        lock::{LockData, LockManager, STALE_LOCK_AGE},
        throttle::ThrottleStore,
    },
    common::ScriptedRunner,
    serde_json::{Value, json},
};

fn write_config(dir: &Path, value: Value) {
    std::fs::write(
        dir.join("opencode.json"),
        serde_json::to_string_pretty(&value).unwrap(),
    )
    .unwrap();
}

fn read_config(dir: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join("opencode.json")).unwrap()).unwrap()
}

fn updater(ctx: UpdateContext, runner: &Arc<ScriptedRunner>) -> Updater {
    Updater::with_runner(ctx, runner.clone())
}

fn npm_with(name: &str, version: &str) -> Arc<ScriptedRunner> {
    Arc::new(ScriptedRunner::new().with_program("npm").publish(name, version))
}

#[tokio::test]
async fn upgrades_registry_plugin_and_records_history() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["my-plugin@1.0.0"] }));
    let runner = npm_with("my-plugin", "1.2.0");

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    let RunOutcome::Completed(result) = summary.outcome else {
        panic!("unexpected outcome: {:?}", summary.outcome);
    };
    assert!(result.changed);
    assert_eq!(result.plugins, vec!["my-plugin@1.2.0"]);
    assert_eq!(read_config(tmp.path()), json!({ "plugin": ["my-plugin@1.2.0"] }));
    assert!(summary.report.errors.is_empty());

    let history = HistoryLog::new(&tmp.path().join(".auto-update-history.json"))
        .read()
        .await;
    assert_eq!(history.entries.len(), 1);
    assert_eq!(history.entries[0].plugins_updated, vec!["my-plugin"]);
    assert!(history.entries[0].success);

    let state = ThrottleStore::at(tmp.path(), &tmp.path().join(".auto-update.json"))
        .read()
        .await;
    assert!(state.last_run.is_some());
    assert!(state.last_success >= state.last_run);

    // Lock released.
    assert!(!tmp.path().join(".auto-update.lock").exists());
    assert_eq!(
        runner.calls()[1],
        vec![
            "npm".to_string(),
            "install".into(),
            "my-plugin@latest".into(),
            "--prefix".into(),
            tmp.path().display().to_string(),
            "--no-save".into(),
        ]
    );
}

#[tokio::test]
async fn preserves_pinned_versions_when_requested() {
    let tmp = tempfile::tempdir().unwrap();
    let original = json!({ "plugin": ["my-plugin@1.0.0"] });
    write_config(tmp.path(), original.clone());
    let before = std::fs::read_to_string(tmp.path().join("opencode.json")).unwrap();
    let runner = npm_with("my-plugin", "1.2.0");

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.preserve_pinned = true;
    let summary = updater(ctx, &runner).run().await;

    let RunOutcome::Completed(result) = summary.outcome else {
        panic!("unexpected outcome: {:?}", summary.outcome);
    };
    assert!(!result.changed);
    assert!(runner.installs().is_empty());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("opencode.json")).unwrap(),
        before
    );
}

#[tokio::test]
async fn unpinned_plugins_still_update_with_preserve_pinned() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["pinned@1.0.0", "floating"] }));
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_program("npm")
            .publish("pinned", "2.0.0")
            .publish("floating", "0.4.0"),
    );

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.preserve_pinned = true;
    updater(ctx, &runner).run().await;

    assert_eq!(runner.installs(), vec!["floating"]);
    assert_eq!(
        read_config(tmp.path())["plugin"],
        json!(["pinned@1.0.0", "floating@0.4.0"])
    );
}

#[tokio::test]
async fn non_registry_plugins_are_never_installed() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins = json!([
        "file:../local",
        "git+https://github.com/acme/p.git",
        "github:acme/p",
        "https://example.com/p.tgz",
        "workspace:*",
        "./p",
        "../p",
        "/abs/p",
        "~/p",
        ""
    ]);
    write_config(tmp.path(), json!({ "plugin": plugins.clone() }));
    let runner = Arc::new(ScriptedRunner::new().with_program("npm"));

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed(ref r) if !r.changed));
    assert!(runner.installs().is_empty());
    assert_eq!(read_config(tmp.path())["plugin"], plugins);
}

#[tokio::test]
async fn second_run_within_interval_is_throttled() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["my-plugin@1.0.0"] }));
    let runner = npm_with("my-plugin", "1.2.0");

    let first = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;
    assert!(matches!(first.outcome, RunOutcome::Completed(_)));
    let calls_after_first = runner.calls().len();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert_eq!(second.outcome, RunOutcome::Throttled);
    assert_eq!(runner.calls().len(), calls_after_first);
    let history = HistoryLog::new(&tmp.path().join(".auto-update-history.json"))
        .read()
        .await;
    assert_eq!(history.entries.len(), 1, "skips are not recorded");
    assert!(!tmp.path().join(".auto-update.lock").exists());
}

#[tokio::test]
async fn ignore_throttle_and_zero_interval_bypass_the_gate() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a"] }));
    let runner = npm_with("a", "1.0.0");

    updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.ignore_throttle = true;
    let forced = updater(ctx, &runner).run().await;
    assert!(matches!(forced.outcome, RunOutcome::Completed(_)));

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.throttle = ThrottlePolicy::from_hours(0.0);
    let unthrottled = updater(ctx, &runner).run().await;
    assert!(matches!(unthrottled.outcome, RunOutcome::Completed(_)));

    assert_eq!(runner.installs().len(), 3);
}

#[tokio::test]
async fn held_lock_skips_run() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    let lock = LockManager::at(tmp.path(), &tmp.path().join(".auto-update.lock"));
    assert!(lock.acquire(false).await);
    let runner = npm_with("a", "2.0.0");

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert_eq!(summary.outcome, RunOutcome::LockHeld);
    assert!(runner.calls().is_empty());
    assert!(tmp.path().join(".auto-update.lock").exists());
    assert_eq!(read_config(tmp.path())["plugin"], json!(["a@1.0.0"]));
}

#[tokio::test]
async fn stale_lock_is_reclaimed() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    let stale = LockData {
        pid: 999_999,
        timestamp: autoupdate_updater::now_ms() - STALE_LOCK_AGE.as_millis() as i64 - 1_000,
        hostname: "elsewhere".into(),
    };
    std::fs::write(
        tmp.path().join(".auto-update.lock"),
        serde_json::to_string(&stale).unwrap(),
    )
    .unwrap();
    let runner = npm_with("a", "2.0.0");

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.reclaim_stale_lock = false;
    let refused = updater(ctx, &runner).run().await;
    assert_eq!(refused.outcome, RunOutcome::LockHeld);

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;
    assert!(matches!(summary.outcome, RunOutcome::Completed(_)));
    assert_eq!(read_config(tmp.path())["plugin"], json!(["a@2.0.0"]));
    assert!(!tmp.path().join(".auto-update.lock").exists());
}

#[tokio::test]
async fn disabled_run_touches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("config");
    let runner = npm_with("a", "2.0.0");

    let mut ctx = UpdateContext::for_dir(&dir);
    ctx.disabled = true;
    let summary = updater(ctx, &runner).run().await;

    assert_eq!(summary.outcome, RunOutcome::Disabled);
    assert!(!dir.exists());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn legacy_plugins_key_is_migrated_before_updating() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(
        tmp.path(),
        json!({ "theme": "dark", "plugin": ["a"], "plugins": ["a", "b"] }),
    );
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_program("npm")
            .publish("a", "1.0.0")
            .publish("b", "2.0.0"),
    );

    updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert_eq!(runner.installs(), vec!["a", "b"]);
    assert_eq!(
        read_config(tmp.path()),
        json!({ "theme": "dark", "plugin": ["a@1.0.0", "b@2.0.0"] })
    );
}

#[tokio::test]
async fn migration_is_persisted_even_without_upgrades() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugins": ["./local", "./local"] }));
    let runner = Arc::new(ScriptedRunner::new().with_program("npm"));

    updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert_eq!(read_config(tmp.path()), json!({ "plugin": ["./local"] }));
}

#[tokio::test]
async fn failed_install_keeps_entry_and_continues() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(
        tmp.path(),
        json!({ "plugin": ["broken@1.0.0", "ghost", "good@1.0.0"] }),
    );
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_program("npm")
            .broken("broken")
            .without_manifest("ghost")
            .publish("good", "1.1.0"),
    );

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    let RunOutcome::Completed(result) = summary.outcome else {
        panic!("unexpected outcome: {:?}", summary.outcome);
    };
    assert_eq!(result.plugins, vec!["broken@1.0.0", "ghost", "good@1.1.0"]);
    assert_eq!(result.updated, vec!["good"]);
    assert_eq!(summary.report.errors.len(), 2);
    assert!(summary.report.errors[0].contains("404 Not Found - broken"));
    assert!(summary.report.errors[1].contains("ghost"));

    let history = HistoryLog::new(&tmp.path().join(".auto-update-history.json"))
        .read()
        .await;
    assert!(history.entries[0].success);
    assert_eq!(history.entries[0].errors.len(), 2);
}

#[tokio::test]
async fn bun_is_preferred_when_available() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["@scope/p@0.1.0"] }));
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_program("bun")
            .with_program("npm")
            .publish("@scope/p", "0.2.0"),
    );

    updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    let calls = runner.calls();
    assert_eq!(calls[0], vec!["bun", "--version"]);
    assert_eq!(calls[1][..3], ["bun", "add", "@scope/p@latest"]);
    assert!(calls.iter().all(|call| call[0] != "npm"));
    assert_eq!(read_config(tmp.path())["plugin"], json!(["@scope/p@0.2.0"]));
}

#[tokio::test]
async fn extension_updater_failure_is_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    let runner = npm_with("a", "1.5.0");

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.extension_updater = Some("ocx".into());
    let summary = updater(ctx, &runner).run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed(ref r) if r.changed));
    assert!(summary.report.errors[0].contains("ocx"));
    let state = ThrottleStore::at(tmp.path(), &tmp.path().join(".auto-update.json"))
        .read()
        .await;
    assert!(state.last_success.is_some());
}

#[tokio::test]
async fn extension_updater_runs_update_when_present() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["./local"] }));
    let runner = Arc::new(ScriptedRunner::new().with_program("npm").with_program("ocx"));

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.extension_updater = Some("ocx".into());
    let summary = updater(ctx, &runner).run().await;

    assert!(summary.report.errors.is_empty());
    assert!(runner.calls().contains(&vec!["ocx".to_string(), "update".to_string()]));
}

#[tokio::test]
async fn missing_config_and_empty_plugin_list_are_skips() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().with_program("npm"));

    let mut ctx = UpdateContext::for_dir(tmp.path());
    ctx.ignore_throttle = true;
    let summary = updater(ctx.clone(), &runner).run().await;
    assert_eq!(summary.outcome, RunOutcome::NoConfig);

    write_config(tmp.path(), json!({ "plugin": [] }));
    let summary = updater(ctx, &runner).run().await;
    assert_eq!(summary.outcome, RunOutcome::NoPlugins);

    assert!(runner.calls().is_empty());
    assert!(!tmp.path().join(".auto-update-history.json").exists());
    let state = ThrottleStore::at(tmp.path(), &tmp.path().join(".auto-update.json"))
        .read()
        .await;
    assert!(state.last_run.is_some());
    assert!(state.last_success.is_none());
}

#[tokio::test]
async fn run_level_failure_releases_lock_and_records_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    // A directory where the throttle file should be makes its write fail.
    std::fs::create_dir(tmp.path().join(".auto-update.json")).unwrap();
    let runner = npm_with("a", "2.0.0");

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;

    assert!(matches!(summary.outcome, RunOutcome::Failed(_)));
    assert_eq!(summary.report.errors.len(), 1);
    assert!(!tmp.path().join(".auto-update.lock").exists());
    let history = HistoryLog::new(&tmp.path().join(".auto-update-history.json"))
        .read()
        .await;
    assert_eq!(history.entries.len(), 1);
    assert!(!history.entries[0].success);
    assert_eq!(read_config(tmp.path())["plugin"], json!(["a@1.0.0"]));
}

struct HangingRunner;

#[async_trait::async_trait]
impl autoupdate_updater::runner::CommandRunner for HangingRunner {
    async fn run(
        &self,
        _program: &str,
        _args: &[String],
    ) -> autoupdate_updater::runner::CommandOutput {
        std::future::pending().await
    }
}

#[tokio::test]
async fn abandoned_run_releases_lock() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    let updater = Updater::with_runner(UpdateContext::for_dir(tmp.path()), Arc::new(HangingRunner));

    let run = tokio::time::timeout(Duration::from_millis(200), updater.run()).await;

    assert!(run.is_err(), "run should still be waiting on the package manager");
    assert!(!tmp.path().join(".auto-update.lock").exists());
    assert_eq!(read_config(tmp.path())["plugin"], json!(["a@1.0.0"]));
}

#[tokio::test]
async fn report_message_summarizes_run() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), json!({ "plugin": ["a@1.0.0"] }));
    let runner = npm_with("a", "2.0.0");

    let summary = updater(UpdateContext::for_dir(tmp.path()), &runner).run().await;
    let message = summary.report.message();

    assert!(message.starts_with("Auto-update logs\n\n"));
    assert!(message.contains("[auto-update] Installed: a@2.0.0"));
    assert!(!message.contains("Errors:"));
}
