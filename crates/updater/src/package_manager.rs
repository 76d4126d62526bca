//! Driving the external package manager and the extension updater.
//!
//! `bun` is preferred when it answers `--version`; `npm` is the fallback.
//! Both install into the host configuration directory, and the installed
//! version is read back from `node_modules/<name>/package.json`.

use std::path::{Path, PathBuf};

use {serde::Deserialize, tokio::fs, tracing::debug};

use crate::{
    error::UpdateError,
    runner::{CommandOutput, CommandRunner},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Bun,
    Npm,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Bun => "bun",
            Self::Npm => "npm",
        }
    }

    /// Arguments installing the latest release of `name` into `dir`.
    pub fn install_args(&self, name: &str, dir: &Path) -> Vec<String> {
        let target = format!("{name}@latest");
        let dir = dir.display().to_string();
        match self {
            Self::Bun => vec!["add".into(), target, "--cwd".into(), dir],
            Self::Npm => vec![
                "install".into(),
                target,
                "--prefix".into(),
                dir,
                "--no-save".into(),
            ],
        }
    }

    pub async fn detect(runner: &dyn CommandRunner) -> Self {
        if command_exists(runner, Self::Bun.program()).await {
            Self::Bun
        } else {
            Self::Npm
        }
    }

    /// Install the latest `name` into `dir` and return the installed version.
    pub async fn install_latest(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
        dir: &Path,
    ) -> Result<String, UpdateError> {
        let output = runner
            .run(self.program(), &self.install_args(name, dir))
            .await;
        if !output.success() {
            return Err(UpdateError::InstallFailed {
                name: name.to_string(),
                manager: self.program(),
                message: output.diagnostic().to_string(),
            });
        }

        read_installed_version(name, dir)
            .await
            .ok_or_else(|| UpdateError::VersionUnreadable {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

/// Probe for `program` by asking for its version.
pub async fn command_exists(runner: &dyn CommandRunner, program: &str) -> bool {
    let exists = runner.run(program, &["--version".into()]).await.success();
    debug!(program, exists, "probed command");
    exists
}

/// `<dir>/node_modules/<name>/package.json`, with scoped names nested one
/// directory per segment.
pub fn installed_manifest_path(name: &str, dir: &Path) -> PathBuf {
    let mut path = dir.join("node_modules");
    path.extend(name.split('/'));
    path.join("package.json")
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

pub async fn read_installed_version(name: &str, dir: &Path) -> Option<String> {
    let path = installed_manifest_path(name, dir);
    let raw = fs::read_to_string(&path).await.ok()?;
    let manifest: PackageManifest = serde_json::from_str(&raw).ok()?;
    manifest.version.filter(|v| !v.is_empty())
}

/// Run the companion extension updater's `update` subcommand after probing
/// that it exists.
pub async fn update_extensions(
    runner: &dyn CommandRunner,
    program: &str,
) -> Result<CommandOutput, UpdateError> {
    if !command_exists(runner, program).await {
        return Err(UpdateError::ExtensionUpdaterUnavailable {
            program: program.to_string(),
        });
    }

    let output = runner.run(program, &["update".into()]).await;
    if output.success() {
        Ok(output)
    } else {
        Err(UpdateError::ExtensionUpdateFailed {
            program: program.to_string(),
            message: output.diagnostic().to_string(),
        })
    }
}
