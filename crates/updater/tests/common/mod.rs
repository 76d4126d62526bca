//! Scripted stand-in for the package manager and extension updater.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    autoupdate_updater::{
        package_manager::installed_manifest_path,
        runner::{CommandOutput, CommandRunner},
    },
};

#[derive(Default)]
pub struct ScriptedRunner {
    /// Programs that answer `--version`.
    pub available: HashSet<String>,
    /// Version "published" for each package name.
    pub latest: HashMap<String, String>,
    /// Packages whose install fails.
    pub broken: HashSet<String>,
    /// Packages that install but leave no readable manifest.
    pub no_manifest: HashSet<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.available.insert(program.to_string());
        self
    }

    pub fn publish(mut self, name: &str, version: &str) -> Self {
        self.latest.insert(name.to_string(), version.to_string());
        self
    }

    pub fn broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    pub fn without_manifest(mut self, name: &str) -> Self {
        self.no_manifest.insert(name.to_string());
        self
    }

    /// Every invocation as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Package names passed to an install command.
    pub fn installs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|call| matches!(call[1].as_str(), "add" | "install"))
            .map(|call| call[2].trim_end_matches("@latest").to_string())
            .collect()
    }

    fn install(&self, target: &str, dir: &Path) -> CommandOutput {
        let name = target.trim_end_matches("@latest");
        if self.broken.contains(name) {
            return failure(&format!("404 Not Found - {name}"));
        }
        if !self.no_manifest.contains(name) {
            let version = self.latest.get(name).cloned().unwrap_or_else(|| "0.0.1".into());
            let manifest = installed_manifest_path(name, dir);
            std::fs::create_dir_all(manifest.parent().unwrap()).unwrap();
            std::fs::write(
                &manifest,
                format!(r#"{{"name":"{name}","version":"{version}"}}"#),
            )
            .unwrap();
        }
        CommandOutput::default()
    }
}

fn failure(message: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: message.to_string(),
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        if !self.available.contains(program) {
            return failure(&format!("spawn {program} ENOENT"));
        }
        match (program, args.first().map(String::as_str)) {
            (_, Some("--version")) => CommandOutput {
                exit_code: 0,
                stdout: "1.0.0\n".into(),
                stderr: String::new(),
            },
            ("bun", Some("add")) => self.install(&args[1], &PathBuf::from(&args[3])),
            ("npm", Some("install")) => self.install(&args[1], &PathBuf::from(&args[3])),
            (_, Some("update")) => CommandOutput::default(),
            _ => failure("unexpected command"),
        }
    }
}
