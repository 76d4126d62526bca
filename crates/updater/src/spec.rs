//! Plugin reference parsing and classification.
//!
//! Entries of the host `plugin` array are either registry references
//! (`name`, `name@1.2.3`, `@scope/name@1.2.3`) that can be upgraded by the
//! package manager, or anything else (paths, URLs, VCS and workspace
//! references) which the updater leaves alone.

const NON_REGISTRY_SCHEMES: &[&str] = &[
    "file:",
    "git+",
    "git:",
    "ssh://",
    "http://",
    "https://",
    "github:",
    "workspace:",
];

const NON_REGISTRY_PREFIXES: &[&str] = &["./", "../", "/", "~"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    Registry,
    NonRegistry,
}

pub fn classify(spec: &str) -> SpecKind {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return SpecKind::NonRegistry;
    }

    let lower = trimmed.to_ascii_lowercase();
    let non_registry = NON_REGISTRY_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        || NON_REGISTRY_PREFIXES
            .iter()
            .any(|prefix| trimmed.starts_with(prefix));

    if non_registry {
        SpecKind::NonRegistry
    } else {
        SpecKind::Registry
    }
}

pub fn is_registry(spec: &str) -> bool {
    classify(spec) == SpecKind::Registry
}

/// A registry reference split into package name and optional version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    /// Package name, including the `@scope/` prefix for scoped packages.
    pub name: String,
    pub version: Option<String>,
}

impl PluginSpec {
    /// Scoped names split at the second `@` (the first one opens the scope);
    /// unscoped names split at the last `@` past index 0. An empty suffix
    /// means no version.
    pub fn parse(spec: &str) -> Self {
        let split_at = if spec.starts_with('@') {
            spec[1..].find('@').map(|i| i + 1)
        } else {
            spec.rfind('@').filter(|&i| i > 0)
        };

        match split_at {
            Some(at) => {
                let version = &spec[at + 1..];
                Self {
                    name: spec[..at].to_string(),
                    version: (!version.is_empty()).then(|| version.to_string()),
                }
            },
            None => Self {
                name: spec.to_string(),
                version: None,
            },
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.version.is_some()
    }

    /// Reference to `version` of this package, e.g. `@scope/pkg@1.2.0`.
    pub fn with_version(&self, version: &str) -> String {
        format!("{}@{version}", self.name)
    }
}

impl std::fmt::Display for PluginSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{version}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
