//! Environment variable names and parsing helpers.

pub const DISABLED: &str = "OPENCODE_AUTO_UPDATE_DISABLED";
pub const DEBUG: &str = "OPENCODE_AUTO_UPDATE_DEBUG";
pub const BYPASS_THROTTLE: &str = "OPENCODE_AUTO_UPDATE_BYPASS_THROTTLE";
pub const INTERVAL_HOURS: &str = "OPENCODE_AUTO_UPDATE_INTERVAL_HOURS";
pub const PINNED: &str = "OPENCODE_AUTO_UPDATE_PINNED";

/// Source of environment values. Production code passes
/// [`process_env`]; tests pass a closure over a fixed map.
pub trait EnvLookup {
    fn get(&self, name: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Lookup backed by the real process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Lookup that sees an empty environment.
pub fn no_env(_name: &str) -> Option<String> {
    None
}

/// A flag is set only when its value is `true`, compared case-insensitively.
pub fn flag(env: &impl EnvLookup, name: &str) -> bool {
    env.get(name)
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

/// Parse a numeric variable, falling back when it is missing, empty,
/// unparseable or not finite.
pub fn number(env: &impl EnvLookup, name: &str, fallback: f64) -> f64 {
    let Some(raw) = env.get(name) else {
        return fallback;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return fallback;
    }
    match raw.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => fallback,
    }
}
