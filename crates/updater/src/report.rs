//! Run reporting: collected log lines, the verbose multi-line message and
//! the one-line toast summary delivered to the host.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::Mutex, tracing::info};

pub const MAX_LOG_LINES: usize = 40;
pub const MAX_ERROR_LINES: usize = 10;
pub const SUMMARY_MAX_LINES: usize = 4;
pub const SUMMARY_MAX_CHARS: usize = 240;
pub const NOTIFICATION_TITLE: &str = "Auto-update";

/// Log and error lines collected during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    /// Also emit each log line through `tracing` at info level.
    echo: bool,
}

impl RunReport {
    pub fn echoing(echo: bool) -> Self {
        Self {
            echo,
            ..Default::default()
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.echo {
            info!("{line}");
        }
        self.logs.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        self.errors.push(line.into());
    }

    pub fn message(&self) -> String {
        format_update_message(&self.logs, &self.errors)
    }
}

pub fn format_update_message(logs: &[String], errors: &[String]) -> String {
    let mut lines = vec!["Auto-update logs".to_string(), String::new()];
    if logs.is_empty() {
        lines.push("No update output recorded.".to_string());
    } else {
        lines.extend(limit_lines(logs, MAX_LOG_LINES));
    }

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        lines.extend(limit_lines(errors, MAX_ERROR_LINES));
    }

    lines.join("\n")
}

fn limit_lines(lines: &[String], max: usize) -> Vec<String> {
    if lines.len() <= max {
        return lines.to_vec();
    }
    let mut limited = lines[..max].to_vec();
    limited.push(format!("... ({} more lines)", lines.len() - max));
    limited
}

/// First non-blank lines joined with ` | `, capped at [`SUMMARY_MAX_CHARS`].
pub fn summarize_message(message: &str) -> String {
    let summary = message
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SUMMARY_MAX_LINES)
        .collect::<Vec<_>>()
        .join(" | ");

    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let head: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastVariant {
    Info,
    Success,
    Warning,
    Error,
}

/// Host capability for showing a toast.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        variant: ToastVariant,
    ) -> anyhow::Result<()>;
}

/// Delivers run messages to the host, skipping repeats of the last summary.
/// Whether a sink exists is fixed at construction.
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    last_summary: Mutex<Option<String>>,
}

impl Notifier {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self {
            sink,
            last_summary: Mutex::new(None),
        }
    }

    /// A notifier with no toast sink; messages only reach the log.
    pub fn console() -> Self {
        Self::new(None)
    }

    /// Returns whether anything was delivered.
    pub async fn notify_user(&self, message: &str, variant: ToastVariant) -> anyhow::Result<bool> {
        let summary = summarize_message(message);
        {
            let mut last = self.last_summary.lock().await;
            if last.as_deref() == Some(summary.as_str()) {
                return Ok(false);
            }
            *last = Some(summary.clone());
        }

        if let Some(sink) = &self.sink {
            sink.notify(NOTIFICATION_TITLE, &summary, variant).await?;
        }
        info!("{message}");
        Ok(true)
    }
}
