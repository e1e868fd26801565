//! Structured alerts for action failures.
//!
//! The runner never retries on its own; it reports the failure through
//! `AlertSink` and the caller decides whether to surface it to the end user
//! or resubmit `content` as a corrective follow-up message.

use serde::{Deserialize, Serialize};

use crate::actions::ActionKind;

/// Which action category produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    File,
    Shell,
    Build,
    Start,
    Supabase,
}

impl From<&ActionKind> for AlertSource {
    fn from(kind: &ActionKind) -> Self {
        match kind {
            ActionKind::File { .. } => AlertSource::File,
            ActionKind::Shell => AlertSource::Shell,
            ActionKind::Build => AlertSource::Build,
            ActionKind::Start => AlertSource::Start,
            ActionKind::Supabase { .. } => AlertSource::Supabase,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAlert {
    pub title: String,
    pub description: String,
    /// The failed action's content, so the caller can resubmit it as a
    /// corrective follow-up message.
    pub content: String,
    pub source: AlertSource,
}

impl ActionAlert {
    pub fn new(kind: &ActionKind, description: String, content: String) -> Self {
        let title = match AlertSource::from(kind) {
            AlertSource::File => "File write failed",
            AlertSource::Shell => "Shell command failed",
            AlertSource::Build => "Build failed",
            AlertSource::Start => "Dev server failed to start",
            AlertSource::Supabase => "Database operation failed",
        };

        Self {
            title: title.to_string(),
            description,
            content,
            source: AlertSource::from(kind),
        }
    }
}

/// Receiver for action failure alerts.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: &ActionAlert);
}

/// A sink that drops every alert.
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn on_alert(&self, _alert: &ActionAlert) {}
}
