//! Append-only command audit log.
//!
//! One event per command invocation and per deferred-broadcast outcome,
//! written as JSON lines or a readable plain-text block.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::Result;

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn command(user_id: u64, username: &str, command: &str, detail: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "command".to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            command: Some(command.to_string()),
            detail: Some(detail.to_string()),
            error: None,
        }
    }

    pub fn reminder(event: &str, detail: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: None,
            username: None,
            command: None,
            detail: Some(detail.to_string()),
            error: None,
        }
    }

    pub fn error(user_id: u64, username: &str, command: &str, error: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "error".to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            command: Some(command.to_string()),
            detail: None,
            error: Some(error.to_string()),
        }
    }
}

/// Best-effort audit sink. A `None` path disables logging entirely.
#[derive(Clone, Debug, Default)]
pub struct AuditLogger {
    path: Option<PathBuf>,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: Option<PathBuf>, json: bool) -> Self {
        Self { path, json }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write an event; failures are logged, never surfaced to the requester.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(%e, "failed to write audit event");
        }
    }

    fn write(&self, mut event: AuditEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(s) = &event.detail {
            event.detail = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push_str(&format!("[{}] {}", event.timestamp, event.event));
        if let (Some(id), Some(name)) = (event.user_id, &event.username) {
            out.push_str(&format!(" user={name}({id})"));
        }
        if let Some(cmd) = &event.command {
            out.push_str(&format!(" command={cmd}"));
        }
        if let Some(detail) = &event.detail {
            out.push_str(&format!(" detail={detail}"));
        }
        if let Some(err) = &event.error {
            out.push_str(&format!(" error={err}"));
        }
        out.push('\n');
        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

fn truncate_text(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
