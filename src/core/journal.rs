//! Append-only JSONL journal of pipeline operations.
//!
//! One line per authorize/execute/challenge/narrative/save step. Credentials
//! never reach this file: challenge entries record only the challenge kind
//! and the verdict.

use crate::core::error::ShellError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

pub const JOURNAL_FILE_NAME: &str = "shell.events.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Unix seconds with a `Z` suffix, e.g. `1771220592Z`.
pub fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}Z")
}

impl JournalEvent {
    fn new(actor: &str, op: &str, status: &str, detail: Option<&str>) -> Self {
        Self {
            ts: timestamp(),
            event_id: Ulid::new().to_string(),
            actor: actor.to_string(),
            op: op.to_string(),
            status: status.to_string(),
            detail: detail.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: Option<PathBuf>,
}

impl Journal {
    pub fn at(root: &Path) -> Self {
        Self {
            path: Some(root.join(JOURNAL_FILE_NAME)),
        }
    }

    /// Journal that drops every event.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(
        &self,
        actor: &str,
        op: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), ShellError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let ev = JournalEvent::new(actor, op, status, detail);
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }

    /// Records and swallows write failures; the command being journaled
    /// still completes.
    pub fn note(&self, actor: &str, op: &str, status: &str, detail: Option<&str>) {
        if let Err(e) = self.record(actor, op, status, detail) {
            eprintln!("warning: journal write failed: {e}");
        }
    }

    pub fn read_all(&self) -> Result<Vec<JournalEvent>, ShellError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        let mut out = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }
}
