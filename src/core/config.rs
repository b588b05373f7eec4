//! Shell configuration loaded from `breachdb.toml` in the save root.
//!
//! Every field has a default, and a missing file is not an error.

use crate::core::error::ShellError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "breachdb.toml";

/// What happens to a command submitted while a challenge is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Refuse the new command until the challenge is answered or cancelled.
    #[default]
    Reject,
    /// Drop the pending challenge, warn, and handle the new command.
    Supersede,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Seconds between autosaves; 0 disables autosave.
    pub autosave_secs: u64,
    /// Write `shell.events.jsonl` next to the save.
    pub journal: bool,
    pub pending_policy: PendingPolicy,
    /// Identity used when a new game starts without `--name`.
    pub player: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            autosave_secs: 60,
            journal: true,
            pending_policy: PendingPolicy::Reject,
            player: None,
        }
    }
}

pub fn load_config(root: &Path) -> Result<ShellConfig, ShellError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(ShellConfig::default());
    }
    let content = fs::read_to_string(&config_path).map_err(ShellError::IoError)?;
    toml::from_str(&content).map_err(|e| {
        ShellError::ConfigError(format!("{}: {}", config_path.display(), e))
    })
}
