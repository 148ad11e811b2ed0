//! Settings types. Every section is `#[serde(default)]` so a partial file
//! only overrides what it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoSettings {
    pub store: StoreSettings,
    pub sync: SyncSettings,
    pub model: ModelSettings,
    pub facts: FactSettings,
    pub logging: LoggingSettings,
}

impl MemoSettings {
    /// Reject values the rest of the program cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.store.db_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue("store.db_path is empty".into()));
        }
        if self.sync.snapshot_file.trim().is_empty() {
            return Err(SettingsError::InvalidValue("sync.snapshot_file is empty".into()));
        }
        if self.sync.timeout_secs == 0 {
            return Err(SettingsError::InvalidValue("sync.timeout_secs must be positive".into()));
        }
        if self.model.timeout_secs == 0 {
            return Err(SettingsError::InvalidValue("model.timeout_secs must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(SettingsError::InvalidValue(format!(
                "model.temperature {} is outside 0.0..=2.0",
                self.model.temperature
            )));
        }
        if self.facts.max_words == 0 {
            return Err(SettingsError::InvalidValue("facts.max_words must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "context.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Push and pull through git. When false the snapshot stays local.
    pub enabled: bool,
    /// Git working copy holding the snapshot.
    pub repo_dir: String,
    /// Snapshot file name, relative to `repo_dir` unless absolute.
    pub snapshot_file: String,
    /// Bound on every git command.
    pub timeout_secs: u64,
    /// Keep local facts when the startup pull fails instead of clearing them.
    pub preserve_facts_on_pull_failure: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: ".".to_string(),
            snapshot_file: "context.json".to_string(),
            timeout_secs: 30,
            preserve_facts_on_pull_failure: false,
        }
    }
}

impl SyncSettings {
    pub fn snapshot_path(&self) -> PathBuf {
        let file = Path::new(&self.snapshot_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            Path::new(&self.repo_dir).join(file)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            name: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 256,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactSettings {
    /// Word ceiling above which a reply is never a fact.
    pub max_words: usize,
    /// Summarize retained replies on the live path.
    pub extract_context: bool,
}

impl Default for FactSettings {
    fn default() -> Self {
        Self {
            max_words: 100,
            extract_context: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Write logs here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}
