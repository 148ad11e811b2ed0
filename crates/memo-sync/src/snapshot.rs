use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use memo_core::{Message, MessageId, Role};

use crate::error::SyncError;

/// One entry of the snapshot file.
///
/// Older snapshot files also carry `is_fact`; it is kept when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fact: Option<bool>,
}

impl From<&Message> for SnapshotEntry {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            role: msg.role,
            content: msg.content.clone(),
            is_fact: None,
        }
    }
}

/// Ordered snapshot of session messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    /// Snapshot in the order given.
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Self {
        Self::new(messages.into_iter().map(SnapshotEntry::from).collect())
    }

    /// Snapshot with the most recent message first, as pushed at session end.
    pub fn newest_first(messages: &[Message]) -> Self {
        Self::from_messages(messages.iter().rev())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// The snapshot file on disk.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<Snapshot, SyncError> {
        if !self.path.exists() {
            return Err(SyncError::SnapshotMissing(self.path.clone()));
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Snapshot::from_json(&raw)
    }

    /// Read the file, treating a missing file as an empty snapshot.
    pub fn read_or_empty(&self) -> Result<Snapshot, SyncError> {
        match self.read() {
            Err(SyncError::SnapshotMissing(_)) => Ok(Snapshot::default()),
            other => other,
        }
    }

    /// Replace the file contents. Written to a sibling temp file first and
    /// renamed into place so readers never see a half-written array.
    pub fn write(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, snapshot.to_json()?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = snapshot.len(), "snapshot written");
        Ok(())
    }

    /// Append one entry to the end of the file.
    pub fn append(&self, entry: SnapshotEntry) -> Result<(), SyncError> {
        let mut snapshot = self.read_or_empty()?;
        snapshot.entries.push(entry);
        self.write(&snapshot)
    }

    /// Reset the file to an empty array.
    pub fn clear(&self) -> Result<(), SyncError> {
        self.write(&Snapshot::default())
    }
}
