//! Serializable images of the cache and the invalidator, so a later process
//! can pick up where this one stopped.

use serde::{Deserialize, Serialize};
use suite_core::{FileId, JobDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub files: Vec<FileSnapshot>,
}

impl CacheSnapshot {
    pub fn entry_count(&self) -> usize {
        self.files.iter().map(|file| file.entries.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub file_id: FileId,
    /// In insertion order.
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub job: Option<JobDescriptor>,
    /// Current line numbers, after any shifts.
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InvalidatorSnapshot {
    #[serde(default)]
    pub classes: Vec<ClassSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSnapshot {
    /// `file/class`
    pub key: String,
    pub methods: Vec<MethodRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub signature: String,
    pub tokens: Vec<String>,
    pub first_line: u32,
    pub last_line: u32,
}
