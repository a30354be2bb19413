//! Durable storage for the workflow state and version history documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::WorkflowState;
use crate::error::PersistenceError;
use crate::version::VersionHistory;

const STATE_DOCUMENT: &str = "workflow state";
const VERSIONS_DOCUMENT: &str = "version history";

/// Where the engine reads and writes its two documents.
///
/// Both are loaded once at startup and rewritten after every state-changing
/// operation.
pub trait StateStore: Send + Sync {
    fn load_state(&self) -> Result<Option<WorkflowState>, PersistenceError>;
    fn save_state(&self, state: &WorkflowState) -> Result<(), PersistenceError>;
    fn load_versions(&self) -> Result<Option<VersionHistory>, PersistenceError>;
    fn save_versions(&self, history: &VersionHistory) -> Result<(), PersistenceError>;
}

/// JSON files on disk, replaced atomically (write temp file, then rename).
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_path: PathBuf,
    versions_path: PathBuf,
}

impl FileStateStore {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(state_path: P, versions_path: Q) -> Self {
        Self {
            state_path: state_path.into(),
            versions_path: versions_path.into(),
        }
    }

    /// Both documents under one directory with their default names.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join("workflow_state.json"),
            dir.join("version_history.json"),
        )
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn versions_path(&self) -> &Path {
        &self.versions_path
    }
}

impl StateStore for FileStateStore {
    fn load_state(&self) -> Result<Option<WorkflowState>, PersistenceError> {
        read_json(&self.state_path, STATE_DOCUMENT)
    }

    fn save_state(&self, state: &WorkflowState) -> Result<(), PersistenceError> {
        write_json_atomic(&self.state_path, STATE_DOCUMENT, state)
    }

    fn load_versions(&self) -> Result<Option<VersionHistory>, PersistenceError> {
        read_json(&self.versions_path, VERSIONS_DOCUMENT)
    }

    fn save_versions(&self, history: &VersionHistory) -> Result<(), PersistenceError> {
        write_json_atomic(&self.versions_path, VERSIONS_DOCUMENT, history)
    }
}

fn read_json<T: DeserializeOwned>(
    path: &Path,
    document: &'static str,
) -> Result<Option<T>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }

    let read_err = |message: String| PersistenceError::Read {
        document,
        path: path.display().to_string(),
        message,
    };

    let raw = fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
    let value = serde_json::from_str(&raw).map_err(|e| read_err(e.to_string()))?;
    Ok(Some(value))
}

fn write_json_atomic<T: Serialize>(
    path: &Path,
    document: &'static str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| PersistenceError::Encode {
        document,
        message: e.to_string(),
    })?;

    let write_err = |message: String| PersistenceError::Write {
        document,
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).map_err(|e| write_err(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| write_err(e.to_string()))?;

    tracing::trace!(document, path = %path.display(), "document persisted");
    Ok(())
}

/// Keeps both documents as serialized JSON in memory.
///
/// Used by tests and by embedders that persist elsewhere; it still goes
/// through serde so it catches anything the file store would reject.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: Mutex<Option<String>>,
    versions: Mutex<Option<String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err(document: &'static str) -> PersistenceError {
    PersistenceError::Write {
        document,
        path: "memory".to_string(),
        message: "store lock poisoned".to_string(),
    }
}

fn load_slot<T: DeserializeOwned>(
    slot: &Mutex<Option<String>>,
    document: &'static str,
) -> Result<Option<T>, PersistenceError> {
    let guard = slot.lock().map_err(|_| lock_err(document))?;
    match guard.as_deref() {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| PersistenceError::Read {
                document,
                path: "memory".to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn save_slot<T: Serialize>(
    slot: &Mutex<Option<String>>,
    document: &'static str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(value).map_err(|e| PersistenceError::Encode {
        document,
        message: e.to_string(),
    })?;
    *slot.lock().map_err(|_| lock_err(document))? = Some(json);
    Ok(())
}

impl StateStore for InMemoryStateStore {
    fn load_state(&self) -> Result<Option<WorkflowState>, PersistenceError> {
        load_slot(&self.state, STATE_DOCUMENT)
    }

    fn save_state(&self, state: &WorkflowState) -> Result<(), PersistenceError> {
        save_slot(&self.state, STATE_DOCUMENT, state)
    }

    fn load_versions(&self) -> Result<Option<VersionHistory>, PersistenceError> {
        load_slot(&self.versions, VERSIONS_DOCUMENT)
    }

    fn save_versions(&self, history: &VersionHistory) -> Result<(), PersistenceError> {
        save_slot(&self.versions, VERSIONS_DOCUMENT, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::in_dir(temp_dir.path().join("nested"));

        assert!(store.load_state().unwrap().is_none());
        assert!(store.load_versions().unwrap().is_none());

        let state = WorkflowState::new("wf-1");
        store.save_state(&state).unwrap();
        let loaded = store.load_state().unwrap().unwrap();
        assert_eq!(loaded.workflow_id, "wf-1");

        let history = VersionHistory::default();
        store.save_versions(&history).unwrap();
        assert!(store.load_versions().unwrap().is_some());
        assert!(store.state_path().exists());
        assert!(!temp_dir
            .path()
            .join("nested")
            .join("workflow_state.json.tmp")
            .exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::in_dir(temp_dir.path());
        fs::write(store.state_path(), "{ not json").unwrap();

        let err = store.load_state().unwrap_err();
        assert!(matches!(err, PersistenceError::Read { .. }));
    }

    #[test]
    fn test_file_store_reloads_long_history() {
        use crate::state::{OutputDraft, OutputMetadata, TaskOutput, TaskStatus};

        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::in_dir(temp_dir.path());

        let draft = |n: u32| OutputDraft {
            status: TaskStatus::Completed,
            content: serde_json::json!({ "revision": n }),
            is_placeholder: false,
            quality: 1.0,
            metadata: OutputMetadata::default(),
        };
        let mut current = TaskOutput::from_draft("interview", draft(1), None);
        for n in 2..=250 {
            current = TaskOutput::from_draft("interview", draft(n), Some(&current));
        }

        let mut state = WorkflowState::new("wf-long");
        state.record(current);
        store.save_state(&state).unwrap();

        let loaded = store.load_state().unwrap().unwrap();
        let output = loaded.output("interview").unwrap();
        assert_eq!(output.version, 250);
        assert_eq!(output.history().count(), 250);
        assert_eq!(output.history().last().unwrap().content["revision"], 1);
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = InMemoryStateStore::new();
        assert!(store.load_state().unwrap().is_none());
        store.save_state(&WorkflowState::new("mem")).unwrap();
        assert_eq!(store.load_state().unwrap().unwrap().workflow_id, "mem");
    }
}
