//! Save-game persistence over an opaque key/value store.
//!
//! A save is three keys: the progress snapshot as JSON, the world database
//! export as hex text, and a SHA-256 digest over both that is checked on load.
//! The player's notepad is kept under a fourth key outside the digest.

use crate::core::error::ShellError;
use crate::core::progress::ProgressSnapshot;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

pub const PROGRESS_KEY: &str = "progress.json";
pub const WORLD_KEY: &str = "world.hex";
pub const CHECKSUM_KEY: &str = "save.sha256";
pub const NOTES_KEY: &str = "notes.txt";

pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), ShellError>;
    fn get(&self, key: &str) -> Result<Option<String>, ShellError>;
    fn remove(&self, key: &str) -> Result<(), ShellError>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ShellError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(ShellError::Persistence(format!("invalid store key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

impl KvStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<(), ShellError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, ShellError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn remove(&self, key: &str) -> Result<(), ShellError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ShellError> {
        self.entries
            .lock()
            .map_err(|_| ShellError::Persistence("memory store poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), ShellError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, ShellError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), ShellError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Everything needed to restore a game, captured by value.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSnapshot {
    pub progress: ProgressSnapshot,
    pub world: Vec<u8>,
    pub notes: String,
}

fn checksum(progress_json: &str, world_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(progress_json.as_bytes());
    hasher.update(b"\n");
    hasher.update(world_hex.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn save(store: &dyn KvStore, snapshot: &SaveSnapshot) -> Result<(), ShellError> {
    let progress_json = serde_json::to_string_pretty(&snapshot.progress)?;
    let world_hex = hex::encode(&snapshot.world);
    let digest = checksum(&progress_json, &world_hex);

    // Digest goes last so an interrupted save fails verification on load.
    store.remove(CHECKSUM_KEY)?;
    store.put(PROGRESS_KEY, &progress_json)?;
    store.put(WORLD_KEY, &world_hex)?;
    store.put(CHECKSUM_KEY, &digest)?;
    store.put(NOTES_KEY, &snapshot.notes)?;
    Ok(())
}

/// `Ok(None)` when nothing has been saved yet.
pub fn load(store: &dyn KvStore) -> Result<Option<SaveSnapshot>, ShellError> {
    let Some(progress_json) = store.get(PROGRESS_KEY)? else {
        return Ok(None);
    };
    let world_hex = store
        .get(WORLD_KEY)?
        .ok_or_else(|| ShellError::Persistence("save has no world data".to_string()))?;
    let stored_digest = store
        .get(CHECKSUM_KEY)?
        .ok_or_else(|| ShellError::Persistence("save has no checksum".to_string()))?;

    if stored_digest.trim() != checksum(&progress_json, &world_hex) {
        return Err(ShellError::Persistence(
            "save checksum mismatch".to_string(),
        ));
    }

    let mut progress: ProgressSnapshot = serde_json::from_str(&progress_json)?;
    progress.normalize();
    let world = hex::decode(world_hex.trim())
        .map_err(|e| ShellError::Persistence(format!("world data is not hex: {e}")))?;
    let notes = store.get(NOTES_KEY)?.unwrap_or_default();
    Ok(Some(SaveSnapshot {
        progress,
        world,
        notes,
    }))
}

pub fn clear(store: &dyn KvStore) -> Result<(), ShellError> {
    for key in [CHECKSUM_KEY, PROGRESS_KEY, WORLD_KEY, NOTES_KEY] {
        store.remove(key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::{ProgressEvent, StoryFlag};
    use tempfile::tempdir;

    fn snapshot() -> SaveSnapshot {
        let mut progress = ProgressSnapshot::default();
        progress.apply(&ProgressEvent::SetFlag {
            flag: StoryFlag::ConnectedToMainIp,
        });
        SaveSnapshot {
            progress,
            world: vec![0x53, 0x51, 0x4c, 0x00, 0xff],
            notes: "router pw? try the logs\n".to_string(),
        }
    }

    #[test]
    fn file_store_saves_and_loads() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("save"));
        assert!(load(&store).unwrap().is_none());

        save(&store, &snapshot()).unwrap();
        assert_eq!(load(&store).unwrap(), Some(snapshot()));
        assert_eq!(
            store.get(WORLD_KEY).unwrap().as_deref(),
            Some("53514c00ff")
        );
    }

    #[test]
    fn tampered_save_is_rejected() {
        let store = MemoryStore::new();
        save(&store, &snapshot()).unwrap();
        store.put(WORLD_KEY, "00").unwrap();
        assert!(matches!(load(&store), Err(ShellError::Persistence(_))));
    }

    #[test]
    fn keys_cannot_escape_the_store_root() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.put("../outside", "x").is_err());
        assert!(store.get(".hidden").is_err());
    }

    #[test]
    fn clear_forgets_the_save() {
        let store = MemoryStore::new();
        save(&store, &snapshot()).unwrap();
        clear(&store).unwrap();
        assert!(load(&store).unwrap().is_none());
        assert!(store.get(NOTES_KEY).unwrap().is_none());
    }

    #[test]
    fn notes_are_outside_the_digest() {
        let store = MemoryStore::new();
        save(&store, &snapshot()).unwrap();
        store.put(NOTES_KEY, "rewritten by hand").unwrap();
        let loaded = load(&store).unwrap().unwrap();
        assert_eq!(loaded.notes, "rewritten by hand");
        assert_eq!(loaded.progress, snapshot().progress);
    }
}
