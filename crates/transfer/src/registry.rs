use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::types::FileEntry;
use crate::{TransferError, lock};

/// Shared handle to one in-progress transfer.
pub type SharedEntry = Arc<Mutex<FileEntry>>;

/// Concurrent map from file id to in-progress transfer state.
///
/// Every entry owns a directory named after its id under `working_dir`.
/// Lookups, creation and removal all happen under one lock so that a
/// working directory exists exactly when its id is registered.
pub struct FileEntryRegistry {
    working_dir: PathBuf,
    entries: Mutex<HashMap<String, SharedEntry>>,
}

impl FileEntryRegistry {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Registers a brand-new transfer and creates its working directory.
    ///
    /// Without a `file_id` a fresh lowercase UUID is generated. A supplied
    /// id that is already registered or already has a working directory
    /// is rejected.
    pub fn create(&self, file_id: Option<&str>) -> Result<SharedEntry, TransferError> {
        let mut entries = lock(&self.entries);

        let file_id = match file_id {
            Some(id) => {
                if entries.contains_key(id) {
                    return Err(TransferError::Validation(format!(
                        "id of new file to store '{id}' already exists"
                    )));
                }
                if self.working_dir.join(id).exists() {
                    return Err(TransferError::Validation(format!(
                        "work directory for new file id '{id}' already exists"
                    )));
                }
                id.to_string()
            }
            None => loop {
                let id = uuid::Uuid::new_v4().to_string();
                if !entries.contains_key(&id) && !self.working_dir.join(&id).exists() {
                    break id;
                }
            },
        };

        let entry_dir = self.working_dir.join(&file_id);
        std::fs::create_dir_all(&entry_dir)?;
        info!(file_id = %file_id, path = %entry_dir.display(), "assigned file id");

        let entry = Arc::new(Mutex::new(FileEntry::new(file_id.clone(), entry_dir)));
        entries.insert(file_id, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn get(&self, file_id: &str) -> Option<SharedEntry> {
        lock(&self.entries).get(file_id).cloned()
    }

    /// Unregisters `entry` and deletes its working directory.
    ///
    /// The caller must hold the entry's lock; the entry is marked closed so
    /// that deliveries already waiting on it are refused.
    pub fn discard(&self, entry: &mut FileEntry) -> Result<(), TransferError> {
        entry.close();
        let mut entries = lock(&self.entries);
        entries.remove(entry.file_id());
        match std::fs::remove_dir_all(entry.working_dir()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all registered transfers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.entries).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every child of the working directory.
    ///
    /// Anything there belongs to a transfer that never reached store or
    /// cancel. Returns the number of entries removed. A leftover that cannot
    /// be removed is an error, since its id would stay blocked as a duplicate.
    pub fn purge_incomplete(&self) -> Result<usize, TransferError> {
        let _entries = lock(&self.entries);
        let mut purged = 0;
        for dir_entry in std::fs::read_dir(&self.working_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            info!(
                file_id = %dir_entry.file_name().to_string_lossy(),
                "purging content for incomplete file id"
            );
            let removed = if dir_entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                error!(path = %path.display(), error = %e, "failed to purge entry");
                return Err(e.into());
            }
            purged += 1;
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> FileEntryRegistry {
        FileEntryRegistry::new(dir.path().to_path_buf())
    }

    #[test]
    fn create_generates_lowercase_id() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let entry = registry.create(None).unwrap();
        let entry = lock(&entry);
        let id = entry.file_id().to_string();
        assert_eq!(id, id.to_lowercase());
        assert_eq!(id.len(), 36);
        assert!(entry.working_dir().is_dir());
        assert_eq!(registry.ids(), vec![id]);
    }

    #[test]
    fn create_rejects_registered_id() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        registry.create(Some("abc")).unwrap();
        let err = registry.create(Some("abc")).err().unwrap();
        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn create_rejects_existing_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("stale")).unwrap();
        let registry = registry_in(&dir);

        let err = registry.create(Some("stale")).err().unwrap();
        assert!(err.to_string().contains("already exists"));
        assert!(registry.is_empty());
    }

    #[test]
    fn discard_removes_entry_and_directory() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let shared = registry.create(Some("abc")).unwrap();
        let mut entry = lock(&shared);
        entry.append(b"partial").unwrap();
        registry.discard(&mut entry).unwrap();

        assert!(entry.is_closed());
        assert!(!dir.path().join("abc").exists());
        assert!(registry.get("abc").is_none());
    }

    #[test]
    fn purge_removes_stale_children() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("old-1")).unwrap();
        std::fs::write(dir.path().join("old-1").join("file"), b"x").unwrap();
        std::fs::write(dir.path().join("stray"), b"y").unwrap();

        let registry = registry_in(&dir);
        assert_eq!(registry.purge_incomplete().unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
