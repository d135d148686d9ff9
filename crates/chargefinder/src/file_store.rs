use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use finder_core::storage::{KeyValueStore, StorageError};

/// Key-value store persisted as one JSON object on disk.
///
/// Every write rewrites the whole file through a temporary file and a rename,
/// so a crash never leaves a half-written profile behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                key: path.display().to_string(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(backend_error(&path, err)),
        };
        Ok(FileStore { path, entries })
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| backend_error(parent, err))?;
        }
        let raw = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StorageError::Corrupt {
                key: self.path.display().to_string(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw).map_err(|err| backend_error(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| backend_error(&self.path, err))
    }
}

fn backend_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Backend(format!("{}: {}", path.display(), err))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    /// A fresh, not yet existing path under the system temp dir.
    pub fn scratch_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir()
            .join(format!("chargefinder-{}-{}", std::process::id(), nanos))
            .join(name)
    }

    #[test]
    fn test_values_survive_reopening() {
        let path = scratch_path("profile.json");
        let mut store = FileStore::open(&path).unwrap();
        assert!(store.get("a").unwrap().is_none());
        store.set("a", "1".into()).unwrap();
        store.set("b", "2".into()).unwrap();
        store.remove("b").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert!(store.get("b").unwrap().is_none());
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let path = scratch_path("profile.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
