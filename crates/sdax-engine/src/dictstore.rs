//! Dictionary persistence capability.
//!
//! A dictionary is stored as two files sharing one name (the hex of its
//! identity hash): the content block under the dictionary directory and
//! the ASCII header block under the header directory. The directory
//! implementation writes temp-file-then-rename so a crash never leaves
//! a partial file under the published name.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors from dictionary store operations.
#[derive(Debug, Error)]
pub enum DictStoreError {
    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Temp file could not be moved into place
    #[error("publish failed: {0}")]
    Publish(String),
}

/// A stored dictionary's two blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDict {
    /// ASCII header block, including the terminating blank line
    pub header: Bytes,
    /// Raw content block
    pub content: Bytes,
}

impl StoredDict {
    /// The wire form of a dictionary download: header then content.
    pub fn to_wire(&self) -> Bytes {
        let mut wire = Vec::with_capacity(self.header.len() + self.content.len());
        wire.extend_from_slice(&self.header);
        wire.extend_from_slice(&self.content);
        Bytes::from(wire)
    }
}

/// A directory entry seen during the bootstrap scan.
#[derive(Debug, Clone)]
pub struct DictEntry {
    /// Dictionary name (file base name)
    pub name: String,
    /// Content file modification time
    pub modified: SystemTime,
}

/// Dictionary file operations.
pub trait DictStore: Send + Sync {
    /// Stores both blocks under `name`, atomically per file.
    fn put(&self, name: &str, header: &[u8], content: &[u8]) -> Result<(), DictStoreError>;

    /// Loads both blocks, or `None` if either is missing.
    fn get(&self, name: &str) -> Result<Option<StoredDict>, DictStoreError>;

    /// Removes both blocks. Missing files are not an error.
    fn delete(&self, name: &str) -> Result<(), DictStoreError>;

    /// Lists stored dictionaries with their modification times.
    fn scan(&self) -> Result<Vec<DictEntry>, DictStoreError>;

    /// The path handed to codecs as the `-dictionary` argument.
    fn content_path(&self, name: &str) -> PathBuf;
}

/// Directory-backed dictionary store (the default).
pub struct DirDictStore {
    dict_dir: PathBuf,
    hdr_dir: PathBuf,
}

impl DirDictStore {
    /// Opens a store over the two directories, creating them if needed.
    pub fn open(dict_dir: impl Into<PathBuf>, hdr_dir: impl Into<PathBuf>) -> Result<Self, DictStoreError> {
        let dict_dir = dict_dir.into();
        let hdr_dir = hdr_dir.into();
        std::fs::create_dir_all(&dict_dir)?;
        std::fs::create_dir_all(&hdr_dir)?;
        Ok(Self { dict_dir, hdr_dir })
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), DictStoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        let target = dir.join(name);
        tmp.persist(&target)
            .map_err(|e| DictStoreError::Publish(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644))?;
        }
        Ok(())
    }

    fn remove_if_present(path: &Path) -> Result<(), DictStoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl DictStore for DirDictStore {
    fn put(&self, name: &str, header: &[u8], content: &[u8]) -> Result<(), DictStoreError> {
        Self::write_file(&self.dict_dir, name, content)?;
        if let Err(error) = Self::write_file(&self.hdr_dir, name, header) {
            // Do not leave a content file with no header behind.
            let _ = std::fs::remove_file(self.dict_dir.join(name));
            return Err(error);
        }
        debug!(name, content_bytes = content.len(), "stored dictionary");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<StoredDict>, DictStoreError> {
        let content = match std::fs::read(self.dict_dir.join(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let header = match std::fs::read(self.hdr_dir.join(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(StoredDict {
            header: Bytes::from(header),
            content: Bytes::from(content),
        }))
    }

    fn delete(&self, name: &str) -> Result<(), DictStoreError> {
        Self::remove_if_present(&self.dict_dir.join(name))?;
        Self::remove_if_present(&self.hdr_dir.join(name))?;
        debug!(name, "deleted dictionary");
        Ok(())
    }

    fn scan(&self) -> Result<Vec<DictEntry>, DictStoreError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dict_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let modified = entry.metadata()?.modified()?;
            entries.push(DictEntry { name, modified });
        }
        Ok(entries)
    }

    fn content_path(&self, name: &str) -> PathBuf {
        self.dict_dir.join(name)
    }
}

/// In-memory dictionary store for tests.
///
/// `content_path` returns a synthetic path; pair this store with a
/// codec that does not read the dictionary from disk.
#[derive(Default)]
pub struct MemoryDictStore {
    dicts: Mutex<HashMap<String, (StoredDict, SystemTime)>>,
}

impl MemoryDictStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DictStore for MemoryDictStore {
    fn put(&self, name: &str, header: &[u8], content: &[u8]) -> Result<(), DictStoreError> {
        let stored = StoredDict {
            header: Bytes::copy_from_slice(header),
            content: Bytes::copy_from_slice(content),
        };
        self.dicts
            .lock()
            .insert(name.to_string(), (stored, SystemTime::now()));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<StoredDict>, DictStoreError> {
        Ok(self.dicts.lock().get(name).map(|(d, _)| d.clone()))
    }

    fn delete(&self, name: &str) -> Result<(), DictStoreError> {
        self.dicts.lock().remove(name);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<DictEntry>, DictStoreError> {
        Ok(self
            .dicts
            .lock()
            .iter()
            .map(|(name, (_, modified))| DictEntry {
                name: name.clone(),
                modified: *modified,
            })
            .collect())
    }

    fn content_path(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("mem:{name}"))
    }
}
