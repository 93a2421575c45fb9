//! Persistence backends for the state store
//!
//! A backend only moves opaque bytes; the store owns the document format.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Durable storage for a single serialized document
///
/// `persist` must not return until the bytes would survive a process
/// restart. A failed `persist` must leave the previous document intact.
pub trait Backend: Send + Sync + 'static {
    /// Load the last persisted document, or `None` if nothing was written yet
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the persisted document
    fn persist(&self, bytes: &[u8]) -> Result<()>;
}

/// JSON document on the local filesystem
///
/// Writes go to a sibling `.tmp` file which is synced and then renamed over
/// the target, so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Create a backend for the given file path
    ///
    /// The parent directory is created on first write if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Backend for FileBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        tracing::trace!("Persisted {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

/// In-memory backend
///
/// Clones share the same bytes, so opening a second store on a clone
/// behaves like reopening the same file after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-seeded with a document
    pub fn with_document(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Some(bytes.into()))),
        }
    }

    /// Current raw document, if any
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.lock().clone())
    }

    fn persist(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("state.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_file_backend_persist_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("state.json"));

        backend.persist(b"first").unwrap();
        backend.persist(b"second").unwrap();

        assert_eq!(backend.load().unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_memory_backend_clones_share_bytes() {
        let backend = MemoryBackend::new();
        let other = backend.clone();

        backend.persist(b"shared").unwrap();
        assert_eq!(other.load().unwrap().as_deref(), Some(&b"shared"[..]));
    }
}
