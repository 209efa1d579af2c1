//! Storage backends for the snapshot bytes.
//!
//! [`FileBackend`] never writes the live file in place: bytes are staged in a
//! sibling temp file, flushed, then renamed over the target, so readers see
//! either the previous snapshot or the new one.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{Result, SrdError};

/// Where snapshot bytes live.
pub trait SnapshotBackend: Send {
    /// Human-readable location used in errors and logs.
    fn location(&self) -> PathBuf;

    /// Current bytes, or `None` when nothing was ever persisted.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the persisted bytes atomically.
    fn write_atomic(&self, bytes: &[u8]) -> Result<()>;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "state".into(), |n| n.to_string_lossy().into_owned());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }

    /// Write and flush the staged copy. The live file is untouched.
    fn stage(&self, bytes: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SrdError::io(parent, e))?;
        }
        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| SrdError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| SrdError::io(&tmp, e))?;
        file.sync_all().map_err(|e| SrdError::io(&tmp, e))?;
        Ok(tmp)
    }

    /// Rename the staged copy over the live file.
    fn publish(&self, staged: &Path) -> Result<()> {
        if let Err(e) = fs::rename(staged, &self.path) {
            let _ = fs::remove_file(staged);
            return Err(SrdError::io(&self.path, e));
        }
        sync_parent_dir(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    // Best effort: persists the rename itself across power loss.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

impl SnapshotBackend for FileBackend {
    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SrdError::io(&self.path, e)),
        }
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let staged = self.stage(bytes)?;
        self.publish(&staged)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    bytes: Option<Vec<u8>>,
    fail_writes: bool,
    writes: usize,
}

/// In-memory backend for tests. Clones share the same storage, so a test can
/// keep a handle to inspect or sabotage what the store writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed persisted bytes (e.g. a corrupt snapshot).
    #[must_use]
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let backend = Self::default();
        backend.inner.lock().bytes = Some(bytes.into());
        backend
    }

    /// Make subsequent writes fail like a full disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    #[must_use]
    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.inner.lock().bytes.clone()
    }

    /// Successful writes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }
}

impl SnapshotBackend for MemoryBackend {
    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().bytes.clone())
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(SrdError::io(
                "<memory>",
                std::io::Error::other("simulated write failure"),
            ));
        }
        inner.bytes = Some(bytes.to_vec());
        inner.writes += 1;
        Ok(())
    }
}
