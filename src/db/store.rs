//! Bounded JSON log store.
//!
//! The whole sequence lives in memory as an immutable snapshot and is
//! rewritten to disk after every batch (temporary file, then rename).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

use super::models::CheckResult;

/// Default number of results retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Log store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize logs: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Thread-safe, capacity-bounded log of check results.
pub struct LogStore {
    path: PathBuf,
    capacity: usize,
    /// Serializes append, trim and persist.
    writer: Mutex<()>,
    /// The in-memory sequence has changes that never reached disk.
    dirty: AtomicBool,
    current: RwLock<Arc<Vec<CheckResult>>>,
}

impl LogStore {
    /// Open the store at `path`.
    ///
    /// A missing or unreadable file is treated as an empty log.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        let mut entries = match read_persisted(&path) {
            Ok(entries) => entries,
            Err(StoreError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No log file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Ignoring persisted logs: {}", e);
                Vec::new()
            }
        };

        if entries.len() > capacity {
            let excess = entries.len() - capacity;
            entries.drain(..excess);
        }

        tracing::info!("Loaded {} log entries from {}", entries.len(), path.display());

        Self {
            path,
            capacity,
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
            current: RwLock::new(Arc::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Immutable snapshot of the full sequence, oldest first.
    pub fn load_all(&self) -> Arc<Vec<CheckResult>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.load_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the last write to disk failed.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Append a batch, trim the oldest entries past capacity, and persist.
    ///
    /// Returns the number of entries retained. On a write error the batch
    /// is still kept in memory and the next append or flush retries the write.
    pub fn append_batch(&self, batch: &[CheckResult]) -> Result<usize, StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.load_all();
        if batch.is_empty() && !self.is_dirty() {
            return Ok(previous.len());
        }

        let mut next = Vec::with_capacity(previous.len() + batch.len());
        next.extend_from_slice(&previous);
        next.extend_from_slice(batch);
        if next.len() > self.capacity {
            let excess = next.len() - self.capacity;
            next.drain(..excess);
        }

        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();

        match self.persist(&next) {
            Ok(()) => {
                self.dirty.store(false, Ordering::Release);
                Ok(next.len())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Rewrite the file if an earlier write failed.
    pub fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_dirty() {
            return Ok(());
        }

        self.persist(&self.load_all())?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn persist(&self, entries: &[CheckResult]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(entries)?;
        let write_err = |source: io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(write_err)?;
        file.write_all(&data).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(write_err)?;
        sync_dir(dir).map_err(write_err)?;
        Ok(())
    }
}

/// Flush a directory entry so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn read_persisted(path: &Path) -> Result<Vec<CheckResult>, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
