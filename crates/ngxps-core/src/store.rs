//! Persisted unit state: flags, change baselines and displayed status
//!
//! The store is constructed once per process and handed to the engine.
//! Where the document lives is decided by the `StateBackend`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::ChangeDetector;
use crate::error::CoreError;
use crate::flags::FlagStore;
use crate::status::StatusBoard;

/// Storage for the serialised state document
pub trait StateBackend: Send + Sync {
    /// Load the last saved document, `None` on a fresh unit
    fn load(&self) -> Result<Option<String>, CoreError>;

    /// Replace the saved document
    fn save(&self, document: &str) -> Result<(), CoreError>;

    fn backend_type(&self) -> &'static str;
}

/// JSON document on local disk, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
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

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>, CoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CoreError::Store(format!("failed to read '{}': {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "loaded unit state");
        Ok(Some(content))
    }

    fn save(&self, document: &str) -> Result<(), CoreError> {
        let store_err =
            |e: std::io::Error, p: &Path| CoreError::Store(format!("'{}': {e}", p.display()));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| store_err(e, parent))?;
        }

        let tmp = self.temp_path();
        let mut file = std::fs::File::create(&tmp).map_err(|e| store_err(e, &tmp))?;
        file.write_all(document.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| store_err(e, &tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| store_err(e, &self.path))?;

        debug!(path = %self.path.display(), "saved unit state");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "json-file"
    }
}

/// In-process backend; clones share the same document
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    document: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw saved document, if any
    #[must_use]
    pub fn document(&self) -> Option<String> {
        self.document.lock().ok().and_then(|doc| doc.clone())
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>, CoreError> {
        self.document
            .lock()
            .map(|doc| doc.clone())
            .map_err(|e| CoreError::Store(e.to_string()))
    }

    fn save(&self, document: &str) -> Result<(), CoreError> {
        let mut doc = self
            .document
            .lock()
            .map_err(|e| CoreError::Store(e.to_string()))?;
        *doc = Some(document.to_string());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    flags: &'a FlagStore,
    baselines: &'a ChangeDetector,
    status: &'a StatusBoard,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    flags: FlagStore,
    #[serde(default)]
    baselines: ChangeDetector,
    #[serde(default)]
    status: StatusBoard,
}

/// Flags, baselines and status of the unit, backed by a `StateBackend`
pub struct UnitStore {
    pub flags: FlagStore,
    pub detector: ChangeDetector,
    pub status: StatusBoard,
    backend: Box<dyn StateBackend>,
}

impl UnitStore {
    /// Load the state saved in `backend`, or start empty on a fresh unit
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read or the saved document
    /// does not parse
    pub fn open(backend: Box<dyn StateBackend>) -> Result<Self, CoreError> {
        let document = match backend.load()? {
            Some(content) => Some(serde_json::from_str::<Document>(&content).map_err(|e| {
                CoreError::Store(format!(
                    "unreadable unit state in {} backend: {e}",
                    backend.backend_type()
                ))
            })?),
            None => None,
        };

        let Document {
            flags,
            baselines,
            status,
        } = document.unwrap_or(Document {
            flags: FlagStore::default(),
            baselines: ChangeDetector::default(),
            status: StatusBoard::default(),
        });

        Ok(Self {
            flags,
            detector: baselines,
            status,
            backend,
        })
    }

    /// Empty store kept in memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            flags: FlagStore::default(),
            detector: ChangeDetector::default(),
            status: StatusBoard::default(),
            backend: Box::new(MemoryBackend::new()),
        }
    }

    /// Persist the current state
    ///
    /// # Errors
    /// Returns an error if serialisation or the backend write fails
    pub fn flush(&self) -> Result<(), CoreError> {
        let document = serde_json::to_string_pretty(&DocumentRef {
            flags: &self.flags,
            baselines: &self.detector,
            status: &self.status,
        })?;
        self.backend.save(&document)
    }
}
