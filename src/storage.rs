//! Storage Backends
//!
//! The knowledge store and predictor persist whole documents, one per
//! collection, through [`StorageBackend`]. Three implementations:
//!
//! - [`JsonDirBackend`]: one pretty-printed JSON file per collection
//! - [`SqliteBackend`]: a single `documents` table in SQLite
//! - [`MemoryBackend`]: process-local, for tests and ephemeral sessions

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Persisted collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Patterns,
    WordAssociations,
    TaughtAnswers,
    CustomOverrides,
    Predictor,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Patterns,
        Collection::WordAssociations,
        Collection::TaughtAnswers,
        Collection::CustomOverrides,
        Collection::Predictor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Patterns => "patterns",
            Collection::WordAssociations => "word_associations",
            Collection::TaughtAnswers => "taught_answers",
            Collection::CustomOverrides => "custom_overrides",
            Collection::Predictor => "predictor",
        }
    }
}

/// Load/save seam for persisted documents
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Load a collection document, `None` if it was never saved
    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError>;

    /// Replace a collection document
    fn save(&self, collection: Collection, body: &str) -> Result<(), StoreError>;

    /// Keep an unreadable document under a side name so the next save
    /// does not destroy it
    fn set_aside(&self, collection: Collection, body: &str) -> Result<(), StoreError>;
}

/// Load and parse one document, starting from `T::default()` when it was
/// never saved or cannot be read. Only an unreachable backend is an error.
pub fn load_document<T>(
    backend: &dyn StorageBackend,
    collection: Collection,
) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let body = match backend.load(collection) {
        Ok(Some(body)) => body,
        Ok(None) => return Ok(T::default()),
        Err(e) if e.is_unavailable() => return Err(e),
        Err(e) => {
            warn!("Failed to read {}, starting empty: {}", collection.as_str(), e);
            return Ok(T::default());
        }
    };

    let parse_error = match serde_json::from_str(&body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match backend.set_aside(collection, &body) {
        Ok(()) => warn!(
            "Malformed {}, kept a copy and starting empty: {}",
            collection.as_str(),
            parse_error
        ),
        Err(e) if e.is_unavailable() => return Err(e),
        Err(e) => warn!(
            "Malformed {} ({}) and it could not be set aside, next save replaces it: {}",
            collection.as_str(),
            parse_error,
            e
        ),
    }
    Ok(T::default())
}

/// Write one document through to the backend.
///
/// `Ok(false)` means the write failed and was logged; the caller keeps
/// its state in memory. Only an unreachable backend is an error.
pub fn save_document(
    backend: &dyn StorageBackend,
    collection: Collection,
    body: &str,
) -> Result<bool, StoreError> {
    match backend.save(collection, body) {
        Ok(()) => Ok(true),
        Err(e) if e.is_unavailable() => {
            warn!("Storage unavailable while saving {}: {}", collection.as_str(), e);
            Err(e)
        }
        Err(e) => {
            warn!(
                "Failed to persist {}, continuing in memory: {}",
                collection.as_str(),
                e
            );
            Ok(false)
        }
    }
}

/// One JSON file per collection inside a directory
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    /// Open (creating if needed) a data directory
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        info!("JSON knowledge store opened: {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }
}

impl StorageBackend for JsonDirBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        let path = self.path_for(collection);
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, collection: Collection, body: &str) -> Result<(), StoreError> {
        if !self.dir.is_dir() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                StoreError::Unavailable(format!("data dir {} is gone: {}", self.dir.display(), e))
            })?;
        }

        // Write-then-rename so a crash never leaves a half-written document
        let path = self.path_for(collection);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;

        debug!("Saved {} ({} bytes)", collection.as_str(), body.len());
        Ok(())
    }

    fn set_aside(&self, collection: Collection, _body: &str) -> Result<(), StoreError> {
        let path = self.path_for(collection);
        let aside = path.with_extension("json.corrupt");
        std::fs::rename(&path, &aside)?;
        info!("Moved unreadable {} to {}", collection.as_str(), aside.display());
        Ok(())
    }
}

/// Documents table in a SQLite database
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;

        info!("SQLite knowledge store opened: {}", path.display());
        Ok(backend)
    }

    /// In-memory database (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let backend = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1",
                params![collection.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn save(&self, collection: Collection, body: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO documents (collection, body, updated_at)
            VALUES (?1, ?2, unixepoch())
            ON CONFLICT(collection) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![collection.as_str(), body],
        )?;
        debug!("Saved {} ({} bytes)", collection.as_str(), body.len());
        Ok(())
    }

    fn set_aside(&self, collection: Collection, body: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let aside = format!("{}.corrupt", collection.as_str());
        conn.execute(
            r#"
            INSERT INTO documents (collection, body, updated_at)
            VALUES (?1, ?2, unixepoch())
            ON CONFLICT(collection) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![aside, body],
        )?;
        info!("Kept unreadable {} as {}", collection.as_str(), aside);
        Ok(())
    }
}

/// Simulated write failure for [`MemoryBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// A single write fails; the store stays reachable
    Io,
    /// The store cannot be reached at all
    Unavailable,
}

/// Process-local document map
#[derive(Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<Collection, String>>,
    set_aside: Mutex<HashMap<Collection, String>>,
    failure: Mutex<Option<WriteFailure>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again with `None`)
    pub fn set_write_failure(&self, failure: Option<WriteFailure>) {
        if let Ok(mut f) = self.failure.lock() {
            *f = failure;
        }
    }

    /// Current document for a collection
    pub fn document(&self, collection: Collection) -> Option<String> {
        self.documents
            .lock()
            .ok()
            .and_then(|docs| docs.get(&collection).cloned())
    }

    /// Unreadable document kept aside for a collection
    pub fn set_aside_document(&self, collection: Collection) -> Option<String> {
        self.set_aside
            .lock()
            .ok()
            .and_then(|docs| docs.get(&collection).cloned())
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        let docs = self
            .documents
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        Ok(docs.get(&collection).cloned())
    }

    fn save(&self, collection: Collection, body: &str) -> Result<(), StoreError> {
        let failure = self.failure.lock().ok().and_then(|f| *f);
        match failure {
            Some(WriteFailure::Io) => {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated write failure",
                )))
            }
            Some(WriteFailure::Unavailable) => {
                return Err(StoreError::Unavailable("simulated outage".to_string()))
            }
            None => {}
        }

        let mut docs = self
            .documents
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        docs.insert(collection, body.to_string());
        Ok(())
    }

    fn set_aside(&self, collection: Collection, body: &str) -> Result<(), StoreError> {
        let mut aside = self
            .set_aside
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        aside.insert(collection, body.to_string());
        Ok(())
    }
}
