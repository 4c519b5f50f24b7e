//! Write-through JSON persistence.
//!
//! Each persisted table (identity links, spy config, ghost config) is a single
//! JSON document rewritten in full after every mutation. Callers serialize a
//! snapshot while holding their own state lock, release it, and then hand the
//! snapshot to [`JsonStore::write`] together with the generation number it was
//! taken at. Snapshots older than the last one written are discarded, so
//! concurrent writers can never roll the file back.
//!
//! [`Persisted`] bundles a table, its lock and its store so services only
//! describe the mutation.

use crate::error::BridgeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

/// Errors raised while reading or writing a persisted document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A JSON document on disk holding a value of type `T`.
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    last_written: Mutex<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: Mutex::new(0),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document. A missing file yields the default value; an
    /// unreadable or malformed file is reported and also yields the default.
    pub async fn load(&self) -> T {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", self.path.display());
                return T::default();
            }
            Err(e) => {
                error!("❌ Failed to read {}: {}", self.path.display(), e);
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    "❌ Malformed state file {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                T::default()
            }
        }
    }

    /// Serializes a snapshot of `value`. Intended to be called under the
    /// caller's state lock.
    pub fn snapshot(value: &T) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    /// Writes a snapshot taken at `generation`. Returns `Ok(false)` when a
    /// newer snapshot has already been written.
    pub async fn write(&self, generation: u64, snapshot: String) -> Result<bool, StoreError> {
        let mut last_written = self.last_written.lock().await;
        if generation <= *last_written {
            debug!(
                "Skipping stale snapshot {} for {} (already at {})",
                generation,
                self.path.display(),
                *last_written
            );
            return Ok(false);
        }

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        tokio::fs::write(&tmp, snapshot.as_bytes()).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        *last_written = generation;
        Ok(true)
    }

    /// Writes a snapshot, logging instead of returning the error.
    ///
    /// The in-memory state the snapshot came from is authoritative for the
    /// running process; a failed write only loses durability across restart.
    pub async fn persist(&self, generation: u64, snapshot: Result<String, StoreError>) -> bool {
        let result = match snapshot {
            Ok(snapshot) => self.write(generation, snapshot).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️ {} ({})", BridgeError::from(e), self.path.display());
                false
            }
        }
    }
}

struct Versioned<T> {
    value: T,
    generation: u64,
}

/// An in-memory table that is written through to a [`JsonStore`] after
/// every mutation.
pub struct Persisted<T> {
    state: RwLock<Versioned<T>>,
    store: JsonStore<T>,
    failures: AtomicU64,
}

impl<T> std::fmt::Debug for Persisted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persisted")
            .field("path", &self.store.path)
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Loads the table from `path`, starting empty when the file is missing
    /// or malformed.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path);
        let value = store.load().await;
        Self {
            state: RwLock::new(Versioned {
                value,
                generation: 0,
            }),
            store,
            failures: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Number of writes that failed since startup.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.read().await;
        f(&state.value)
    }

    /// Applies `f` and persists the result. Returns the closure's value and
    /// whether the write succeeded.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> (R, bool) {
        let (result, generation, snapshot) = {
            let mut state = self.state.write().await;
            let result = f(&mut state.value);
            state.generation += 1;
            (result, state.generation, JsonStore::snapshot(&state.value))
        };
        let saved = self.store.persist(generation, snapshot).await;
        if !saved {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        (result, saved)
    }

    /// Like [`Persisted::update`], but only persists when `f` succeeds.
    /// A failing closure must leave the table untouched.
    pub async fn try_update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<(R, bool), E> {
        let (result, generation, snapshot) = {
            let mut state = self.state.write().await;
            let result = f(&mut state.value)?;
            state.generation += 1;
            (result, state.generation, JsonStore::snapshot(&state.value))
        };
        let saved = self.store.persist(generation, snapshot).await;
        if !saved {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok((result, saved))
    }
}
