//! Persistent adapter
//!
//! Layers the in-memory adapter over durable [`Storage`]. Storage holds one
//! entry per path whose text is the JSON form of a [`TimestampedValue`].
//!
//! Loading is asynchronous. Loaded entries are merged into the in-memory core
//! through the resolver, so anyone who subscribed before the load finished
//! is replayed every value that turned out newer than what they were told.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use super::{Adapter, AdapterError, Callback, MemoryAdapter};
use crate::{
    Error, Result,
    clock::{Clock, SystemClock},
    subscription::Subscription,
    value::TimestampedValue,
};

/// Durable key/value storage keyed by path.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads every stored `(path, json_text)` entry.
    async fn load(&self) -> Result<Vec<(String, String)>>;

    /// Durably records `text` for `path`, replacing any previous entry.
    async fn store(&self, path: &str, text: &str) -> Result<()>;
}

/// Stores every entry in a single JSON object file (path -> text).
///
/// Writes rewrite the whole file through a temporary file and a rename, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStorage {
    file: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl JsonFileStorage {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    async fn read_file(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.file).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| -> Error {
                AdapterError::ParseFailure {
                    path: self.file.display().to_string(),
                    source: e,
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(AdapterError::Storage {
                reason: format!("reading {}: {e}", self.file.display()),
            }
            .into()),
        }
    }

    async fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.file.with_extension("tmp");
        let storage_err = |e: std::io::Error| -> Error {
            AdapterError::Storage {
                reason: format!("writing {}: {e}", self.file.display()),
            }
            .into()
        };
        tokio::fs::write(&tmp, json).await.map_err(storage_err)?;
        tokio::fs::rename(&tmp, &self.file)
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self) -> Result<Vec<(String, String)>> {
        let mut cached = self.entries.lock().await;
        let entries = match cached.as_ref() {
            Some(entries) => entries.clone(),
            None => {
                let entries = self.read_file().await?;
                *cached = Some(entries.clone());
                entries
            }
        };
        Ok(entries.into_iter().collect())
    }

    async fn store(&self, path: &str, text: &str) -> Result<()> {
        let mut cached = self.entries.lock().await;
        if cached.is_none() {
            // A corrupt file is replaced rather than blocking every write.
            let entries = match self.read_file().await {
                Ok(entries) => entries,
                Err(e) if e.is_parse_error() => {
                    warn!(file = %self.file.display(), error = %e, "Overwriting unreadable storage file");
                    BTreeMap::new()
                }
                Err(e) => return Err(e),
            };
            *cached = Some(entries);
        }
        let entries = cached.get_or_insert_with(BTreeMap::new);
        entries.insert(path.to_string(), text.to_string());
        self.write_file(entries).await
    }
}

/// An adapter that keeps values in memory and mirrors them to [`Storage`].
///
/// Writes wait for the initial load, so a stale write can never replace a
/// newer stored value, and are stored in the order the resolver accepted them.
pub struct PersistentAdapter {
    core: MemoryAdapter,
    storage: Arc<dyn Storage>,
    loaded: watch::Receiver<bool>,
    /// Held across accept and store
    writes: Mutex<()>,
}

impl PersistentAdapter {
    /// Opens the adapter and starts loading `storage` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(storage: impl Storage + 'static) -> Arc<Self> {
        Self::open_with_clock(Arc::new(storage), Arc::new(SystemClock))
    }

    /// Like [`PersistentAdapter::open`], judging expiry against `clock`.
    pub fn open_with_clock(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let core = MemoryAdapter::with_clock(clock);
        let (tx, rx) = watch::channel(false);
        tokio::spawn(load_into(core.clone(), storage.clone(), tx));
        Arc::new(Self {
            core,
            storage,
            loaded: rx,
            writes: Mutex::new(()),
        })
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Waits until the initial load has been merged.
    pub async fn wait_loaded(&self) {
        let mut loaded = self.loaded.clone();
        // Only fails if the load task is gone, which also means it finished.
        let _ = loaded.wait_for(|done| *done).await;
    }

    /// The in-memory view of what has been loaded and written so far.
    pub fn memory(&self) -> &MemoryAdapter {
        &self.core
    }
}

async fn load_into(core: MemoryAdapter, storage: Arc<dyn Storage>, loaded: watch::Sender<bool>) {
    let mut accepted = 0usize;
    match storage.load().await {
        Ok(entries) => {
            for (path, text) in entries {
                match serde_json::from_str::<TimestampedValue>(&text) {
                    Ok(value) if value.updated_at.is_some() => {
                        if core.apply(&path, value) {
                            accepted += 1;
                        }
                    }
                    Ok(_) => warn!(path = %path, "Skipping stored value without updatedAt"),
                    Err(e) => warn!(path = %path, error = %e, "Skipping unparseable stored value"),
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to load persistent storage; starting empty"),
    }
    info!(entries = accepted, "Persistent storage loaded");
    let _ = loaded.send(true);
}

#[async_trait]
impl Adapter for PersistentAdapter {
    fn get(&self, path: &str, callback: Callback) -> Subscription {
        self.core.get(path, callback)
    }

    async fn set(&self, path: &str, value: TimestampedValue) -> Result<()> {
        value.require_updated_at(path)?;
        let text = serde_json::to_string(&value)?;
        self.wait_loaded().await;

        let _writing = self.writes.lock().await;
        if !self.core.apply(path, value) {
            return Ok(());
        }
        if let Err(e) = self.storage.store(path, &text).await {
            warn!(path = %path, error = %e, "Failed to persist value; keeping it in memory only");
        }
        Ok(())
    }

    fn list(&self, path: &str, callback: Callback) -> Subscription {
        self.core.list(path, callback)
    }
}

impl std::fmt::Debug for PersistentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentAdapter")
            .field("core", &self.core)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
