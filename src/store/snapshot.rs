use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

/// Point-in-time copy of the chat cache, keyed entity-id to record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub messages: HashMap<String, Value>,
    #[serde(default)]
    pub contacts: HashMap<String, Value>,
    #[serde(default)]
    pub chats: HashMap<String, Value>,
}

/// In-memory cache of messages, contacts and chats, mirrored to a JSON file.
///
/// Load and flush never fail the caller: a corrupt or missing snapshot
/// falls back to the empty cache, a failed flush is skipped. The accepted
/// data-loss window across a crash is one flush interval.
pub struct SnapshotStore {
    path: PathBuf,
    cache: RwLock<Snapshot>,
}

impl SnapshotStore {
    /// Create an empty store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(Snapshot::default()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the cache with the backing file's contents, if it exists
    /// and parses. Failures are logged and leave the cache untouched.
    pub fn load(&self) {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                log::warn!("failed to read snapshot {}: {err}", self.path.display());
                return;
            }
        };
        match serde_json::from_str::<Snapshot>(&contents) {
            Ok(snapshot) => {
                *self.write_cache() = snapshot;
            }
            Err(err) => {
                log::warn!("failed to parse snapshot {}: {err}", self.path.display());
            }
        }
    }

    /// Serialize the whole cache and overwrite the backing file.
    /// Failures are logged and the flush is skipped.
    pub fn flush(&self) {
        let serialized = {
            let cache = self.read_cache();
            serde_json::to_string(&*cache)
        };
        match serialized {
            Ok(data) => {
                if let Err(err) = fs::write(&self.path, data) {
                    log::warn!("failed to write snapshot {}: {err}", self.path.display());
                }
            }
            Err(err) => log::warn!("failed to serialize snapshot: {err}"),
        }
    }

    /// Record an inbound message under its message ID.
    pub fn record_message(&self, id: impl Into<String>, record: Value) {
        self.write_cache().messages.insert(id.into(), record);
    }

    /// Insert or replace a contact record.
    pub fn upsert_contact(&self, jid: impl Into<String>, record: Value) {
        self.write_cache().contacts.insert(jid.into(), record);
    }

    /// Insert or replace a chat record.
    pub fn upsert_chat(&self, jid: impl Into<String>, record: Value) {
        self.write_cache().chats.insert(jid.into(), record);
    }

    /// Clone the current cache contents.
    pub fn snapshot(&self) -> Snapshot {
        self.read_cache().clone()
    }

    /// Spawn the background flush timer for the lifetime of the process.
    pub fn spawn_flush_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so flushes
            // start one interval after launch.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.flush();
            }
        })
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }
}
