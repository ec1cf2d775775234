//! In-memory checkpoint store with TTL semantics.
//!
//! Keeps the same key layout and expiry behavior as the key-value backed
//! store so tests exercise the real contract, including activity-based TTL
//! extension. Expired entries are dropped lazily on read.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use super::{
    checkpoint_key, checkpoint_prefix, decode_checkpoint, encode_checkpoint,
    encode_thread_metadata, metadata_key, Checkpoint, CheckpointStore, Result, StoreConfig,
};

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Volatile checkpoint store for tests and single-process deployments.
pub struct MemoryCheckpointStore {
    entries: RwLock<FxHashMap<String, StoredValue>>,
    config: StoreConfig,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn set(&self, key: String, bytes: Vec<u8>) {
        let expires_at = Instant::now() + self.config.ttl;
        self.entries
            .write()
            .insert(key, StoredValue { bytes, expires_at });
    }

    /// Read a live value, optionally refreshing its TTL.
    fn read(&self, key: &str, extend: bool) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(value) if value.expires_at > now => {
                if extend {
                    value.expires_at = now + self.config.ttl;
                }
                Some(value.bytes.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn touch(&self, key: &str) {
        let now = Instant::now();
        if let Some(value) = self.entries.write().get_mut(key) {
            if value.expires_at > now {
                value.expires_at = now + self.config.ttl;
            }
        }
    }

    fn live_keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(key, value)| key.starts_with(prefix) && value.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let ns = &self.config.namespace;
        let key = checkpoint_key(ns, &checkpoint.thread_id, &checkpoint.checkpoint_id);
        self.set(key, encode_checkpoint(checkpoint)?);
        self.set(
            metadata_key(ns, &checkpoint.thread_id),
            encode_thread_metadata(checkpoint)?.into_bytes(),
        );
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let ns = &self.config.namespace;
        let prefix = checkpoint_prefix(ns, thread_id);
        let mut latest: Option<Checkpoint> = None;
        for key in self.live_keys_with_prefix(&prefix) {
            let Some(bytes) = self.read(&key, false) else {
                continue;
            };
            let candidate = decode_checkpoint(&bytes)?;
            let newer = latest.as_ref().is_none_or(|cur| {
                (candidate.created_at, &candidate.checkpoint_id)
                    > (cur.created_at, &cur.checkpoint_id)
            });
            if newer {
                latest = Some(candidate);
            }
        }
        if let Some(checkpoint) = &latest {
            if self.config.extend_on_access {
                self.touch(&checkpoint_key(ns, thread_id, &checkpoint.checkpoint_id));
                self.touch(&metadata_key(ns, thread_id));
            }
        }
        Ok(latest)
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let ns = &self.config.namespace;
        let key = checkpoint_key(ns, thread_id, checkpoint_id);
        let Some(bytes) = self.read(&key, self.config.extend_on_access) else {
            return Ok(None);
        };
        if self.config.extend_on_access {
            self.touch(&metadata_key(ns, thread_id));
        }
        Ok(Some(decode_checkpoint(&bytes)?))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let prefix = checkpoint_prefix(&self.config.namespace, thread_id);
        let mut checkpoints = Vec::new();
        for key in self.live_keys_with_prefix(&prefix) {
            if let Some(bytes) = self.read(&key, false) {
                checkpoints.push(decode_checkpoint(&bytes)?);
            }
        }
        checkpoints.sort_by(|a, b| {
            (a.created_at, &a.checkpoint_id).cmp(&(b.created_at, &b.checkpoint_id))
        });
        Ok(checkpoints)
    }

    async fn close(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}
