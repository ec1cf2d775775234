//! Redis-backed checkpoint store.
//!
//! The reference deployment keeps run state in an external key-value
//! server; this backend writes checkpoints with `SET ... EX` and refreshes
//! TTLs with `EXPIRE`, using the shared key layout so deployments written
//! against other runtimes can read the same data.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{
    checkpoint_key, checkpoint_prefix, decode_checkpoint, encode_checkpoint,
    encode_thread_metadata, metadata_key, Checkpoint, CheckpointStore, Result, StoreConfig,
    StoreError,
};

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}

/// Checkpoint store backed by a Redis-compatible server.
pub struct RedisCheckpointStore {
    manager: ConnectionManager,
    config: StoreConfig,
}

impl RedisCheckpointStore {
    /// Connect to the server at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str, config: StoreConfig) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::info!(namespace = %config.namespace, "connected redis checkpoint store");
        Ok(Self { manager, config })
    }

    fn ttl_secs(&self) -> u64 {
        self.config.ttl.as_secs().max(1)
    }

    async fn scan_thread_keys(&self, thread_id: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", checkpoint_prefix(&self.config.namespace, thread_id));
        let mut conn = self.manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn extend(&self, thread_id: &str, checkpoint_id: &str) -> Result<()> {
        let ns = &self.config.namespace;
        let ttl = self.ttl_secs() as i64;
        let mut conn = self.manager.clone();
        let _: bool = conn
            .expire(checkpoint_key(ns, thread_id, checkpoint_id), ttl)
            .await?;
        let _: bool = conn.expire(metadata_key(ns, thread_id), ttl).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let ns = &self.config.namespace;
        let ttl = self.ttl_secs();
        let mut conn = self.manager.clone();
        let key = checkpoint_key(ns, &checkpoint.thread_id, &checkpoint.checkpoint_id);
        let _: () = conn.set_ex(key, encode_checkpoint(checkpoint)?, ttl).await?;
        let _: () = conn
            .set_ex(
                metadata_key(ns, &checkpoint.thread_id),
                encode_thread_metadata(checkpoint)?,
                ttl,
            )
            .await?;
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let mut conn = self.manager.clone();
        let mut latest: Option<Checkpoint> = None;
        for key in self.scan_thread_keys(thread_id).await? {
            let bytes: Option<Vec<u8>> = conn.get(&key).await?;
            let Some(bytes) = bytes else { continue };
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
                self.extend(thread_id, &checkpoint.checkpoint_id).await?;
            }
        }
        Ok(latest)
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let key = checkpoint_key(&self.config.namespace, thread_id, checkpoint_id);
        let mut conn = self.manager.clone();
        let bytes: Option<Vec<u8>> = conn.get(&key).await?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        if self.config.extend_on_access {
            self.extend(thread_id, checkpoint_id).await?;
        }
        Ok(Some(decode_checkpoint(&bytes)?))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let mut conn = self.manager.clone();
        let mut checkpoints = Vec::new();
        for key in self.scan_thread_keys(thread_id).await? {
            let bytes: Option<Vec<u8>> = conn.get(&key).await?;
            if let Some(bytes) = bytes {
                checkpoints.push(decode_checkpoint(&bytes)?);
            }
        }
        checkpoints.sort_by(|a, b| {
            (a.created_at, &a.checkpoint_id).cmp(&(b.created_at, &b.checkpoint_id))
        });
        Ok(checkpoints)
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager tears down with the last clone.
        Ok(())
    }
}
