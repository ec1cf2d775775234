//! Checkpoint persistence for pause/resume.
//!
//! A checkpoint is the complete run state at a node boundary, written
//! before each dispatch so a resume is idempotent under crashes. Stores
//! keep checkpoints under a TTL and may extend it on access.
//!
//! # Key layout
//!
//! Bit-exact for interoperable deployments:
//!
//! ```text
//! {namespace}:checkpoint:{thread_id}:{checkpoint_id}
//! {namespace}:metadata:{thread_id}
//! ```
//!
//! Checkpoint values are an opaque binary blob (the state serialized by a
//! stable JSON encoder); thread metadata is a textual JSON object.
//!
//! # Concurrency contract
//!
//! At most one writer per thread id at any time — the executor never runs
//! two drives for the same thread. Readers may run concurrently with each
//! other and the writer; a reader sees either an old checkpoint or the
//! full new one, never a torn write.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::node::SuspensionToken;
use crate::state::WorkflowState;

pub use self::memory::MemoryCheckpointStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisCheckpointStore;

/// Default namespace shared with interoperable deployments.
pub const DEFAULT_NAMESPACE: &str = "langgraph";
/// Default checkpoint TTL.
pub const DEFAULT_TTL_HOURS: u64 = 24;

/// Execution context persisted alongside the state snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Graph name, used by resume to re-hydrate the compiled graph.
    pub graph_name: String,
    /// Node the snapshot precedes (the next node to dispatch).
    pub next_node: String,
    /// Dispatch count at snapshot time, resumes the recursion bound.
    pub step: u64,
    /// Present exactly when the run is suspended awaiting a decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<SuspensionToken>,
}

/// A durable snapshot of one run at a node boundary.
///
/// Checkpoints are immutable; a thread's "latest" is the one with the
/// greatest timestamp (ties broken by id, which is monotonic within the
/// thread).
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Zero-padded monotonic checkpoint id; lexical order equals numeric
    /// order so backends can sort keys directly.
    #[must_use]
    pub fn id_for_seq(seq: u64) -> String {
        format!("{seq:08}")
    }

    /// Inverse of [`id_for_seq`](Self::id_for_seq); `None` for foreign ids.
    #[must_use]
    pub fn seq_of(checkpoint_id: &str) -> Option<u64> {
        checkpoint_id.parse().ok()
    }
}

/// Store tuning shared by every backend.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub ttl: Duration,
    pub namespace: String,
    /// Refresh the TTL of a checkpoint (and the thread metadata) on read.
    pub extend_on_access: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_HOURS * 3600),
            namespace: DEFAULT_NAMESPACE.to_string(),
            extend_on_access: true,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    #[must_use]
    pub fn with_extend_on_access(mut self, extend: bool) -> Self {
        self.extend_on_access = extend;
        self
    }
}

/// Key of one checkpoint value.
#[must_use]
pub fn checkpoint_key(namespace: &str, thread_id: &str, checkpoint_id: &str) -> String {
    format!("{namespace}:checkpoint:{thread_id}:{checkpoint_id}")
}

/// Key prefix under which a thread's checkpoints live.
#[must_use]
pub fn checkpoint_prefix(namespace: &str, thread_id: &str) -> String {
    format!("{namespace}:checkpoint:{thread_id}:")
}

/// Key of the per-thread metadata object.
#[must_use]
pub fn metadata_key(namespace: &str, thread_id: &str) -> String {
    format!("{namespace}:metadata:{thread_id}")
}

/// Errors from checkpoint store operations.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// Backend storage error (connection, command, I/O).
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(
        code(graphmill::checkpoint::backend),
        help("Check backend connectivity and permissions; backend message: {message}.")
    )]
    Backend { message: String },

    /// Serialization of a checkpoint value failed.
    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(code(graphmill::checkpoint::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Abstract contract for checkpoint persistence.
///
/// The executor is unaware of TTLs; expiry and extension live entirely in
/// the implementation.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write a checkpoint with the configured TTL. Each checkpoint has a
    /// unique id, so a put never overwrites a prior checkpoint.
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// The checkpoint with the greatest timestamp, or `None`. Extends the
    /// TTL of the hit and the thread metadata when configured.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// A specific checkpoint; same TTL extension policy as `get_latest`.
    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// All live checkpoints of the thread, oldest first.
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// Release held resources.
    async fn close(&self) -> Result<()>;
}

/* ---------- Persisted shapes ----------
Explicit serde structs decoupled from the in-memory representation, so the
backend code stays lean and the wire encoding is stable. */

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCheckpoint {
    thread_id: String,
    checkpoint_id: String,
    state: WorkflowState,
    /// RFC3339 creation time; keeps the chrono type out of the encoding.
    created_at: String,
    metadata: CheckpointMetadata,
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            thread_id: cp.thread_id.clone(),
            checkpoint_id: cp.checkpoint_id.clone(),
            state: cp.state.clone(),
            created_at: cp.created_at.to_rfc3339(),
            metadata: cp.metadata.clone(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self {
            thread_id: p.thread_id,
            checkpoint_id: p.checkpoint_id,
            state: p.state,
            created_at,
            metadata: p.metadata,
        }
    }
}

/// Per-thread metadata value (textual JSON at the metadata key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub graph_name: String,
    pub latest_checkpoint_id: String,
    pub updated_at: String,
}

/// Encode a checkpoint into its stored binary form.
pub fn encode_checkpoint(checkpoint: &Checkpoint) -> Result<Vec<u8>> {
    serde_json::to_vec(&PersistedCheckpoint::from(checkpoint))
        .map_err(|source| StoreError::Serde { source })
}

/// Decode a checkpoint from its stored binary form.
pub fn decode_checkpoint(bytes: &[u8]) -> Result<Checkpoint> {
    let persisted: PersistedCheckpoint =
        serde_json::from_slice(bytes).map_err(|source| StoreError::Serde { source })?;
    Ok(persisted.into())
}

pub(crate) fn encode_thread_metadata(checkpoint: &Checkpoint) -> Result<String> {
    serde_json::to_string(&ThreadMetadata {
        graph_name: checkpoint.metadata.graph_name.clone(),
        latest_checkpoint_id: checkpoint.checkpoint_id.clone(),
        updated_at: checkpoint.created_at.to_rfc3339(),
    })
    .map_err(|source| StoreError::Serde { source })
}
