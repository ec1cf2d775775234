//! # Graphmill: durable, interruptible workflow execution
//!
//! Graphmill runs directed, stateful business processes as graphs of named
//! steps. A step advances to its declared successor, routes among a finite
//! set of alternatives, or suspends the run for an out-of-band human
//! approval; resumption continues from a persisted checkpoint at the exact
//! suspension point. Progress streams to callers as typed events over
//! long-lived HTTP responses.
//!
//! ## Core concepts
//!
//! - **Graph**: immutable description of steps and transitions, compiled
//!   once and shared by every concurrent run ([`graph`])
//! - **Registry**: name → descriptor, schema validation, cached graph
//!   loading ([`registry`])
//! - **Executor**: sequential step dispatch with pre-dispatch
//!   checkpointing, suspension, resumption, cancellation, and a recursion
//!   bound ([`executor`])
//! - **Checkpoint store**: TTL-bound snapshots keyed by thread id
//!   ([`checkpoint`])
//! - **Events**: strictly ordered progress stream with SSE framing
//!   ([`event`])
//! - **Step kit**: approval gates, retry with backoff, escalation, and
//!   notifications for step bodies ([`steps`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graphmill::checkpoint::MemoryCheckpointStore;
//! use graphmill::event::EventBus;
//! use graphmill::executor::{ExecutionConfig, Executor};
//! use graphmill::graphs::default_registry;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(default_registry());
//! let store = Arc::new(MemoryCheckpointStore::default());
//! let executor = Executor::new(registry, store);
//!
//! let initial = json!({
//!     "reservation_id": "RES-1",
//!     "guest_name": "J",
//!     "room_number": "101",
//!     "check_in_date": "2025-10-01",
//!     "check_out_date": "2025-10-02",
//! });
//! let bus = EventBus::default();
//! let result = executor
//!     .execute(
//!         "hotel_o2c",
//!         initial.as_object().cloned().unwrap_or_default(),
//!         ExecutionConfig::default(),
//!         &bus,
//!     )
//!     .await?;
//! assert!(result.interrupted); // paused at the check-in approval gate
//!
//! let resumed = executor
//!     .resume(&result.thread_id, json!("approve"), ExecutionConfig::default(), &bus)
//!     .await?;
//! # let _ = resumed;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod event;
pub mod executor;
pub mod graph;
pub mod graphs;
pub mod node;
pub mod registry;
pub mod server;
pub mod state;
pub mod steps;
