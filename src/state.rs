//! Shared run-state schema for workflow execution.
//!
//! Every run carries the same base record (current step, completed steps,
//! error history, approval tracking) regardless of industry. Domain-specific
//! fields extend the state through an open JSON map that serializes flat
//! alongside the base fields, so the wire form of a run state is a single
//! JSON object.
//!
//! # Core Types
//!
//! - [`WorkflowState`]: the complete state of one run
//! - [`StateUpdate`]: the delta a step body returns to the executor
//! - [`WorkflowErrorRecord`]: one entry in the append-only error history
//!
//! # Examples
//!
//! ```rust
//! use graphmill::state::{create_base_state, WorkflowState};
//! use serde_json::json;
//!
//! let mut state = create_base_state("start");
//! state.fields.insert("reservation_id".into(), json!("RES-1"));
//!
//! assert_eq!(state.current_step, "start");
//! assert!(state.steps_completed.is_empty());
//! assert!(!state.pending_approval);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal value of `current_step` after a successful run.
pub const STEP_COMPLETED: &str = "completed";
/// Terminal value of `current_step` after a rejected run.
pub const STEP_REJECTED: &str = "rejected";

/// Severity attached to a [`WorkflowErrorRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Resolution of an approval gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// One entry in a run's append-only error history.
///
/// Node failures, rejected approvals, cancellations, and recursion-limit
/// overruns all land here. The record never removes entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowErrorRecord {
    /// Step name the failure is attributed to.
    pub step: String,
    /// Human-readable reason.
    pub reason: String,
    #[serde(default = "WorkflowErrorRecord::default_severity")]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl WorkflowErrorRecord {
    fn default_severity() -> Severity {
        Severity::Error
    }

    pub fn new(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            reason: reason.into(),
            severity: Severity::Error,
            details: None,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// How a run was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Canvas,
    Agent,
    Api,
    Manual,
}

/// Optional metadata the executor stamps on a run at start.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
}

/// Complete state of one workflow run.
///
/// The base fields are always present; industry-specific fields live in
/// [`fields`](Self::fields) and serialize flattened into the same JSON
/// object, so `{"current_step": "...", "reservation_id": "..."}` is one
/// level deep on the wire.
///
/// The open map is a [`serde_json::Map`] (sorted keys) rather than a hash
/// map so the serialized form is stable and checkpoint round-trips are
/// byte-identical.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Name of the node about to run, or `completed` / `rejected`.
    pub current_step: String,
    /// Append-only ordered list of finished step names.
    pub steps_completed: Vec<String>,
    /// Append-only error history.
    pub errors: Vec<WorkflowErrorRecord>,
    /// True exactly while a suspension is awaiting a resume decision.
    pub pending_approval: bool,
    /// Latest approval resolution, if any gate has resolved.
    pub approval_decision: Option<ApprovalDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
    /// Industry-specific fields, flattened into the wire object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WorkflowState {
    /// Deserialize the open field map into a typed per-graph struct.
    ///
    /// Step bodies use this to work with typed fields while the executor
    /// stays generic over the flat map. Unknown keys are ignored by serde,
    /// so base fields and foreign extras do not interfere.
    pub fn decode_fields<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    /// Apply a step's [`StateUpdate`] to this state.
    ///
    /// Field writes overwrite existing keys; errors append; an approval
    /// decision replaces the previous one. `pending_approval` is managed by
    /// the executor, not by updates.
    pub fn apply(&mut self, update: StateUpdate) {
        for (key, value) in update.fields {
            self.fields.insert(key, value);
        }
        self.errors.extend(update.errors);
        if let Some(decision) = update.approval_decision {
            self.approval_decision = Some(decision);
        }
    }

    /// Full state as a JSON value (the shape carried by progress events).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// True once the run has reached a terminal `current_step`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_step == STEP_COMPLETED || self.current_step == STEP_REJECTED
    }
}

/// Delta returned by a step body.
///
/// All parts are optional: a pass-through step returns
/// `StateUpdate::default()`. The executor merges the delta and does the
/// `current_step` / `steps_completed` bookkeeping itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    pub fields: Map<String, Value>,
    pub errors: Vec<WorkflowErrorRecord>,
    pub approval_decision: Option<ApprovalDecision>,
}

impl StateUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single domain field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Merge every field of a serializable struct into the update.
    ///
    /// Only works for structs that serialize to a JSON object; anything else
    /// is ignored.
    #[must_use]
    pub fn with_fields_from<T: Serialize>(mut self, fields: &T) -> Self {
        if let Ok(Value::Object(map)) = serde_json::to_value(fields) {
            for (key, value) in map {
                self.fields.insert(key, value);
            }
        }
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: WorkflowErrorRecord) -> Self {
        self.errors.push(error);
        self
    }

    #[must_use]
    pub fn with_decision(mut self, decision: ApprovalDecision) -> Self {
        self.approval_decision = Some(decision);
        self
    }
}

/// Initialize a run state with the base fields every workflow carries.
#[must_use]
pub fn create_base_state(initial_step: &str) -> WorkflowState {
    WorkflowState {
        current_step: initial_step.to_string(),
        steps_completed: Vec::new(),
        errors: Vec::new(),
        pending_approval: false,
        approval_decision: None,
        metadata: None,
        fields: Map::new(),
    }
}
