//! Step execution primitives.
//!
//! A workflow is a graph of named steps. Each step body receives the current
//! run state and returns one of three outcomes:
//!
//! - [`StepOutcome::Advance`]: a state delta plus an implicit move to the
//!   step's single declared successor,
//! - [`StepOutcome::Goto`]: a routing command naming one of the step's
//!   declared alternatives,
//! - [`StepOutcome::Suspend`]: a [`SuspensionToken`] asking the executor to
//!   persist the run and solicit an out-of-band decision.
//!
//! Suspension is a value returned to the executor, never unwinding. On
//! resume the executor re-dispatches the suspended step with the decision
//! available through [`StepContext::take_decision`], so the step's approval
//! call behaves as if it had returned that value.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::event::EventEmitter;
use crate::state::{StateUpdate, WorkflowState};

/// Risk classification carried by a suspension token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Value a step returns to request external input.
///
/// A run carries at most one live token at a time; the executor persists it
/// in the suspension checkpoint and surfaces it through the
/// `approval_required` event and the non-streaming `interrupt_data` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspensionToken {
    /// Stable operation name, e.g. `generate_invoice`.
    pub operation: String,
    /// Domain-qualified operation type, e.g. `hotel_invoice`.
    pub operation_type: String,
    pub risk_level: RiskLevel,
    /// Structured details for the approving client.
    pub details: Value,
    /// Rendered multi-line preview for human inspection.
    pub preview: String,
    /// Prompt shown next to the approve/reject controls.
    pub action: String,
}

/// Result of one step dispatch.
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// Merge the delta and advance to the single declared successor.
    Advance { update: StateUpdate },
    /// Merge the delta and route to one of the declared alternatives.
    Goto {
        target: String,
        update: StateUpdate,
        /// Records this name in `steps_completed` instead of the step's
        /// static label. Lets one step report distinct outcomes, e.g.
        /// `skip_material_request` when a gate was never raised.
        label: Option<String>,
    },
    /// Persist the run and wait for an out-of-band decision.
    Suspend { token: SuspensionToken },
}

impl StepOutcome {
    /// Plain advance with no state change.
    #[must_use]
    pub fn advance() -> Self {
        StepOutcome::Advance {
            update: StateUpdate::default(),
        }
    }

    #[must_use]
    pub fn advance_with(update: StateUpdate) -> Self {
        StepOutcome::Advance { update }
    }

    #[must_use]
    pub fn goto(target: impl Into<String>, update: StateUpdate) -> Self {
        StepOutcome::Goto {
            target: target.into(),
            update,
            label: None,
        }
    }

    /// Route like [`goto`](Self::goto), recording `label` as the completed
    /// step name.
    #[must_use]
    pub fn goto_as(
        target: impl Into<String>,
        label: impl Into<String>,
        update: StateUpdate,
    ) -> Self {
        StepOutcome::Goto {
            target: target.into(),
            update,
            label: Some(label.into()),
        }
    }

    #[must_use]
    pub fn suspend(token: SuspensionToken) -> Self {
        StepOutcome::Suspend { token }
    }
}

/// Execution context handed to a step body for one dispatch.
#[derive(Clone)]
pub struct StepContext {
    /// Thread id of the run being driven.
    pub thread_id: String,
    /// Name of the graph the run belongs to.
    pub graph_name: String,
    /// Dispatch counter within the run (1-based).
    pub step: u64,
    decision: Option<Value>,
    emitter: Arc<dyn EventEmitter>,
}

impl StepContext {
    pub(crate) fn new(
        thread_id: String,
        graph_name: String,
        step: u64,
        decision: Option<Value>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            thread_id,
            graph_name,
            step,
            decision,
            emitter,
        }
    }

    /// Consume the resume decision, if this dispatch is a resumption.
    ///
    /// Returns `Some` exactly once, on the first dispatch of a resumed step.
    /// Fresh dispatches see `None` and an approval gate will suspend.
    pub fn take_decision(&mut self) -> Option<Value> {
        self.decision.take()
    }

    /// Whether a resume decision is waiting to be consumed.
    #[must_use]
    pub fn has_decision(&self) -> bool {
        self.decision.is_some()
    }

    /// Emitter for the run's event stream, used by the step kit.
    #[must_use]
    pub fn emitter(&self) -> &Arc<dyn EventEmitter> {
        &self.emitter
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("thread_id", &self.thread_id)
            .field("graph_name", &self.graph_name)
            .field("step", &self.step)
            .field("has_decision", &self.decision.is_some())
            .finish()
    }
}

/// Errors a step body can signal.
///
/// A `StepError` is a node failure: the executor records it in the run's
/// error history, emits `workflow_error`, and routes the run to the
/// rejected terminal. It never panics the service.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    /// Expected input data is missing from the run state.
    #[error("missing expected field: {what}")]
    #[diagnostic(
        code(graphmill::step::missing_field),
        help("Check that a previous step produced `{what}` or that it was part of the initial state.")
    )]
    MissingField { what: &'static str },

    /// A field was present but unusable.
    #[error("invalid field value: {0}")]
    #[diagnostic(code(graphmill::step::invalid_field))]
    InvalidField(String),

    /// JSON (de)serialization of typed fields failed.
    #[error(transparent)]
    #[diagnostic(code(graphmill::step::serde))]
    Serde(#[from] serde_json::Error),

    /// The step's operation failed.
    #[error("step failed: {0}")]
    #[diagnostic(code(graphmill::step::failed))]
    Failed(String),
}

/// A named unit of work within a workflow graph.
///
/// Implementations must be stateless with respect to the run: all run data
/// flows through the state snapshot and the returned outcome. One compiled
/// graph (and therefore one step instance) is shared by many concurrent
/// runs.
#[async_trait]
pub trait StepNode: Send + Sync {
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: StepContext,
    ) -> Result<StepOutcome, StepError>;
}
