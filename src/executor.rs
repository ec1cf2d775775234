//! Run execution: dispatch, suspension, resumption, cancellation.
//!
//! The executor drives one run at a time per thread id, sequentially
//! dispatching steps on the run's own task while many runs proceed
//! concurrently. Before every dispatch it writes a pre-dispatch checkpoint,
//! so a crash resumes idempotently at the same node. A suspension persists
//! the run and returns control to the caller; `resume` re-enters at the
//! captured node with the decision value.
//!
//! Event emission is synchronous and strictly ordered within a run:
//! `step_complete` for a node precedes any dispatch of its successor,
//! `approval_required` precedes `workflow_paused`, and nothing follows a
//! terminal event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointMetadata, CheckpointStore, StoreError};
use crate::event::{EventBus, Progress, ProgressEvent};
use crate::graph::{is_terminal, SuccessorSpec, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE};
use crate::node::{StepContext, StepOutcome, SuspensionToken};
use crate::registry::{Registry, RegistryError, ValidationError};
use crate::state::{
    RunMetadata, Trigger, WorkflowErrorRecord, WorkflowState, STEP_COMPLETED, STEP_REJECTED,
};

/// Default bound on node dispatches per run.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Cooperative cancellation flag for one run.
///
/// The executor checks the flag at each node boundary; in-flight step
/// bodies are not forcibly interrupted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run execution settings.
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    /// Adopt this thread id instead of generating a fresh one.
    pub thread_id: Option<String>,
    pub recursion_limit: usize,
    pub cancel: Option<CancelToken>,
    pub initiated_by: Option<String>,
    pub trigger: Option<Trigger>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            cancel: None,
            initiated_by: None,
            trigger: None,
        }
    }
}

/// Terminal disposition of a drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Paused,
    Rejected,
    Error,
}

/// Outcome of `execute` / `resume` once the drive has started.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub graph_name: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// True when the run stopped at a suspension.
    pub interrupted: bool,
    pub final_state: WorkflowState,
    pub interrupt: Option<SuspensionToken>,
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Completed and paused runs count as successful drives.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Paused)
    }
}

/// Pre-flight and precondition failures.
///
/// These surface to the caller before any event is emitted; everything that
/// happens after the drive starts is reported through events and the
/// [`ExecutionResult`].
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error("State validation failed: {0}")]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid initial state: {message}")]
    #[diagnostic(code(graphmill::executor::invalid_state))]
    InvalidState { message: String },

    #[error("thread `{thread_id}` already has an active run")]
    #[diagnostic(
        code(graphmill::executor::conflict),
        help("At most one writer per thread id; wait for the active run to pause or finish.")
    )]
    Conflict { thread_id: String },

    #[error("unknown thread: {thread_id}")]
    #[diagnostic(code(graphmill::executor::unknown_thread))]
    UnknownThread { thread_id: String },

    #[error("thread `{thread_id}` is not suspended")]
    #[diagnostic(
        code(graphmill::executor::not_suspended),
        help("Only a paused run can receive a resume decision.")
    )]
    NotSuspended { thread_id: String },

    #[error(transparent)]
    #[diagnostic(code(graphmill::executor::store))]
    Store(#[from] StoreError),
}

/// Removes the thread id from the active set when the drive ends.
struct ActiveGuard {
    active: Arc<Mutex<FxHashSet<String>>>,
    thread_id: String,
}

impl ActiveGuard {
    fn acquire(
        active: &Arc<Mutex<FxHashSet<String>>>,
        thread_id: &str,
    ) -> Result<Self, ExecutorError> {
        if !active.lock().insert(thread_id.to_string()) {
            return Err(ExecutorError::Conflict {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(Self {
            active: Arc::clone(active),
            thread_id: thread_id.to_string(),
        })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.thread_id);
    }
}

/// A validated, loaded, guard-held run ready to drive.
///
/// Splitting preparation from the drive lets the HTTP layer report
/// pre-flight failures with a status code before it commits to a
/// streaming response.
pub struct PreparedRun {
    graph: Arc<WorkflowGraph>,
    graph_name: String,
    state: WorkflowState,
    thread_id: String,
    config: ExecutionConfig,
    estimated_steps: Option<u32>,
    start_node: String,
    seq: u64,
    dispatched: usize,
    decision: Option<Value>,
    emit_start: bool,
    _guard: ActiveGuard,
}

impl PreparedRun {
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    #[must_use]
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }
}

/// Drives runs against a registry and a checkpoint store.
pub struct Executor {
    registry: Arc<Registry>,
    store: Arc<dyn CheckpointStore>,
    active: Arc<Mutex<FxHashSet<String>>>,
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<Registry>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            registry,
            store,
            active: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validate, load, and stage a fresh run. No events are emitted here.
    pub fn prepare(
        &self,
        graph_name: &str,
        initial_state: Map<String, Value>,
        config: ExecutionConfig,
    ) -> Result<PreparedRun, ExecutorError> {
        let descriptor = self
            .registry
            .get(graph_name)
            .ok_or_else(|| self.registry.unknown(graph_name))?;
        let estimated_steps = Some(descriptor.estimated_steps);
        let industry = descriptor.industry.clone();

        let mut fields = initial_state;
        self.registry.validate(graph_name, &mut fields)?;
        let graph = self.registry.load(graph_name)?;

        let mut state: WorkflowState =
            serde_json::from_value(Value::Object(fields)).map_err(|e| {
                ExecutorError::InvalidState {
                    message: e.to_string(),
                }
            })?;

        let thread_id = config
            .thread_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let guard = ActiveGuard::acquire(&self.active, &thread_id)?;

        state.metadata = Some(RunMetadata {
            workflow_name: Some(graph_name.to_string()),
            industry: Some(industry),
            run_id: Some(thread_id.clone()),
            initiated_by: config.initiated_by.clone(),
            trigger: config.trigger.or(Some(Trigger::Api)),
        });

        let start_node = graph.entry().to_string();
        Ok(PreparedRun {
            graph,
            graph_name: graph_name.to_string(),
            state,
            thread_id,
            config,
            estimated_steps,
            start_node,
            seq: 0,
            dispatched: 0,
            decision: None,
            emit_start: true,
            _guard: guard,
        })
    }

    /// Stage a resumption from the latest checkpoint of `thread_id`.
    pub async fn prepare_resume(
        &self,
        thread_id: &str,
        decision: Value,
        config: ExecutionConfig,
    ) -> Result<PreparedRun, ExecutorError> {
        let latest = self
            .store
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| ExecutorError::UnknownThread {
                thread_id: thread_id.to_string(),
            })?;
        if latest.metadata.suspension.is_none() {
            return Err(ExecutorError::NotSuspended {
                thread_id: thread_id.to_string(),
            });
        }

        let graph_name = latest.metadata.graph_name.clone();
        let graph = self.registry.load(&graph_name)?;
        let estimated_steps = self.registry.get(&graph_name).map(|d| d.estimated_steps);
        let guard = ActiveGuard::acquire(&self.active, thread_id)?;

        let mut state = latest.state;
        state.pending_approval = false;

        Ok(PreparedRun {
            graph,
            graph_name,
            state,
            thread_id: thread_id.to_string(),
            config,
            estimated_steps,
            start_node: latest.metadata.next_node,
            seq: Checkpoint::seq_of(&latest.checkpoint_id).unwrap_or(latest.metadata.step),
            // Re-dispatching the suspended node does not consume extra budget.
            dispatched: (latest.metadata.step as usize).saturating_sub(1),
            decision: Some(decision),
            emit_start: false,
            _guard: guard,
        })
    }

    /// Prepare and drive in one call.
    pub async fn execute(
        &self,
        graph_name: &str,
        initial_state: Map<String, Value>,
        config: ExecutionConfig,
        bus: &EventBus,
    ) -> Result<ExecutionResult, ExecutorError> {
        let prepared = self.prepare(graph_name, initial_state, config)?;
        Ok(self.run(prepared, bus).await)
    }

    /// Deliver a decision to a suspended run and drive to the next boundary.
    pub async fn resume(
        &self,
        thread_id: &str,
        decision: Value,
        config: ExecutionConfig,
        bus: &EventBus,
    ) -> Result<ExecutionResult, ExecutorError> {
        let prepared = self.prepare_resume(thread_id, decision, config).await?;
        Ok(self.run(prepared, bus).await)
    }

    /// Drive a prepared run to a terminal state or a suspension.
    #[instrument(skip_all, fields(graph = %prepared.graph_name, thread = %prepared.thread_id))]
    pub async fn run(&self, prepared: PreparedRun, bus: &EventBus) -> ExecutionResult {
        let PreparedRun {
            graph,
            graph_name,
            mut state,
            thread_id,
            config,
            estimated_steps,
            start_node,
            mut seq,
            mut dispatched,
            mut decision,
            emit_start,
            _guard,
        } = prepared;

        let emitter = bus.emitter();
        if emit_start {
            bus.emit(ProgressEvent::workflow_start(&graph_name, state.to_value()));
        }

        let mut current = start_node;
        let mut last_label = current.clone();

        loop {
            if config.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::info!("run cancelled at node boundary");
                state.errors.push(WorkflowErrorRecord::new(&last_label, "cancelled"));
                state.pending_approval = false;
                state.current_step = STEP_REJECTED.to_string();
                bus.emit(ProgressEvent::workflow_error(&graph_name, "cancelled"));
                bus.emit(ProgressEvent::workflow_rejected(&graph_name, state.to_value()));
                return ExecutionResult {
                    graph_name,
                    thread_id,
                    status: RunStatus::Rejected,
                    interrupted: false,
                    final_state: state,
                    interrupt: None,
                    error: Some("cancelled".to_string()),
                };
            }

            if is_terminal(&current) {
                return self.finalize(&current, graph_name, thread_id, state, estimated_steps, bus);
            }

            if dispatched >= config.recursion_limit {
                tracing::warn!(limit = config.recursion_limit, "recursion limit exceeded");
                state
                    .errors
                    .push(WorkflowErrorRecord::new(&last_label, "recursion-limit-exceeded"));
                state.pending_approval = false;
                state.current_step = STEP_REJECTED.to_string();
                bus.emit(ProgressEvent::workflow_error_at(
                    &graph_name,
                    &last_label,
                    state.to_value(),
                ));
                return ExecutionResult {
                    graph_name,
                    thread_id,
                    status: RunStatus::Rejected,
                    interrupted: false,
                    final_state: state,
                    interrupt: None,
                    error: Some("recursion-limit-exceeded".to_string()),
                };
            }

            // Compile-time validation guarantees the node exists; a miss here
            // is a routing bug confined to this run.
            let Some(spec) = graph.spec(&current) else {
                state
                    .errors
                    .push(WorkflowErrorRecord::new(&current, "unknown node in route"));
                bus.emit(ProgressEvent::workflow_error_at(
                    &graph_name,
                    &current,
                    state.to_value(),
                ));
                current = REJECTED_NODE.to_string();
                continue;
            };

            dispatched += 1;
            seq += 1;
            let checkpoint = Checkpoint {
                thread_id: thread_id.clone(),
                checkpoint_id: Checkpoint::id_for_seq(seq),
                state: state.clone(),
                created_at: Utc::now(),
                metadata: CheckpointMetadata {
                    graph_name: graph_name.clone(),
                    next_node: current.clone(),
                    step: dispatched as u64,
                    suspension: None,
                },
            };
            if let Err(err) = self.store.put(&checkpoint).await {
                tracing::error!(error = %err, "pre-dispatch checkpoint write failed");
                bus.emit(ProgressEvent::workflow_error(&graph_name, "checkpoint-failed"));
                return ExecutionResult {
                    graph_name,
                    thread_id,
                    status: RunStatus::Error,
                    interrupted: false,
                    final_state: state,
                    interrupt: None,
                    error: Some(format!("checkpoint-failed: {err}")),
                };
            }

            let ctx = StepContext::new(
                thread_id.clone(),
                graph_name.clone(),
                dispatched as u64,
                decision.take(),
                Arc::clone(&emitter),
            );
            tracing::debug!(node = %spec.name, step = dispatched, "dispatching node");
            last_label = spec.label.clone();

            match spec.body.run(&state, ctx).await {
                Err(err) => {
                    tracing::warn!(node = %spec.name, error = %err, "node failure");
                    state
                        .errors
                        .push(WorkflowErrorRecord::new(&spec.label, err.to_string()));
                    bus.emit(ProgressEvent::workflow_error_at(
                        &graph_name,
                        &spec.label,
                        state.to_value(),
                    ));
                    current = REJECTED_NODE.to_string();
                }
                Ok(StepOutcome::Suspend { token }) => {
                    state.pending_approval = true;
                    seq += 1;
                    let suspension = Checkpoint {
                        thread_id: thread_id.clone(),
                        checkpoint_id: Checkpoint::id_for_seq(seq),
                        state: state.clone(),
                        created_at: Utc::now(),
                        metadata: CheckpointMetadata {
                            graph_name: graph_name.clone(),
                            next_node: current.clone(),
                            step: dispatched as u64,
                            suspension: Some(token.clone()),
                        },
                    };
                    if let Err(err) = self.store.put(&suspension).await {
                        tracing::error!(error = %err, "suspension checkpoint write failed");
                        bus.emit(ProgressEvent::workflow_error(&graph_name, "checkpoint-failed"));
                        return ExecutionResult {
                            graph_name,
                            thread_id,
                            status: RunStatus::Error,
                            interrupted: false,
                            final_state: state,
                            interrupt: None,
                            error: Some(format!("checkpoint-failed: {err}")),
                        };
                    }
                    bus.emit(ProgressEvent::approval_required(
                        &graph_name,
                        &spec.label,
                        state.to_value(),
                        token.clone(),
                    ));
                    bus.emit(ProgressEvent::workflow_paused(&graph_name, state.to_value()));
                    return ExecutionResult {
                        graph_name,
                        thread_id,
                        status: RunStatus::Paused,
                        interrupted: true,
                        final_state: state,
                        interrupt: Some(token),
                        error: None,
                    };
                }
                Ok(StepOutcome::Advance { update }) => {
                    let target = match &spec.successors {
                        Some(SuccessorSpec::AdvanceTo(target)) => target.clone(),
                        _ => {
                            state.errors.push(WorkflowErrorRecord::new(
                                &spec.label,
                                "step advanced without a declared successor",
                            ));
                            bus.emit(ProgressEvent::workflow_error_at(
                                &graph_name,
                                &spec.label,
                                state.to_value(),
                            ));
                            current = REJECTED_NODE.to_string();
                            continue;
                        }
                    };
                    self.transition(
                        &graph_name,
                        spec.label.clone(),
                        &target,
                        update,
                        &mut state,
                        estimated_steps,
                        bus,
                    );
                    current = target;
                }
                Ok(StepOutcome::Goto { target, update, label }) => {
                    let declared = matches!(
                        &spec.successors,
                        Some(SuccessorSpec::ChooseAmong(targets)) if targets.contains(&target)
                    );
                    if !declared {
                        state.errors.push(WorkflowErrorRecord::new(
                            &spec.label,
                            format!("route to undeclared successor `{target}`"),
                        ));
                        bus.emit(ProgressEvent::workflow_error_at(
                            &graph_name,
                            &spec.label,
                            state.to_value(),
                        ));
                        current = REJECTED_NODE.to_string();
                        continue;
                    }
                    let label = label.unwrap_or_else(|| spec.label.clone());
                    self.transition(
                        &graph_name,
                        label,
                        &target,
                        update,
                        &mut state,
                        estimated_steps,
                        bus,
                    );
                    current = target;
                }
            }
        }
    }

    /// Merge a step's delta and do the bookkeeping for moving to `target`.
    #[allow(clippy::too_many_arguments)]
    fn transition(
        &self,
        graph_name: &str,
        label: String,
        target: &str,
        update: crate::state::StateUpdate,
        state: &mut WorkflowState,
        estimated_steps: Option<u32>,
        bus: &EventBus,
    ) {
        state.apply(update);
        // A route into rejection records errors instead of progress.
        if target != REJECTED_NODE {
            state.steps_completed.push(label.clone());
        }
        state.current_step = match target {
            COMPLETED_NODE => STEP_COMPLETED.to_string(),
            REJECTED_NODE => STEP_REJECTED.to_string(),
            other => other.to_string(),
        };
        let progress = Progress::from_counts(state.steps_completed.len(), estimated_steps);
        bus.emit(ProgressEvent::step_complete(
            graph_name,
            &label,
            state.to_value(),
            progress,
        ));
    }

    fn finalize(
        &self,
        terminal: &str,
        graph_name: String,
        thread_id: String,
        mut state: WorkflowState,
        estimated_steps: Option<u32>,
        bus: &EventBus,
    ) -> ExecutionResult {
        state.pending_approval = false;
        if terminal == COMPLETED_NODE {
            state.current_step = STEP_COMPLETED.to_string();
            let progress = Progress::from_counts(state.steps_completed.len(), estimated_steps);
            bus.emit(ProgressEvent::workflow_complete(
                &graph_name,
                state.to_value(),
                progress,
            ));
            tracing::info!(steps = state.steps_completed.len(), "workflow completed");
            ExecutionResult {
                graph_name,
                thread_id,
                status: RunStatus::Completed,
                interrupted: false,
                final_state: state,
                interrupt: None,
                error: None,
            }
        } else {
            state.current_step = STEP_REJECTED.to_string();
            bus.emit(ProgressEvent::workflow_rejected(&graph_name, state.to_value()));
            let error = state.errors.last().map(|e| e.reason.clone());
            tracing::info!(reason = error.as_deref().unwrap_or(""), "workflow rejected");
            ExecutionResult {
                graph_name,
                thread_id,
                status: RunStatus::Rejected,
                interrupted: false,
                final_state: state,
                interrupt: None,
                error,
            }
        }
    }
}
