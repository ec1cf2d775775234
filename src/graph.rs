//! Workflow graph definition and compilation.
//!
//! A [`GraphBuilder`] collects named steps and their successor contracts,
//! then compiles into an immutable [`WorkflowGraph`] shared by every
//! concurrent run. Each step declares exactly one of:
//!
//! - a single successor (`add_edge`), consumed by [`StepOutcome::Advance`],
//! - a finite set of routing alternatives (`add_routes`), consumed by
//!   [`StepOutcome::Goto`].
//!
//! Two conventional terminal nodes, [`COMPLETED_NODE`] and
//! [`REJECTED_NODE`], are present in every compiled graph without
//! registration; routing into them finishes the run.
//!
//! [`StepOutcome::Advance`]: crate::node::StepOutcome::Advance
//! [`StepOutcome::Goto`]: crate::node::StepOutcome::Goto

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::node::StepNode;

/// Virtual entry marker; `add_edge(START, ...)` declares the entry node.
pub const START: &str = "START";
/// Terminal node for successful completion.
pub const COMPLETED_NODE: &str = "workflow_completed";
/// Terminal node for rejection (failed approvals, node failures).
pub const REJECTED_NODE: &str = "workflow_rejected";

/// Returns true for the two conventional terminal node names.
#[must_use]
pub fn is_terminal(node: &str) -> bool {
    node == COMPLETED_NODE || node == REJECTED_NODE
}

/// Declared successor contract of a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuccessorSpec {
    /// The step advances to this single named successor.
    AdvanceTo(String),
    /// The step returns a routing command naming one of these.
    ChooseAmong(Vec<String>),
}

pub(crate) struct StepSpec {
    pub name: String,
    /// Name appended to `steps_completed` when the step finishes; usually
    /// the node name, occasionally a shorter business label.
    pub label: String,
    pub body: Arc<dyn StepNode>,
    pub successors: Option<SuccessorSpec>,
}

/// Errors from graph construction.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph `{graph}` has no entry edge")]
    #[diagnostic(
        code(graphmill::graph::missing_entry),
        help("Add an edge from START to the first step.")
    )]
    MissingEntry { graph: String },

    #[error("graph `{graph}` references unknown step `{step}`")]
    #[diagnostic(code(graphmill::graph::unknown_step))]
    UnknownStep { graph: String, step: String },

    #[error("step `{step}` in graph `{graph}` declares no successor")]
    #[diagnostic(
        code(graphmill::graph::no_successor),
        help("Every non-terminal step needs add_edge or add_routes.")
    )]
    NoSuccessor { graph: String, step: String },

    #[error("duplicate step `{step}` in graph `{graph}`")]
    #[diagnostic(code(graphmill::graph::duplicate_step))]
    DuplicateStep { graph: String, step: String },
}

/// Builder for workflow graphs with a fluent API.
///
/// # Examples
///
/// ```rust,no_run
/// use graphmill::graph::{GraphBuilder, COMPLETED_NODE, REJECTED_NODE, START};
/// # use graphmill::node::{StepNode, StepContext, StepOutcome, StepError};
/// # use graphmill::state::WorkflowState;
/// # struct Gate; struct Work;
/// # #[async_trait::async_trait]
/// # impl StepNode for Gate {
/// #     async fn run(&self, _: &WorkflowState, _: StepContext) -> Result<StepOutcome, StepError> {
/// #         Ok(StepOutcome::advance())
/// #     }
/// # }
/// # #[async_trait::async_trait]
/// # impl StepNode for Work {
/// #     async fn run(&self, _: &WorkflowState, _: StepContext) -> Result<StepOutcome, StepError> {
/// #         Ok(StepOutcome::advance())
/// #     }
/// # }
///
/// let graph = GraphBuilder::new("example")
///     .add_step("gate", Gate)
///     .add_step("work", Work)
///     .add_edge(START, "gate")
///     .add_routes("gate", ["work", REJECTED_NODE])
///     .add_edge("work", COMPLETED_NODE)
///     .compile()
///     .unwrap();
/// assert_eq!(graph.entry(), "gate");
/// ```
pub struct GraphBuilder {
    name: String,
    steps: Vec<StepSpec>,
    index: FxHashMap<String, usize>,
    entry: Option<String>,
    duplicate: Option<String>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            index: FxHashMap::default(),
            entry: None,
            duplicate: None,
        }
    }

    /// Register a step whose completed label equals its name.
    #[must_use]
    pub fn add_step(self, name: &str, body: impl StepNode + 'static) -> Self {
        let label = name.to_string();
        self.add_step_labeled(name, &label, body)
    }

    /// Register a step with an explicit completed label.
    #[must_use]
    pub fn add_step_labeled(
        mut self,
        name: &str,
        label: &str,
        body: impl StepNode + 'static,
    ) -> Self {
        if self.index.contains_key(name) || is_terminal(name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
            return self;
        }
        self.index.insert(name.to_string(), self.steps.len());
        self.steps.push(StepSpec {
            name: name.to_string(),
            label: label.to_string(),
            body: Arc::new(body),
            successors: None,
        });
        self
    }

    /// Declare the single successor of `from`, or the entry when `from` is
    /// [`START`].
    #[must_use]
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        if from == START {
            self.entry = Some(to.to_string());
            return self;
        }
        if let Some(&i) = self.index.get(from) {
            self.steps[i].successors = Some(SuccessorSpec::AdvanceTo(to.to_string()));
        }
        self
    }

    /// Declare the routing alternatives of `from`.
    #[must_use]
    pub fn add_routes<'a>(mut self, from: &str, targets: impl IntoIterator<Item = &'a str>) -> Self {
        if let Some(&i) = self.index.get(from) {
            self.steps[i].successors = Some(SuccessorSpec::ChooseAmong(
                targets.into_iter().map(str::to_string).collect(),
            ));
        }
        self
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<WorkflowGraph, GraphError> {
        let graph = self.name.clone();
        if let Some(step) = self.duplicate {
            return Err(GraphError::DuplicateStep { graph, step });
        }
        let entry = self.entry.ok_or_else(|| GraphError::MissingEntry {
            graph: graph.clone(),
        })?;
        if !self.index.contains_key(entry.as_str()) {
            return Err(GraphError::UnknownStep { graph, step: entry });
        }
        for spec in &self.steps {
            let successors = spec.successors.as_ref().ok_or_else(|| GraphError::NoSuccessor {
                graph: graph.clone(),
                step: spec.name.clone(),
            })?;
            let targets: Vec<&String> = match successors {
                SuccessorSpec::AdvanceTo(t) => vec![t],
                SuccessorSpec::ChooseAmong(ts) => ts.iter().collect(),
            };
            for target in targets {
                if !is_terminal(target) && !self.index.contains_key(target.as_str()) {
                    return Err(GraphError::UnknownStep {
                        graph: graph.clone(),
                        step: target.clone(),
                    });
                }
            }
        }
        Ok(WorkflowGraph {
            name: self.name,
            entry,
            steps: self.steps,
            index: self.index,
        })
    }
}

/// Immutable, compiled description of a workflow.
///
/// Value type: one compiled graph is built lazily by the registry, cached
/// process-wide behind an `Arc`, and shared by many concurrent runs. It is
/// never mutated after compilation.
pub struct WorkflowGraph {
    name: String,
    entry: String,
    steps: Vec<StepSpec>,
    index: FxHashMap<String, usize>,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl WorkflowGraph {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node the START edge points at.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        is_terminal(node) || self.index.contains_key(node)
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn spec(&self, node: &str) -> Option<&StepSpec> {
        self.index.get(node).map(|&i| &self.steps[i])
    }

    /// Step names in registration order (terminals excluded).
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }
}
