//! Workflow registry: descriptors, queries, validation, and compiled-graph
//! loading.
//!
//! Graphs register at process start with a static factory function value —
//! there is no late lookup by module path. The descriptor table is
//! read-only after startup; the compiled-graph cache is populated under a
//! lock and read concurrently thereafter.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::graph::{GraphError, WorkflowGraph};
use crate::state::create_base_state;

/// Capabilities a workflow graph exposes.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowCapabilities {
    pub supports_interrupts: bool,
    pub supports_parallel: bool,
    pub requires_approval: bool,
    pub supports_rollback: bool,
    /// Industry-specific capability names, e.g. `folio_management`.
    pub custom: Vec<String>,
}

impl Default for WorkflowCapabilities {
    fn default() -> Self {
        Self {
            supports_interrupts: true,
            supports_parallel: false,
            requires_approval: true,
            supports_rollback: false,
            custom: Vec::new(),
        }
    }
}

impl WorkflowCapabilities {
    #[must_use]
    pub fn with_custom<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.custom = names.into_iter().map(str::to_string).collect();
        self
    }
}

/// One field in a descriptor's initial-state schema.
///
/// The hint is kept verbatim (`str`, `float`, `list[dict]`, ...); the
/// validator recognizes string, numeric, list, and map hints and treats
/// anything else as advisory.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub hint: String,
    pub optional: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn required(hint: &str) -> Self {
        Self {
            hint: hint.to_string(),
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(hint: &str) -> Self {
        Self {
            hint: hint.to_string(),
            optional: true,
        }
    }

    /// Wire form of the hint, with the optional marker the original schema
    /// format uses.
    #[must_use]
    pub fn render(&self) -> String {
        if self.optional {
            format!("{} (optional)", self.hint)
        } else {
            self.hint.clone()
        }
    }

    fn matches(&self, value: &Value) -> bool {
        let base = self.hint.split(['(', '[']).next().unwrap_or("").trim();
        match base {
            "str" | "string" => value.is_string(),
            "float" | "int" | "number" => value.is_number(),
            "list" => value.is_array(),
            "dict" | "map" => value.is_object(),
            // Unrecognized hints are advisory.
            _ => true,
        }
    }
}

/// Static metadata about a registered workflow graph.
#[derive(Clone, Debug)]
pub struct WorkflowDescriptor {
    pub name: String,
    pub industry: String,
    pub description: String,
    /// Free-form tags; order is stable for display.
    pub tags: Vec<String>,
    /// Ordered field name → spec pairs.
    pub initial_state_schema: Vec<(String, FieldSpec)>,
    /// Informational step estimate used for progress percentages.
    pub estimated_steps: u32,
    pub capabilities: WorkflowCapabilities,
}

impl WorkflowDescriptor {
    /// JSON form served by the HTTP surface.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let schema: Map<String, Value> = self
            .initial_state_schema
            .iter()
            .map(|(name, spec)| (name.clone(), Value::String(spec.render())))
            .collect();
        json!({
            "name": &self.name,
            "description": &self.description,
            "industry": &self.industry,
            "tags": &self.tags,
            "initial_state_schema": schema,
            "estimated_steps": self.estimated_steps,
            "capabilities": &self.capabilities,
        })
    }

    fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.iter().any(|own| own == t))
    }
}

/// Factory producing a compiled graph for a registered workflow.
pub type GraphFactory = Arc<dyn Fn() -> Result<WorkflowGraph, GraphError> + Send + Sync>;

struct Registration {
    descriptor: WorkflowDescriptor,
    factory: GraphFactory,
}

/// Initial-state validation failures.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("Missing required fields: {}", fields.join(", "))]
    #[diagnostic(code(graphmill::registry::missing_fields))]
    MissingFields { fields: Vec<String> },

    #[error("Field '{field}' must be {expected}, got {got}")]
    #[diagnostic(code(graphmill::registry::type_mismatch))]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },
}

/// Registry-level errors.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("Unknown workflow graph: {name}. Available graphs: {available}")]
    #[diagnostic(code(graphmill::registry::unknown_graph))]
    UnknownGraph { name: String, available: String },

    #[error("Failed to load workflow graph {name}: {source}")]
    #[diagnostic(
        code(graphmill::registry::load_error),
        help("The graph factory failed or produced a graph without an entry edge.")
    )]
    LoadError {
        name: String,
        #[source]
        source: GraphError,
    },
}

/// Rollup statistics over the registry, served by the health endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct RegistryStats {
    pub total_workflows: usize,
    pub by_industry: FxHashMap<String, usize>,
    pub loaded_graphs: usize,
    pub available_industries: Vec<String>,
    pub all_tags: Vec<String>,
    pub custom_capabilities: FxHashMap<String, usize>,
    pub standard_capabilities: StandardCapabilityCounts,
}

#[derive(Clone, Debug, Serialize)]
pub struct StandardCapabilityCounts {
    pub supports_interrupts: usize,
    pub requires_approval: usize,
    pub supports_parallel: usize,
}

/// Central registry for workflow graphs.
///
/// Descriptors live in a table frozen after startup; compiled graphs are
/// built lazily by their factories and cached. `load` is safe under
/// concurrent callers: the cache is filled under a write lock and
/// double-checked, so every caller observes the same compiled graph.
pub struct Registry {
    entries: Vec<Registration>,
    by_name: FxHashMap<String, usize>,
    cache: RwLock<FxHashMap<String, Arc<WorkflowGraph>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: FxHashMap::default(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a workflow at startup. Later registrations under the same
    /// name are ignored with a warning.
    pub fn register(&mut self, descriptor: WorkflowDescriptor, factory: GraphFactory) {
        if self.by_name.contains_key(&descriptor.name) {
            tracing::warn!(name = %descriptor.name, "duplicate workflow registration ignored");
            return;
        }
        self.by_name
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Registration { descriptor, factory });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkflowDescriptor> {
        self.by_name.get(name).map(|&i| &self.entries[i].descriptor)
    }

    /// Descriptors in registration order, filtered by industry, tag
    /// intersection, and a capability predicate.
    pub fn list(
        &self,
        industry: Option<&str>,
        tags: Option<&[&str]>,
        capability_predicate: Option<&dyn Fn(&WorkflowCapabilities) -> bool>,
    ) -> Vec<&WorkflowDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .filter(|d| industry.is_none_or(|i| d.industry == i))
            .filter(|d| tags.is_none_or(|t| d.has_any_tag(t)))
            .filter(|d| capability_predicate.is_none_or(|p| p(&d.capabilities)))
            .collect()
    }

    /// Sorted list of unique industries.
    #[must_use]
    pub fn industries(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.descriptor.industry.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Sorted union of every descriptor's tags.
    #[must_use]
    pub fn all_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .flat_map(|e| e.descriptor.tags.iter().cloned())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Workflow names exposing a specific custom capability.
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                e.descriptor
                    .capabilities
                    .custom
                    .iter()
                    .any(|c| c == capability)
            })
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    /// Produce the compiled graph for `name`, building and caching it on
    /// first use.
    pub fn load(&self, name: &str) -> Result<Arc<WorkflowGraph>, RegistryError> {
        if let Some(graph) = self.cache.read().get(name) {
            return Ok(Arc::clone(graph));
        }
        let entry = self
            .by_name
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| self.unknown(name))?;

        let mut cache = self.cache.write();
        // Another loader may have won the race while we waited.
        if let Some(graph) = cache.get(name) {
            return Ok(Arc::clone(graph));
        }
        let graph = (entry.factory)().map_err(|source| RegistryError::LoadError {
            name: name.to_string(),
            source,
        })?;
        let graph = Arc::new(graph);
        cache.insert(name.to_string(), Arc::clone(&graph));
        tracing::info!(graph = name, steps = graph.step_count(), "compiled workflow graph");
        Ok(graph)
    }

    /// Validate `initial_state` against the named descriptor's schema.
    ///
    /// Missing base fields are auto-populated with defaults before schema
    /// checks run; validation never fails for base-field omission.
    pub fn validate(
        &self,
        name: &str,
        initial_state: &mut Map<String, Value>,
    ) -> Result<(), ValidationError> {
        let Some(descriptor) = self.get(name) else {
            // Unknown names are reported by load(); nothing to check here.
            return Ok(());
        };

        autofill_base_fields(initial_state);

        let missing: Vec<String> = descriptor
            .initial_state_schema
            .iter()
            .filter(|(field, spec)| !spec.optional && !initial_state.contains_key(field))
            .map(|(field, _)| field.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields { fields: missing });
        }

        for (field, spec) in &descriptor.initial_state_schema {
            if let Some(value) = initial_state.get(field) {
                if !value.is_null() && !spec.matches(value) {
                    return Err(ValidationError::TypeMismatch {
                        field: field.clone(),
                        expected: spec.hint.clone(),
                        got: json_type_name(value).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut by_industry: FxHashMap<String, usize> = FxHashMap::default();
        let mut custom_capabilities: FxHashMap<String, usize> = FxHashMap::default();
        let mut interrupts = 0;
        let mut approval = 0;
        let mut parallel = 0;
        for entry in &self.entries {
            let d = &entry.descriptor;
            *by_industry.entry(d.industry.clone()).or_default() += 1;
            for cap in &d.capabilities.custom {
                *custom_capabilities.entry(cap.clone()).or_default() += 1;
            }
            interrupts += usize::from(d.capabilities.supports_interrupts);
            approval += usize::from(d.capabilities.requires_approval);
            parallel += usize::from(d.capabilities.supports_parallel);
        }
        RegistryStats {
            total_workflows: self.entries.len(),
            available_industries: self.industries(),
            all_tags: self.all_tags(),
            loaded_graphs: self.cache.read().len(),
            by_industry,
            custom_capabilities,
            standard_capabilities: StandardCapabilityCounts {
                supports_interrupts: interrupts,
                requires_approval: approval,
                supports_parallel: parallel,
            },
        }
    }

    pub(crate) fn unknown(&self, name: &str) -> RegistryError {
        let available: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect();
        RegistryError::UnknownGraph {
            name: name.to_string(),
            available: available.join(", "),
        }
    }
}

/// Fill missing base fields with their defaults.
fn autofill_base_fields(state: &mut Map<String, Value>) {
    let base = create_base_state("start");
    let defaults = serde_json::to_value(&base).unwrap_or(Value::Null);
    if let Value::Object(defaults) = defaults {
        for (key, value) in defaults {
            state.entry(key).or_insert(value);
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
