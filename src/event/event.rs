use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::node::SuspensionToken;

/// Discriminant of a [`ProgressEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStart,
    StepComplete,
    ApprovalRequired,
    WorkflowPaused,
    WorkflowComplete,
    WorkflowRejected,
    WorkflowError,
    Notification,
}

impl EventKind {
    /// Wire name of the event type, also used on the SSE `event:` line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WorkflowStart => "workflow_start",
            EventKind::StepComplete => "step_complete",
            EventKind::ApprovalRequired => "approval_required",
            EventKind::WorkflowPaused => "workflow_paused",
            EventKind::WorkflowComplete => "workflow_complete",
            EventKind::WorkflowRejected => "workflow_rejected",
            EventKind::WorkflowError => "workflow_error",
            EventKind::Notification => "notification",
        }
    }

    /// Terminal events close a run's stream; nothing follows them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::WorkflowPaused
                | EventKind::WorkflowComplete
                | EventKind::WorkflowRejected
        )
    }
}

/// Progress metric attached to `step_complete` and `workflow_complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current_step: u32,
    pub total_steps: u32,
    pub percentage: u32,
}

impl Progress {
    /// Percentage is `100 * completed / estimated`, clamped to `[0, 100]`;
    /// zero when no estimate is known.
    #[must_use]
    pub fn from_counts(completed: usize, estimated: Option<u32>) -> Self {
        let completed = u32::try_from(completed).unwrap_or(u32::MAX);
        match estimated {
            Some(total) if total > 0 => Progress {
                current_step: completed,
                total_steps: total,
                percentage: (completed.saturating_mul(100) / total).min(100),
            },
            _ => Progress {
                current_step: completed,
                total_steps: completed,
                percentage: 0,
            },
        }
    }
}

/// One entry in a run's ordered progress stream.
///
/// Serializes to the flat object carried on the SSE `data:` line, e.g.
/// `{"type":"step_complete","graph_name":"hotel_o2c","step":"create_folio",
/// "state":{...},"progress":{...},"timestamp":1733000000000}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub graph_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SuspensionToken>,
    /// Millisecond Unix timestamp.
    pub timestamp: i64,
}

impl ProgressEvent {
    fn base(kind: EventKind, graph_name: &str) -> Self {
        Self {
            kind,
            graph_name: graph_name.to_string(),
            step: None,
            state: None,
            progress: None,
            token: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn workflow_start(graph_name: &str, state: Value) -> Self {
        let mut event = Self::base(EventKind::WorkflowStart, graph_name);
        event.state = Some(state);
        event
    }

    pub fn step_complete(
        graph_name: &str,
        step: &str,
        state: Value,
        progress: Progress,
    ) -> Self {
        let mut event = Self::base(EventKind::StepComplete, graph_name);
        event.step = Some(step.to_string());
        event.state = Some(state);
        event.progress = Some(progress);
        event
    }

    pub fn approval_required(
        graph_name: &str,
        step: &str,
        state: Value,
        token: SuspensionToken,
    ) -> Self {
        let mut event = Self::base(EventKind::ApprovalRequired, graph_name);
        event.step = Some(step.to_string());
        event.state = Some(state);
        event.token = Some(token);
        event
    }

    pub fn workflow_paused(graph_name: &str, state: Value) -> Self {
        let mut event = Self::base(EventKind::WorkflowPaused, graph_name);
        event.state = Some(state);
        event
    }

    pub fn workflow_complete(graph_name: &str, state: Value, progress: Progress) -> Self {
        let mut event = Self::base(EventKind::WorkflowComplete, graph_name);
        event.state = Some(state);
        event.progress = Some(progress);
        event
    }

    pub fn workflow_rejected(graph_name: &str, state: Value) -> Self {
        let mut event = Self::base(EventKind::WorkflowRejected, graph_name);
        event.state = Some(state);
        event
    }

    /// Error scoped to a step, carrying the state at failure.
    pub fn workflow_error_at(graph_name: &str, step: &str, state: Value) -> Self {
        let mut event = Self::base(EventKind::WorkflowError, graph_name);
        event.step = Some(step.to_string());
        event.state = Some(state);
        event
    }

    /// Error with no state to show, carrying only a message.
    pub fn workflow_error(graph_name: &str, message: &str) -> Self {
        let mut event = Self::base(EventKind::WorkflowError, graph_name);
        event.state = Some(json!({ "error": message }));
        event
    }

    pub fn notification(graph_name: &str, payload: Value) -> Self {
        let mut event = Self::base(EventKind::Notification, graph_name);
        event.state = Some(payload);
        event
    }

    /// Compact single-line JSON of the payload.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percentage_clamps() {
        assert_eq!(Progress::from_counts(2, Some(5)).percentage, 40);
        assert_eq!(Progress::from_counts(9, Some(5)).percentage, 100);
        assert_eq!(Progress::from_counts(3, None).percentage, 0);
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let event = ProgressEvent::workflow_start("hotel_o2c", json!({}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "workflow_start");
        assert_eq!(value["graph_name"], "hotel_o2c");
        assert!(value.get("step").is_none());
    }
}
