//! Escalation of workflow issues to an out-of-band channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::Severity;

use super::notify::{Notification, NotificationKind, Notifier};

/// A request for human attention outside the approval flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub workflow_name: String,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
}

/// What happened to an escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscalationReceipt {
    /// True when an out-of-band notifier accepted the escalation.
    pub delivered: bool,
}

/// Record an escalation request.
///
/// Succeeds even when no notifier is configured — the escalation degrades
/// to a local log so the run is never blocked on observability plumbing.
pub async fn escalate(
    notifier: Option<&dyn Notifier>,
    request: EscalationRequest,
) -> EscalationReceipt {
    tracing::warn!(
        workflow = %request.workflow_name,
        issue = %request.issue_type,
        severity = ?request.severity,
        escalate_to = request.escalate_to.as_deref().unwrap_or("unassigned"),
        "workflow escalation: {}",
        request.description
    );

    let Some(notifier) = notifier else {
        return EscalationReceipt { delivered: false };
    };

    let kind = match request.severity {
        Severity::Critical | Severity::Error => NotificationKind::Error,
        Severity::Warning => NotificationKind::Warning,
        Severity::Info => NotificationKind::Info,
    };
    let notification = Notification::new(
        kind,
        format!("Escalation: {}", request.issue_type),
        format!("[{}] {}", request.workflow_name, request.description),
    );
    match notifier.notify(&notification).await {
        Ok(()) => EscalationReceipt { delivered: true },
        Err(err) => {
            tracing::warn!(error = %err, "escalation notifier failed; recorded locally");
            EscalationReceipt { delivered: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn escalation_without_notifier_still_succeeds() {
        let receipt = escalate(
            None,
            EscalationRequest {
                workflow_name: "hotel_o2c".into(),
                issue_type: "stuck_approval".into(),
                severity: Severity::Warning,
                description: "approval pending for 2 days".into(),
                context: json!({"thread_id": "t-1"}),
                escalate_to: None,
            },
        )
        .await;
        assert!(!receipt.delivered);
    }
}
