//! Approval gate built on suspension.
//!
//! A gate either resolves immediately (the dispatch carries a resume
//! decision) or yields a [`SuspensionToken`] for the executor to persist.
//! Resuming with no usable payload defaults to `approved = false` for
//! safety.

use chrono::Utc;
use serde_json::Value;

use crate::node::{RiskLevel, StepContext, SuspensionToken};

use super::notify::{Notification, NotificationKind, Notifier};

/// Everything a step supplies to raise an approval gate.
#[derive(Clone, Debug)]
pub struct ApprovalSpec {
    pub operation: String,
    pub operation_type: String,
    pub risk_level: RiskLevel,
    pub details: Value,
    pub preview: String,
    pub action: String,
    pub reason: Option<String>,
}

impl ApprovalSpec {
    pub fn token(&self) -> SuspensionToken {
        SuspensionToken {
            operation: self.operation.clone(),
            operation_type: self.operation_type.clone(),
            risk_level: self.risk_level,
            details: self.details.clone(),
            preview: self.preview.clone(),
            action: self.action.clone(),
        }
    }
}

/// Result of a resolved approval interaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalResult {
    pub approved: bool,
    pub comment: Option<String>,
    /// RFC3339 resolution time.
    pub timestamp: String,
}

/// What a gate produced for this dispatch.
#[derive(Clone, Debug)]
pub enum GateOutcome {
    /// A decision was delivered; proceed accordingly.
    Decided(ApprovalResult),
    /// No decision yet; return the token to the executor.
    Suspended(SuspensionToken),
}

/// Raise an approval gate.
///
/// On a fresh dispatch this returns [`GateOutcome::Suspended`] (after
/// optionally forwarding an out-of-band notification). On a resumed
/// dispatch the decision value is interpreted:
///
/// - `"approve"` / `"approved"` (and their reject counterparts) as plain
///   strings,
/// - an object `{"approved": bool, "comment": ..., "timestamp": ...}`,
/// - anything else — including `null` — resolves to `approved = false`.
pub async fn request_approval(
    ctx: &mut StepContext,
    spec: ApprovalSpec,
    notifier: Option<&dyn Notifier>,
) -> GateOutcome {
    match ctx.take_decision() {
        Some(decision) => GateOutcome::Decided(resolve_decision(&decision)),
        None => {
            if let Some(notifier) = notifier {
                let notification = Notification::new(
                    NotificationKind::Warning,
                    format!("Approval required: {}", spec.operation),
                    spec.reason.clone().unwrap_or_else(|| spec.action.clone()),
                );
                if let Err(err) = notifier.notify(&notification).await {
                    tracing::warn!(operation = %spec.operation, error = %err, "approval notification failed");
                }
            }
            GateOutcome::Suspended(spec.token())
        }
    }
}

/// Interpret a raw resume decision value.
#[must_use]
pub fn resolve_decision(decision: &Value) -> ApprovalResult {
    let now = || Utc::now().to_rfc3339();
    match decision {
        Value::String(s) => {
            let approved = matches!(s.as_str(), "approve" | "approved" | "yes");
            ApprovalResult {
                approved,
                comment: None,
                timestamp: now(),
            }
        }
        Value::Bool(b) => ApprovalResult {
            approved: *b,
            comment: None,
            timestamp: now(),
        },
        Value::Object(map) => ApprovalResult {
            approved: map.get("approved").and_then(Value::as_bool).unwrap_or(false),
            comment: map
                .get("comment")
                .and_then(Value::as_str)
                .map(str::to_string),
            timestamp: map
                .get("timestamp")
                .and_then(Value::as_str)
                .map_or_else(now, str::to_string),
        },
        // No payload on resume: reject for safety.
        _ => ApprovalResult {
            approved: false,
            comment: Some("No approval data provided on resume".to_string()),
            timestamp: now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_decisions_resolve() {
        assert!(resolve_decision(&json!("approve")).approved);
        assert!(!resolve_decision(&json!("reject")).approved);
    }

    #[test]
    fn null_defaults_to_rejected() {
        let result = resolve_decision(&Value::Null);
        assert!(!result.approved);
        assert!(result.comment.is_some());
    }

    #[test]
    fn object_decision_carries_comment() {
        let result = resolve_decision(&json!({"approved": true, "comment": "ok"}));
        assert!(result.approved);
        assert_eq!(result.comment.as_deref(), Some("ok"));
    }
}
