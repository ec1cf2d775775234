//! Reusable building blocks for step bodies.
//!
//! Each utility is a pure function over its inputs plus an injected
//! [`Notifier`]; none captures executor internals.

pub mod approval;
pub mod escalate;
pub mod notify;
pub mod retry;

pub use approval::{request_approval, ApprovalResult, ApprovalSpec, GateOutcome};
pub use escalate::{escalate, EscalationReceipt, EscalationRequest};
pub use notify::{send_notification, Notification, NotificationKind, Notifier, NullNotifier};
pub use retry::{with_retry, RetryPolicy, RetryReport, RetryState};
