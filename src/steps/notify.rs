//! Typed notifications with an injectable delivery channel.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::event::{EventEmitter, ProgressEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// An out-of-band message for a human operator or UI surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            action_url: None,
            action_label: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, url: impl Into<String>, label: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self.action_label = Some(label.into());
        self
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    #[diagnostic(code(graphmill::notify::delivery))]
    Delivery(String),
}

/// Delivery channel for notifications and escalations.
///
/// Implementations wrap whatever the deployment uses (chat webhook, email
/// bridge, UI push). The engine only ever holds the trait object.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that degrades to a local log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            title = %notification.title,
            "notification (no notifier configured)"
        );
        Ok(())
    }
}

/// Send a notification through whichever channels are available.
///
/// Emits a stream frame when an emitter is present and forwards to the
/// out-of-band notifier when configured; absence of both still succeeds
/// (the notification is logged).
pub async fn send_notification(
    graph_name: &str,
    notification: Notification,
    emitter: Option<&dyn EventEmitter>,
    notifier: Option<&dyn Notifier>,
) {
    if let Some(emitter) = emitter {
        let payload = json!({ "notification": &notification });
        if let Err(err) = emitter.emit(ProgressEvent::notification(graph_name, payload)) {
            tracing::debug!(error = %err, "notification frame not delivered");
        }
    }
    match notifier {
        Some(notifier) => {
            if let Err(err) = notifier.notify(&notification).await {
                tracing::warn!(error = %err, title = %notification.title, "notifier delivery failed");
            }
        }
        None => {
            tracing::info!(
                kind = ?notification.kind,
                title = %notification.title,
                message = %notification.message,
                "notification"
            );
        }
    }
}
