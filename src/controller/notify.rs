//! User-facing notifications, the only side channel out of the controller.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AppError;

/// How a notification should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// A toast-style message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: "Success".into(),
            message: message.into(),
            severity: Severity::Success,
        }
    }

    /// Builds a notification for `error`, prefixed with what was being done.
    ///
    /// Validation warnings keep their own text; everything else reads
    /// `"<context>: <detail>"` so the most specific message is shown.
    pub fn from_error(context: &str, error: &AppError) -> Self {
        let presentation = error.to_presentation();
        let severity = error.severity();
        let message = if severity == Severity::Warning || context.is_empty() {
            presentation.message
        } else {
            format!("{}: {}", context, presentation.message)
        };
        Self {
            title: presentation.title,
            message,
            severity,
        }
    }
}

/// Receives notifications from the controller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("[TABLE] Notification dropped, receiver closed");
        }
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}
