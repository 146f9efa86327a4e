use serde::Serialize;
use thiserror::Error;

use crate::controller::notify::Severity;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "refresh_token",
    "access_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the notification channel.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Coarse error taxonomy used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any network call.
    Validation,
    /// Network or backend failure on fetch, poll, or submit.
    Transport,
    /// The remote batch job reported Failed or Aborted.
    JobFailure,
    /// The operation was torn down; nothing to tell the user.
    Cancelled,
    Internal,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Salesforce error: {0}")]
    SalesforceError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Batch Jobs ────────────────────────────────────────────────────────────
    #[error("Batch job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Batch job {job_id} was aborted: {message}")]
    JobAborted { job_id: String, message: String },

    #[error("Batch job completed but aggregated results are not available yet")]
    BatchResultsUnavailable,

    #[error("Operation cancelled")]
    Cancelled,

    // ── Validation ────────────────────────────────────────────────────────────
    #[error("No records selected")]
    EmptySelection,

    #[error("{count} selected record(s) have neither a distributor nor a customer")]
    MissingIdentifyingFields { count: usize },

    #[error("No account selected")]
    NoAccountSelected,

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Unknown filter field: {0}")]
    UnknownFilterField(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classifies the error for the surfacing rules of the table controller.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::EmptySelection
            | AppError::MissingIdentifyingFields { .. }
            | AppError::NoAccountSelected
            | AppError::InvalidPageSize(_)
            | AppError::UnknownFilterField(_) => ErrorCategory::Validation,

            AppError::NotAuthenticated
            | AppError::SessionExpired
            | AppError::SalesforceError(_)
            | AppError::RateLimited { .. }
            | AppError::NotFound(_)
            | AppError::ConnectionFailed(_)
            | AppError::BatchResultsUnavailable => ErrorCategory::Transport,

            AppError::JobFailed { .. } | AppError::JobAborted { .. } => ErrorCategory::JobFailure,

            AppError::Cancelled => ErrorCategory::Cancelled,

            AppError::Config(_) | AppError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true for errors that must be reported as a warning rather than an error.
    pub fn is_warning(&self) -> bool {
        matches!(self, AppError::EmptySelection)
    }

    /// Notification severity for this error.
    pub fn severity(&self) -> Severity {
        match self.category() {
            _ if self.is_warning() => Severity::Warning,
            ErrorCategory::Cancelled => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks secrets, tokens, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "You need to log in to Salesforce to continue.".into(),
                action: Some("Log in to Salesforce".into()),
            },

            AppError::SessionExpired => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Your Salesforce session has expired.".into(),
                action: Some("Log in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::SalesforceError(msg) => ErrorPresentation {
                title: "Salesforce Error".into(),
                message: sanitize_message(msg, "A Salesforce error occurred."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("Salesforce is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested resource was not found."),
                action: None,
            },

            // ── Batch Jobs ────────────────────────────────────────────────────
            AppError::JobFailed { job_id: _, message } => ErrorPresentation {
                title: "Batch Job Failed".into(),
                message: sanitize_message(message, "The batch aggregation failed."),
                action: Some("Review the error and load the records again".into()),
            },

            AppError::JobAborted { job_id: _, message } => ErrorPresentation {
                title: "Batch Job Aborted".into(),
                message: sanitize_message(message, "The batch aggregation was aborted."),
                action: Some("Load the records again".into()),
            },

            AppError::BatchResultsUnavailable => ErrorPresentation {
                title: "Results Not Ready".into(),
                message: "The batch aggregation finished but its results are not available yet."
                    .into(),
                action: Some("Load the records again in a moment".into()),
            },

            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The operation was cancelled.".into(),
                action: None,
            },

            // ── Validation ────────────────────────────────────────────────────
            AppError::EmptySelection => ErrorPresentation {
                title: "Warning".into(),
                message: "Please select at least one record".into(),
                action: None,
            },

            AppError::MissingIdentifyingFields { count } => ErrorPresentation {
                title: "Incomplete Records".into(),
                message: format!(
                    "{} selected record(s) have neither a distributor nor a customer.",
                    count
                ),
                action: Some("Deselect the incomplete records and try again".into()),
            },

            AppError::NoAccountSelected => ErrorPresentation {
                title: "No Account Selected".into(),
                message: "Select an account before linking or unlinking records.".into(),
                action: Some("Choose an account".into()),
            },

            AppError::InvalidPageSize(size) => ErrorPresentation {
                title: "Invalid Page Size".into(),
                message: format!("A page must hold at least one record (got {}).", size),
                action: None,
            },

            AppError::UnknownFilterField(field) => ErrorPresentation {
                title: "Unknown Filter".into(),
                message: format!("There is no filterable column named '{}'.", field),
                action: None,
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not connect to Salesforce. Please check your internet connection."
                    .into(),
                action: Some("Check network and retry".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The linker configuration is invalid."),
                action: Some("Fix the configuration and restart".into()),
            },

            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
