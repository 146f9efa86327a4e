//! Remote side of the linker: the Apex REST backend and batch job polling.
//!
//! - **`backend`** defines the [`LinkerBackend`] seam the controller talks to
//! - **`client`** is the authenticated HTTP client with safe logging
//! - **`apex`** implements the seam over the Apex REST resource
//! - **`batch_poller`** drives a remote aggregation job to completion

pub mod apex;
pub mod backend;
pub mod batch_poller;
pub mod client;

#[cfg(test)]
pub(crate) mod fake;

pub use apex::ApexLinkerClient;
pub use backend::{
    AccountOption, BackendFuture, BatchProgress, BatchStatusInfo, LinkerBackend, LoadResponse,
};
pub use batch_poller::{BatchJobPoller, BatchOutcome, PollerHandle, PollerState};
pub use client::{LoggingMode, OrgCredentials, SalesforceClient};

use serde::{Deserialize, Serialize};

/// Status of a remote batch aggregation job, as reported by `AsyncApexJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchJobStatus {
    Queued,
    Preparing,
    Holding,
    Processing,
    Completed,
    Failed,
    Aborted,
    /// Any status this crate does not know about; treated as still running.
    #[serde(other)]
    Unknown,
}

impl BatchJobStatus {
    /// True once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchJobStatus::Completed | BatchJobStatus::Failed | BatchJobStatus::Aborted
        )
    }

    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }
}

/// Redacts an id for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}
