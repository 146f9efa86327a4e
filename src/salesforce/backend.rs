//! The backend seam: every remote operation the table controller needs.
//!
//! [`ApexLinkerClient`](crate::salesforce::ApexLinkerClient) implements this
//! over HTTP; tests substitute scripted fakes.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::salesforce::BatchJobStatus;
use crate::table::record::{AggregateRow, RawAggregate};

/// Boxed future returned by [`LinkerBackend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Account suggestion returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOption {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

/// Outcome of an unlinked-records load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadResponse {
    /// Aggregated rows are available now.
    Ready {
        #[serde(default)]
        data: Vec<AggregateRow>,
        /// Where the rows came from (e.g. `"cache"` or `"live"`).
        #[serde(default)]
        source: Option<String>,
    },
    /// The aggregation must be computed by a batch job first.
    NeedsBatch,
}

/// Snapshot of a batch job as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusInfo {
    pub status: BatchJobStatus,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub total: u64,
    /// Backend failure detail, if any.
    #[serde(default)]
    pub extended_status: Option<String>,
}

impl BatchStatusInfo {
    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            processed: self.processed,
            total: self.total,
        }
    }
}

/// Items processed out of total for a running job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub processed: u64,
    pub total: u64,
}

impl BatchProgress {
    /// Fraction complete, or `None` while the total is still unknown (zero).
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.processed as f64 / self.total as f64)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LinkerBackend
// ─────────────────────────────────────────────────────────────────────────────

/// Remote operations used by the table controller and batch poller.
pub trait LinkerBackend: Send + Sync + Clone {
    /// Account suggestions for a free-text term.
    fn search_accounts<'a>(&'a self, term: &'a str) -> BackendFuture<'a, Vec<AccountOption>>;

    /// Aggregated trace-sales rows not yet linked to any account.
    fn load_unlinked(&self) -> BackendFuture<'_, LoadResponse>;

    /// Aggregated rows currently linked to `account_id`.
    fn load_linked<'a>(&'a self, account_id: &'a str) -> BackendFuture<'a, Vec<AggregateRow>>;

    /// Starts the aggregation batch and returns its job id.
    fn start_batch_job<'a>(&'a self, mode: &'a str) -> BackendFuture<'a, String>;

    fn check_batch_status<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, BatchStatusInfo>;

    /// Links the given aggregations to an account.
    fn create_mappings<'a>(
        &'a self,
        records: &'a [RawAggregate],
        account_id: &'a str,
    ) -> BackendFuture<'a, ()>;

    /// Removes the account links of the given aggregations.
    fn delete_mappings<'a>(&'a self, records: &'a [RawAggregate]) -> BackendFuture<'a, ()>;
}
