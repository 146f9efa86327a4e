//! Batch job poller.
//!
//! Starts the remote aggregation batch, checks its status on a fixed period
//! and resolves once the job reaches a terminal state. The ticker is owned by
//! [`BatchJobPoller::run`] and is dropped on every exit path, so no tick can
//! fire after the poller has finished or been cancelled.
//!
//! ```text
//! Idle -> Started -> Polling -> Completed | Failed | Aborted
//!                 \-> Cancelled | Errored (from any non-terminal state)
//! ```

use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkerConfig;
use crate::error::AppError;
use crate::salesforce::backend::{BatchProgress, LinkerBackend};
use crate::salesforce::{redact_id, BatchJobStatus};

/// Detail reported when a failed job carries none.
const UNKNOWN_ERROR: &str = "Unknown error";

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Observable poller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PollerState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Started { job_id: String },
    #[serde(rename_all = "camelCase")]
    Polling {
        job_id: String,
        progress: BatchProgress,
    },
    #[serde(rename_all = "camelCase")]
    Completed { job_id: String },
    #[serde(rename_all = "camelCase")]
    Failed { job_id: String, detail: String },
    #[serde(rename_all = "camelCase")]
    Aborted { job_id: String, detail: String },
    Cancelled,
    Errored { message: String },
}

impl PollerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollerState::Completed { .. }
                | PollerState::Failed { .. }
                | PollerState::Aborted { .. }
                | PollerState::Cancelled
                | PollerState::Errored { .. }
        )
    }

    /// Latest progress, while polling.
    pub fn progress(&self) -> Option<BatchProgress> {
        match self {
            PollerState::Polling { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

/// Result of a batch run that completed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub job_id: String,
    /// Last progress seen before completion.
    pub progress: BatchProgress,
}

/// Cancels a running poller from outside.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    cancel: CancellationToken,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchJobPoller
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one remote batch job from start to a terminal state.
///
/// A poller runs at most once. Dropping it cancels any in-flight run.
pub struct BatchJobPoller<B: LinkerBackend> {
    backend: B,
    poll_interval: Duration,
    reload_delay: Duration,
    cancel: CancellationToken,
    state: PollerState,
    started: bool,
}

impl<B: LinkerBackend> BatchJobPoller<B> {
    /// Creates a poller using the configured intervals. `cancel` is usually a
    /// child of the owning controller's shutdown token.
    pub fn new(backend: B, config: &LinkerConfig, cancel: CancellationToken) -> Self {
        Self::with_timing(backend, config.poll_interval(), config.reload_delay(), cancel)
    }

    pub fn with_timing(
        backend: B,
        poll_interval: Duration,
        reload_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            // interval_at panics on a zero period
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            reload_delay,
            cancel,
            state: PollerState::Idle,
            started: false,
        }
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            cancel: self.cancel.clone(),
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    fn transition<F: FnMut(&PollerState)>(&mut self, next: PollerState, observe: &mut F) {
        debug!("[BATCH] {:?} -> {:?}", self.state, next);
        self.state = next;
        observe(&self.state);
    }

    fn cancelled<F: FnMut(&PollerState)>(&mut self, observe: &mut F) -> AppError {
        info!("[BATCH] Polling cancelled");
        self.transition(PollerState::Cancelled, observe);
        AppError::Cancelled
    }

    fn errored<F: FnMut(&PollerState)>(&mut self, error: AppError, observe: &mut F) -> AppError {
        warn!("[BATCH] Polling stopped: {}", error);
        let message = error.to_presentation().message;
        self.transition(PollerState::Errored { message }, observe);
        error
    }

    /// Starts a batch in `mode` and polls it to a terminal state, reporting
    /// every transition to `observe`.
    ///
    /// On completion waits the reload delay before returning, so the caller
    /// can immediately re-issue its load exactly once.
    ///
    /// # Errors
    ///
    /// - `AppError::JobFailed` / `AppError::JobAborted` with the backend detail
    /// - `AppError::Cancelled` if the handle or parent token was cancelled
    /// - any transport error from the start or status request (not retried)
    pub async fn run<F>(&mut self, mode: &str, mut observe: F) -> Result<BatchOutcome, AppError>
    where
        F: FnMut(&PollerState),
    {
        if self.started {
            return Err(AppError::Internal("Batch poller already ran".into()));
        }
        self.started = true;

        let cancel = self.cancel.clone();
        let backend = self.backend.clone();

        if cancel.is_cancelled() {
            return Err(self.cancelled(&mut observe));
        }

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = backend.start_batch_job(mode) => Some(r),
        };
        let job_id = match started {
            None => return Err(self.cancelled(&mut observe)),
            Some(Err(e)) => return Err(self.errored(e, &mut observe)),
            Some(Ok(id)) => id,
        };

        info!("[BATCH] Job {} started, polling every {:?}", redact_id(&job_id), self.poll_interval);
        self.transition(PollerState::Started { job_id: job_id.clone() }, &mut observe);

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = BatchProgress::default();
        self.transition(PollerState::Polling { job_id: job_id.clone(), progress }, &mut observe);

        loop {
            let ticked = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = ticker.tick() => true,
            };
            if !ticked {
                return Err(self.cancelled(&mut observe));
            }

            // The status request is awaited before the next tick can be
            // polled, so at most one is in flight.
            let checked = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = backend.check_batch_status(&job_id) => Some(r),
            };
            let info = match checked {
                None => return Err(self.cancelled(&mut observe)),
                Some(Err(e)) => return Err(self.errored(e, &mut observe)),
                Some(Ok(info)) => info,
            };

            match info.status {
                BatchJobStatus::Completed => {
                    info!("[BATCH] Job {} completed", redact_id(&job_id));
                    self.transition(PollerState::Completed { job_id: job_id.clone() }, &mut observe);
                    drop(ticker);

                    let waited = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        _ = tokio::time::sleep(self.reload_delay) => true,
                    };
                    if !waited {
                        return Err(self.cancelled(&mut observe));
                    }
                    return Ok(BatchOutcome { job_id, progress });
                }
                BatchJobStatus::Failed | BatchJobStatus::Aborted => {
                    let detail = info
                        .extended_status
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                    warn!("[BATCH] Job {} ended {:?}: {}", redact_id(&job_id), info.status, detail);

                    return if info.status == BatchJobStatus::Failed {
                        self.transition(
                            PollerState::Failed { job_id: job_id.clone(), detail: detail.clone() },
                            &mut observe,
                        );
                        Err(AppError::JobFailed { job_id, message: detail })
                    } else {
                        self.transition(
                            PollerState::Aborted { job_id: job_id.clone(), detail: detail.clone() },
                            &mut observe,
                        );
                        Err(AppError::JobAborted { job_id, message: detail })
                    };
                }
                other => {
                    progress = BatchProgress {
                        processed: info.processed,
                        total: info.total,
                    };
                    debug!(
                        "[BATCH] Job {} {:?} {}/{}",
                        redact_id(&job_id),
                        other,
                        progress.processed,
                        progress.total
                    );
                    self.transition(
                        PollerState::Polling { job_id: job_id.clone(), progress },
                        &mut observe,
                    );
                }
            }
        }
    }
}

impl<B: LinkerBackend> Drop for BatchJobPoller<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
