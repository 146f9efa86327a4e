//! Scripted in-memory [`LinkerBackend`] for poller and controller tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::controller::TableView;
use crate::error::AppError;
use crate::salesforce::backend::{
    AccountOption, BackendFuture, BatchStatusInfo, LinkerBackend, LoadResponse,
};
use crate::salesforce::BatchJobStatus;
use crate::table::record::{AggregateRow, RawAggregate};

/// Backend operations, for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Search,
    Unlinked,
    Linked,
    StartBatch,
    Status,
    Create,
    Delete,
}

impl Op {
    const ALL: [Op; 7] = [
        Op::Search,
        Op::Unlinked,
        Op::Linked,
        Op::StartBatch,
        Op::Status,
        Op::Create,
        Op::Delete,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// A scripted reply; `Err` becomes `AppError::ConnectionFailed`.
enum Scripted<T> {
    Ok(T),
    Err(String),
}

impl<T> Scripted<T> {
    fn into_result(self) -> Result<T, AppError> {
        match self {
            Scripted::Ok(v) => Ok(v),
            Scripted::Err(msg) => Err(AppError::ConnectionFailed(msg)),
        }
    }
}

#[derive(Default)]
struct Inner {
    unlinked: Mutex<VecDeque<Scripted<LoadResponse>>>,
    linked: Mutex<Vec<AggregateRow>>,
    linked_error: Mutex<Option<String>>,
    statuses: Mutex<VecDeque<Scripted<BatchStatusInfo>>>,
    start_error: Mutex<Option<String>>,
    submit_error: Mutex<Option<String>>,
    created: Mutex<Vec<(String, Vec<RawAggregate>)>>,
    deleted: Mutex<Vec<Vec<RawAggregate>>>,
    linked_accounts: Mutex<Vec<String>>,
    view: Mutex<Option<watch::Receiver<TableView>>>,
    loading_at_submit: Mutex<Vec<bool>>,
    calls: [AtomicU64; 7],
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    inner: Arc<Inner>,
}

pub(crate) const FAKE_JOB_ID: &str = "707xx000000001ABC";

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_unlinked(&self, response: LoadResponse) {
        self.inner
            .unlinked
            .lock()
            .unwrap()
            .push_back(Scripted::Ok(response));
    }

    pub(crate) fn push_unlinked_rows(&self, rows: Vec<AggregateRow>) {
        self.push_unlinked(LoadResponse::Ready {
            data: rows,
            source: Some("cache".into()),
        });
    }

    pub(crate) fn push_unlinked_error(&self, msg: &str) {
        self.inner
            .unlinked
            .lock()
            .unwrap()
            .push_back(Scripted::Err(msg.into()));
    }

    pub(crate) fn set_linked(&self, rows: Vec<AggregateRow>) {
        *self.inner.linked.lock().unwrap() = rows;
    }

    pub(crate) fn fail_linked(&self, msg: &str) {
        *self.inner.linked_error.lock().unwrap() = Some(msg.into());
    }

    pub(crate) fn push_status(
        &self,
        status: BatchJobStatus,
        processed: u64,
        total: u64,
        detail: Option<&str>,
    ) {
        self.inner
            .statuses
            .lock()
            .unwrap()
            .push_back(Scripted::Ok(BatchStatusInfo {
                status,
                processed,
                total,
                extended_status: detail.map(str::to_string),
            }));
    }

    pub(crate) fn push_status_error(&self, msg: &str) {
        self.inner
            .statuses
            .lock()
            .unwrap()
            .push_back(Scripted::Err(msg.into()));
    }

    pub(crate) fn fail_start(&self, msg: &str) {
        *self.inner.start_error.lock().unwrap() = Some(msg.into());
    }

    pub(crate) fn fail_submit(&self, msg: &str) {
        *self.inner.submit_error.lock().unwrap() = Some(msg.into());
    }

    pub(crate) fn calls(&self, op: Op) -> u64 {
        self.inner.calls[op.index()].load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> u64 {
        Op::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// `(account_id, records)` of every create-mappings call.
    pub(crate) fn created(&self) -> Vec<(String, Vec<RawAggregate>)> {
        self.inner.created.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<Vec<RawAggregate>> {
        self.inner.deleted.lock().unwrap().clone()
    }

    /// Account ids passed to load-linked, in call order.
    pub(crate) fn linked_accounts(&self) -> Vec<String> {
        self.inner.linked_accounts.lock().unwrap().clone()
    }

    /// Records the published loading flag whenever a submission arrives.
    pub(crate) fn watch_view(&self, rx: watch::Receiver<TableView>) {
        *self.inner.view.lock().unwrap() = Some(rx);
    }

    /// Loading flag as published when each create/delete call was made.
    pub(crate) fn loading_at_submit(&self) -> Vec<bool> {
        self.inner.loading_at_submit.lock().unwrap().clone()
    }

    fn count(&self, op: Op) {
        self.inner.calls[op.index()].fetch_add(1, Ordering::SeqCst);
    }

    fn submit_result(&self) -> Result<(), AppError> {
        if let Some(rx) = self.inner.view.lock().unwrap().as_ref() {
            let loading = rx.borrow().is_loading;
            self.inner.loading_at_submit.lock().unwrap().push(loading);
        }
        match self.inner.submit_error.lock().unwrap().clone() {
            Some(msg) => Err(AppError::SalesforceError(msg)),
            None => Ok(()),
        }
    }
}

impl LinkerBackend for FakeBackend {
    fn search_accounts<'a>(&'a self, term: &'a str) -> BackendFuture<'a, Vec<AccountOption>> {
        Box::pin(async move {
            self.count(Op::Search);
            Ok(vec![AccountOption {
                id: "001xx000003DGb2".into(),
                name: format!("{} Holdings", term),
                account_type: Some("Account".into()),
            }])
        })
    }

    fn load_unlinked(&self) -> BackendFuture<'_, LoadResponse> {
        Box::pin(async move {
            self.count(Op::Unlinked);
            let next = self.inner.unlinked.lock().unwrap().pop_front();
            match next {
                Some(scripted) => scripted.into_result(),
                None => Ok(LoadResponse::Ready {
                    data: Vec::new(),
                    source: None,
                }),
            }
        })
    }

    fn load_linked<'a>(&'a self, account_id: &'a str) -> BackendFuture<'a, Vec<AggregateRow>> {
        Box::pin(async move {
            self.count(Op::Linked);
            self.inner
                .linked_accounts
                .lock()
                .unwrap()
                .push(account_id.to_string());
            if let Some(msg) = self.inner.linked_error.lock().unwrap().clone() {
                return Err(AppError::ConnectionFailed(msg));
            }
            Ok(self.inner.linked.lock().unwrap().clone())
        })
    }

    fn start_batch_job<'a>(&'a self, _mode: &'a str) -> BackendFuture<'a, String> {
        Box::pin(async move {
            self.count(Op::StartBatch);
            if let Some(msg) = self.inner.start_error.lock().unwrap().clone() {
                return Err(AppError::ConnectionFailed(msg));
            }
            Ok(FAKE_JOB_ID.to_string())
        })
    }

    fn check_batch_status<'a>(&'a self, _job_id: &'a str) -> BackendFuture<'a, BatchStatusInfo> {
        Box::pin(async move {
            self.count(Op::Status);
            let next = self.inner.statuses.lock().unwrap().pop_front();
            match next {
                Some(scripted) => scripted.into_result(),
                None => Ok(BatchStatusInfo {
                    status: BatchJobStatus::Processing,
                    processed: 0,
                    total: 0,
                    extended_status: None,
                }),
            }
        })
    }

    fn create_mappings<'a>(
        &'a self,
        records: &'a [RawAggregate],
        account_id: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.count(Op::Create);
            self.submit_result()?;
            self.inner
                .created
                .lock()
                .unwrap()
                .push((account_id.to_string(), records.to_vec()));
            Ok(())
        })
    }

    fn delete_mappings<'a>(&'a self, records: &'a [RawAggregate]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.count(Op::Delete);
            self.submit_result()?;
            self.inner.deleted.lock().unwrap().push(records.to_vec());
            Ok(())
        })
    }
}

/// Builds a backend row with the given identifying fields.
pub(crate) fn row(key: &str, distributor: &str, customer: &str) -> AggregateRow {
    AggregateRow {
        group_key: key.to_string(),
        raw: RawAggregate {
            distributor: Some(distributor.to_string()),
            customer: Some(customer.to_string()),
            time_period: Some("2024-Q1".to_string()),
            country: Some("United States".to_string()),
            total_revenue: Some(1000.0),
            trace_sale_ids: Some(vec![format!("a0X-{}", key)]),
            ..RawAggregate::default()
        },
    }
}

/// `n` rows keyed `k00`, `k01`, ... with alternating distributors.
pub(crate) fn rows(n: usize) -> Vec<AggregateRow> {
    (0..n)
        .map(|i| {
            let distributor = if i % 2 == 0 { "ACME Supply" } else { "Northwind" };
            row(&format!("k{:02}", i), distributor, &format!("Customer {}", i))
        })
        .collect()
}
