//! Table controller: owns the loaded records, filters, selection and paging,
//! and orchestrates loads, batch fallbacks and link/unlink submissions.
//!
//! Every mutating operation re-derives the filtered set and visible page,
//! then publishes a fresh [`TableView`] on the watch channel returned by
//! [`TableController::subscribe`].

pub mod notify;
pub mod view;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkerConfig;
use crate::error::{AppError, ErrorCategory};
use crate::salesforce::backend::{AccountOption, LinkerBackend, LoadResponse};
use crate::salesforce::batch_poller::BatchJobPoller;
use crate::salesforce::{redact_id, PollerState};
use crate::table::record::{map_rows, AggregateRow, AggregatedRecord, RawAggregate};
use crate::table::{filter, paginate, FilterCriteria, FilterField, PageInfo, PageState, SelectionSet};

pub use notify::{ChannelNotifier, Notification, Notifier, NullNotifier, Severity};
pub use view::{DataSource, SelectAllState, TableView, VisibleRow};

const LOAD_UNLINKED_FAILED: &str = "Failed to load trace sales records";
const LOAD_LINKED_FAILED: &str = "Failed to load linked records";
const LINK_FAILED: &str = "Failed to link records";
const UNLINK_FAILED: &str = "Failed to unlink records";

// ─────────────────────────────────────────────────────────────────────────────
// TableController
// ─────────────────────────────────────────────────────────────────────────────

/// Stateful engine behind the account-linker table.
///
/// Operations take `&mut self`, so a second load or submission cannot start
/// while one is pending.
pub struct TableController<B: LinkerBackend, N: Notifier> {
    backend: B,
    notifier: N,
    config: LinkerConfig,

    records: Vec<Arc<AggregatedRecord>>,
    filtered: Vec<Arc<AggregatedRecord>>,
    filters: FilterCriteria,
    selection: SelectionSet,
    page: PageState,

    loading: bool,
    source: DataSource,
    batch: Option<PollerState>,

    shutdown: CancellationToken,
    view_tx: watch::Sender<TableView>,
}

impl<B: LinkerBackend, N: Notifier> TableController<B, N> {
    pub fn new(backend: B, notifier: N, config: LinkerConfig) -> Self {
        let page = PageState::new(config.default_page_size);
        let (view_tx, _) = watch::channel(TableView {
            rows: Vec::new(),
            page: paginate::<Arc<AggregatedRecord>>(&[], page.current_page(), page.page_size()).info,
            filters: FilterCriteria::default(),
            selection: SelectionSet::new(),
            selected_count: 0,
            select_all: SelectAllState::None,
            is_loading: false,
            source: DataSource::None,
            batch: None,
        });

        Self {
            backend,
            notifier,
            config,
            records: Vec::new(),
            filtered: Vec::new(),
            filters: FilterCriteria::default(),
            selection: SelectionSet::new(),
            page,
            loading: false,
            source: DataSource::None,
            batch: None,
            shutdown: CancellationToken::new(),
            view_tx,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    /// Receiver of view snapshots; the current snapshot is available at once.
    pub fn subscribe(&self) -> watch::Receiver<TableView> {
        self.view_tx.subscribe()
    }

    /// Builds a snapshot of the current state.
    pub fn view(&self) -> TableView {
        let page = paginate(&self.filtered, self.page.current_page(), self.page.page_size());
        let select_all = SelectAllState::of(
            page.items.iter().map(|r| r.group_key.as_str()),
            &self.selection,
        );
        let rows = page
            .items
            .into_iter()
            .map(|record| VisibleRow {
                selected: self.selection.has(&record.group_key),
                record,
            })
            .collect();

        TableView {
            rows,
            page: page.info,
            filters: self.filters.clone(),
            selection: self.selection.clone(),
            selected_count: self.selection.len(),
            select_all,
            is_loading: self.loading,
            source: self.source.clone(),
            batch: self.batch.clone(),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn records(&self) -> &[Arc<AggregatedRecord>] {
        &self.records
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        self.view().rows
    }

    pub fn page_info(&self) -> PageInfo {
        paginate(&self.filtered, self.page.current_page(), self.page.page_size()).info
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn select_all_state(&self) -> SelectAllState {
        self.view().select_all
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn batch_state(&self) -> Option<&PollerState> {
        self.batch.as_ref()
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Token cancelled on teardown; clones can cancel an in-flight batch poll.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels any in-flight batch poll. Later batch fallbacks fail with
    /// [`AppError::Cancelled`].
    pub fn teardown(&mut self) {
        info!("[TABLE] Teardown");
        self.shutdown.cancel();
    }

    /// Returns records, filters, selection and paging to their initial state.
    pub fn reset(&mut self) {
        debug!("[TABLE] Reset");
        self.records.clear();
        self.filtered.clear();
        self.filters = FilterCriteria::default();
        self.selection = self.selection.clear();
        self.page = PageState::new(self.config.default_page_size);
        self.loading = false;
        self.source = DataSource::None;
        self.batch = None;
        self.publish();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Account suggestions for the account picker.
    ///
    /// Failures are logged and returned but not notified.
    pub async fn search_accounts(&self, term: &str) -> Result<Vec<AccountOption>, AppError> {
        self.backend.search_accounts(term).await.map_err(|e| {
            warn!("[TABLE] Account search failed: {}", e);
            e
        })
    }

    /// Loads the unlinked aggregations, running the batch job first if the
    /// backend has no aggregated results yet.
    pub async fn load_unlinked(&mut self) -> Result<(), AppError> {
        self.begin_load(DataSource::Unlinked);
        let result = self.fetch_unlinked().await;
        self.finish_load(result, LOAD_UNLINKED_FAILED)
    }

    /// Loads the aggregations currently linked to `account_id`.
    pub async fn load_linked(&mut self, account_id: &str) -> Result<(), AppError> {
        self.begin_load(DataSource::Linked {
            account_id: account_id.to_string(),
        });
        let backend = self.backend.clone();
        let result = backend.load_linked(account_id).await;
        self.finish_load(result, LOAD_LINKED_FAILED)
    }

    fn begin_load(&mut self, source: DataSource) {
        info!("[TABLE] Loading {:?}", source);
        self.records.clear();
        self.filtered.clear();
        self.page.clamp_to(0);
        self.loading = true;
        self.source = source;
        self.batch = None;
        self.publish();
    }

    async fn fetch_unlinked(&mut self) -> Result<Vec<AggregateRow>, AppError> {
        let backend = self.backend.clone();

        match backend.load_unlinked().await? {
            LoadResponse::Ready { data, .. } => Ok(data),
            LoadResponse::NeedsBatch => {
                self.run_batch().await?;

                // Re-issued exactly once after the batch completes.
                match backend.load_unlinked().await? {
                    LoadResponse::Ready { data, .. } => Ok(data),
                    LoadResponse::NeedsBatch => Err(AppError::BatchResultsUnavailable),
                }
            }
        }
    }

    async fn run_batch(&mut self) -> Result<(), AppError> {
        let mode = self.config.batch_mode.clone();
        let mut poller = BatchJobPoller::new(
            self.backend.clone(),
            &self.config,
            self.shutdown.child_token(),
        );

        let outcome = poller
            .run(&mode, |state| {
                self.batch = Some(state.clone());
                self.publish();
            })
            .await?;

        info!(
            "[TABLE] Batch {} finished ({} processed), reloading",
            redact_id(&outcome.job_id),
            outcome.progress.processed
        );
        Ok(())
    }

    fn finish_load(
        &mut self,
        result: Result<Vec<AggregateRow>, AppError>,
        context: &str,
    ) -> Result<(), AppError> {
        self.loading = false;

        match result {
            Ok(rows) => {
                self.records = map_rows(rows).into_iter().map(Arc::new).collect();
                self.batch = None;
                self.refilter();
                info!(
                    "[TABLE] Loaded {} record(s), {} after filters",
                    self.records.len(),
                    self.filtered.len()
                );
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.page.clamp_to(self.filtered.len());
                self.publish();
                self.report(context, &e);
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Filtering
    // ─────────────────────────────────────────────────────────────────────────

    /// Sets one column constraint and re-filters from page 1.
    pub fn set_filter(&mut self, field: FilterField, value: impl Into<String>) {
        self.filters.set(field, value);
        self.apply_filters();
    }

    /// [`set_filter`](Self::set_filter) addressed by wire name.
    pub fn set_filter_by_name(&mut self, field: &str, value: impl Into<String>) -> Result<(), AppError> {
        match field.parse::<FilterField>() {
            Ok(field) => {
                self.set_filter(field, value);
                Ok(())
            }
            Err(e) => {
                self.report("", &e);
                Err(e)
            }
        }
    }

    /// Re-runs the filters against the loaded records from page 1.
    pub fn apply_filters(&mut self) {
        self.page.reset_to_first();
        self.refilter();
        self.publish();
    }

    pub fn clear_filters(&mut self) {
        self.filters = FilterCriteria::default();
        self.apply_filters();
    }

    fn refilter(&mut self) {
        self.filtered = filter(&self.records, &self.filters);
        if self.page.clamp_to(self.filtered.len()) {
            debug!("[TABLE] Page reset to 1 after filtering");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Flips the selection of one loaded row. Unknown keys are ignored.
    pub fn toggle_row(&mut self, key: &str) {
        if !self.is_loaded(key) {
            debug!("[TABLE] Ignoring toggle of unknown row");
            return;
        }
        self.selection = self.selection.toggle(key);
        self.publish();
    }

    /// Sets the selection of one loaded row. Unknown keys are ignored.
    pub fn set_row_selected(&mut self, key: &str, selected: bool) {
        if !self.is_loaded(key) {
            return;
        }
        self.selection = self.selection.set(key, selected);
        self.publish();
    }

    /// Selects or deselects every row on the visible page, leaving
    /// selections on other pages untouched.
    pub fn toggle_select_all_visible(&mut self, checked: bool) {
        let page = paginate(&self.filtered, self.page.current_page(), self.page.page_size());
        let keys = page.items.iter().map(|r| r.group_key.as_str());
        self.selection = if checked {
            self.selection.select_all(keys)
        } else {
            self.selection.deselect_all(keys)
        };
        self.publish();
    }

    fn is_loaded(&self, key: &str) -> bool {
        self.records.iter().any(|r| r.group_key == key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Paging
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_page(&mut self, page: usize) {
        self.page.go_to(page, self.filtered.len());
        self.publish();
    }

    pub fn next_page(&mut self) {
        let info = self.page_info();
        if !info.is_last_page() {
            self.set_page(info.page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        let info = self.page_info();
        if !info.is_first_page() {
            self.set_page(info.page - 1);
        }
    }

    /// Changes rows per page and returns to page 1.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), AppError> {
        if page_size == 0 {
            let e = AppError::InvalidPageSize(page_size);
            self.report("", &e);
            return Err(e);
        }
        self.page.set_page_size(page_size);
        self.publish();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Links every selected record to `account_id`, then reloads the
    /// unlinked list. Returns the number of records submitted.
    ///
    /// Validation failures are reported without any backend call. A failed
    /// reload after a successful link is notified but does not fail the
    /// submission.
    pub async fn submit_link(&mut self, account_id: &str) -> Result<usize, AppError> {
        let validated = self.selected_payload().and_then(|payload| {
            let account_id = account_id.trim();
            if account_id.is_empty() {
                Err(AppError::NoAccountSelected)
            } else {
                Ok((payload, account_id.to_string()))
            }
        });
        let (payload, account_id) = match validated {
            Ok(v) => v,
            Err(e) => {
                self.report(LINK_FAILED, &e);
                return Err(e);
            }
        };

        info!(
            "[TABLE] Linking {} record(s) to {}",
            payload.len(),
            redact_id(&account_id)
        );
        self.loading = true;
        self.publish();

        let backend = self.backend.clone();
        if let Err(e) = backend.create_mappings(&payload, &account_id).await {
            self.loading = false;
            self.publish();
            self.report(LINK_FAILED, &e);
            return Err(e);
        }

        let count = payload.len();
        self.notifier.notify(Notification::success(format!(
            "Successfully linked {} record(s)",
            count
        )));
        self.selection = self.selection.clear();
        self.publish();

        if let Err(e) = self.load_unlinked().await {
            debug!("[TABLE] Reload after link failed: {}", e);
        }
        Ok(count)
    }

    /// Unlinks every selected record from the account last loaded with
    /// [`load_linked`](Self::load_linked), then reloads that account's list.
    pub async fn submit_unlink(&mut self) -> Result<usize, AppError> {
        let validated = self.selected_payload().and_then(|payload| match &self.source {
            DataSource::Linked { account_id } => Ok((payload, account_id.clone())),
            _ => Err(AppError::NoAccountSelected),
        });
        let (payload, account_id) = match validated {
            Ok(v) => v,
            Err(e) => {
                self.report(UNLINK_FAILED, &e);
                return Err(e);
            }
        };

        info!(
            "[TABLE] Unlinking {} record(s) from {}",
            payload.len(),
            redact_id(&account_id)
        );
        self.loading = true;
        self.publish();

        let backend = self.backend.clone();
        if let Err(e) = backend.delete_mappings(&payload).await {
            self.loading = false;
            self.publish();
            self.report(UNLINK_FAILED, &e);
            return Err(e);
        }

        let count = payload.len();
        self.notifier.notify(Notification::success(format!(
            "Successfully unlinked {} record(s)",
            count
        )));
        self.selection = self.selection.clear();
        self.publish();

        if let Err(e) = self.load_linked(&account_id).await {
            debug!("[TABLE] Reload after unlink failed: {}", e);
        }
        Ok(count)
    }

    /// Raw payloads of the selected loaded records, in record order.
    fn selected_payload(&self) -> Result<Vec<RawAggregate>, AppError> {
        let payload: Vec<RawAggregate> = self
            .records
            .iter()
            .filter(|r| self.selection.has(&r.group_key))
            .map(|r| r.raw_data.clone())
            .collect();

        if payload.is_empty() {
            return Err(AppError::EmptySelection);
        }

        if self.config.require_identifying_fields {
            let missing = payload.iter().filter(|r| !r.has_identifying_field()).count();
            if missing > 0 {
                return Err(AppError::MissingIdentifyingFields { count: missing });
            }
        }

        Ok(payload)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────────────────

    fn report(&self, context: &str, error: &AppError) {
        match error.category() {
            ErrorCategory::Cancelled => {
                info!("[TABLE] {} (cancelled)", context);
            }
            ErrorCategory::Validation => {
                debug!("[TABLE] Rejected: {}", error);
                self.notifier.notify(Notification::from_error(context, error));
            }
            _ => {
                warn!("[TABLE] {}: {}", context, error);
                self.notifier.notify(Notification::from_error(context, error));
            }
        }
    }
}

impl<B: LinkerBackend, N: Notifier> Drop for TableController<B, N> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
