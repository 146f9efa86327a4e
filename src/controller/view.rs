//! Snapshots published to the presentation layer after every state change.

use std::sync::Arc;

use serde::Serialize;

use crate::salesforce::PollerState;
use crate::table::{FilterCriteria, PageInfo, SelectionSet};
use crate::table::record::AggregatedRecord;

/// Which list the table is showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataSource {
    /// Nothing loaded yet.
    None,
    Unlinked,
    #[serde(rename_all = "camelCase")]
    Linked { account_id: String },
}

/// Header checkbox state for the visible page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectAllState {
    /// No visible row is selected (or the page is empty).
    None,
    /// Some but not all visible rows are selected.
    Indeterminate,
    /// Every visible row is selected.
    All,
}

impl SelectAllState {
    pub fn of<'a>(keys: impl IntoIterator<Item = &'a str>, selection: &SelectionSet) -> Self {
        let (mut total, mut selected) = (0usize, 0usize);
        for key in keys {
            total += 1;
            if selection.has(key) {
                selected += 1;
            }
        }
        match selected {
            0 => SelectAllState::None,
            n if n == total => SelectAllState::All,
            _ => SelectAllState::Indeterminate,
        }
    }
}

/// One visible row with its selection flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    #[serde(flatten)]
    pub record: Arc<AggregatedRecord>,
    pub selected: bool,
}

/// Everything the presentation layer needs to render the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub rows: Vec<VisibleRow>,
    pub page: PageInfo,
    pub filters: FilterCriteria,
    pub selection: SelectionSet,
    pub selected_count: usize,
    pub select_all: SelectAllState,
    pub is_loading: bool,
    pub source: DataSource,
    /// Latest batch poller state, while a batch run is part of the load.
    pub batch: Option<PollerState>,
}
