//! Pure table core: record mapping, filtering, pagination and selection.
//!
//! Nothing in here performs I/O; the controller composes these pieces.

pub mod filter;
pub mod pagination;
pub mod record;
pub mod selection;

pub use filter::{filter, FilterCriteria, FilterField};
pub use pagination::{paginate, Page, PageInfo, PageState};
pub use record::{format_revenue, map_rows, AggregateRow, AggregatedRecord, RawAggregate};
pub use selection::SelectionSet;
