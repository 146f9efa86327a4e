//! Aggregated trace-sales records and their mapping from backend rows.
//!
//! A backend row is an aggregation bucket: many underlying trace-sale
//! records rolled up by distributor, customer, location and time period.
//! [`AggregatedRecord`] is the display form the table works with; it keeps
//! the unformatted payload in [`RawAggregate`] so link/unlink submissions
//! send exactly what the backend produced.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Unformatted aggregation payload, echoed back on link/unlink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAggregate {
    #[serde(default)]
    pub distributor: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub total_revenue: Option<f64>,
    #[serde(default)]
    pub contract_names: Option<String>,
    #[serde(default)]
    pub trace_sale_ids: Option<Vec<String>>,
    #[serde(default)]
    pub time_period: Option<String>,
}

impl RawAggregate {
    /// True when at least one of distributor or customer is non-blank.
    pub fn has_identifying_field(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.distributor) || present(&self.customer)
    }
}

/// One aggregation bucket as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub group_key: String,
    #[serde(flatten)]
    pub raw: RawAggregate,
}

// ─────────────────────────────────────────────────────────────────────────────
// AggregatedRecord
// ─────────────────────────────────────────────────────────────────────────────

/// Display record for one aggregation bucket.
///
/// Display fields are derived once in [`AggregatedRecord::from_row`] and never
/// patched afterwards; a reload replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub group_key: String,
    pub distributor: String,
    pub ship_to_name: String,
    pub time_period: String,
    pub total_revenue: String,
    pub contract_name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub zip_code: String,
    pub trace_sale_ids: Vec<String>,
    pub raw_data: RawAggregate,
}

impl AggregatedRecord {
    /// Maps a backend row into its display form, defaulting missing text to
    /// the empty string and missing id lists to an empty list.
    pub fn from_row(row: AggregateRow) -> Self {
        let AggregateRow { group_key, raw } = row;
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        Self {
            group_key,
            distributor: text(&raw.distributor),
            ship_to_name: text(&raw.customer),
            time_period: text(&raw.time_period),
            total_revenue: format_revenue(raw.total_revenue),
            contract_name: text(&raw.contract_names),
            country: text(&raw.country),
            state: text(&raw.state),
            city: text(&raw.city),
            zip_code: text(&raw.zip_code),
            trace_sale_ids: raw.trace_sale_ids.clone().unwrap_or_default(),
            raw_data: raw,
        }
    }
}

/// Lets filtering take owned records and shared `Arc` handles alike.
impl AsRef<AggregatedRecord> for AggregatedRecord {
    fn as_ref(&self) -> &AggregatedRecord {
        self
    }
}

/// Maps a full backend result set, preserving order.
pub fn map_rows(rows: Vec<AggregateRow>) -> Vec<AggregatedRecord> {
    rows.into_iter().map(AggregatedRecord::from_row).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Revenue Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum fraction digits kept when displaying revenue (en-US default).
const MAX_FRACTION_DIGITS: usize = 3;

/// Formats revenue as a dollar amount with comma thousands grouping.
///
/// Up to three fraction digits are kept with trailing zeros trimmed, so
/// `1234567.5` renders as `$1,234,567.5`. Missing or non-finite values
/// render as `$0`.
pub fn format_revenue(value: Option<f64>) -> String {
    let v = match value {
        Some(v) if v.is_finite() => v,
        _ => return "$0".to_string(),
    };

    let fixed = format!("{:.*}", MAX_FRACTION_DIGITS, v.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (fixed.as_str(), ""),
    };

    let grouped = group_thousands(int_part);
    let negative = v < 0.0 && (grouped != "0" || !frac_part.is_empty());
    let sign = if negative { "-" } else { "" };

    if frac_part.is_empty() {
        format!("{}${}", sign, grouped)
    } else {
        format!("{}${}.{}", sign, grouped, frac_part)
    }
}

/// Inserts a comma every three digits from the right.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
