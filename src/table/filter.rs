//! Column filters over the aggregated record set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::table::record::AggregatedRecord;

// ─────────────────────────────────────────────────────────────────────────────
// FilterField
// ─────────────────────────────────────────────────────────────────────────────

/// A filterable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    Distributor,
    ShipToName,
    TimePeriod,
    ContractName,
    Country,
    State,
    City,
    ZipCode,
}

impl FilterField {
    /// All columns in display order.
    pub const ALL: [FilterField; 8] = [
        FilterField::Distributor,
        FilterField::ShipToName,
        FilterField::TimePeriod,
        FilterField::ContractName,
        FilterField::Country,
        FilterField::State,
        FilterField::City,
        FilterField::ZipCode,
    ];

    /// Wire name used by the presentation layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Distributor => "distributor",
            FilterField::ShipToName => "shipToName",
            FilterField::TimePeriod => "timePeriod",
            FilterField::ContractName => "contractName",
            FilterField::Country => "country",
            FilterField::State => "state",
            FilterField::City => "city",
            FilterField::ZipCode => "zipCode",
        }
    }

    /// Postal codes and time periods are code strings and match case-sensitively.
    pub fn is_case_sensitive(&self) -> bool {
        matches!(self, FilterField::TimePeriod | FilterField::ZipCode)
    }

    /// Reads this column from a record.
    pub fn value_of<'r>(&self, record: &'r AggregatedRecord) -> &'r str {
        match self {
            FilterField::Distributor => &record.distributor,
            FilterField::ShipToName => &record.ship_to_name,
            FilterField::TimePeriod => &record.time_period,
            FilterField::ContractName => &record.contract_name,
            FilterField::Country => &record.country,
            FilterField::State => &record.state,
            FilterField::City => &record.city,
            FilterField::ZipCode => &record.zip_code,
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AppError::UnknownFilterField(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FilterCriteria
// ─────────────────────────────────────────────────────────────────────────────

/// One substring constraint per column; an empty string means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    pub distributor: String,
    pub ship_to_name: String,
    pub time_period: String,
    pub contract_name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub zip_code: String,
}

impl FilterCriteria {
    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Distributor => &self.distributor,
            FilterField::ShipToName => &self.ship_to_name,
            FilterField::TimePeriod => &self.time_period,
            FilterField::ContractName => &self.contract_name,
            FilterField::Country => &self.country,
            FilterField::State => &self.state,
            FilterField::City => &self.city,
            FilterField::ZipCode => &self.zip_code,
        }
    }

    pub fn set(&mut self, field: FilterField, value: impl Into<String>) {
        let slot = match field {
            FilterField::Distributor => &mut self.distributor,
            FilterField::ShipToName => &mut self.ship_to_name,
            FilterField::TimePeriod => &mut self.time_period,
            FilterField::ContractName => &mut self.contract_name,
            FilterField::Country => &mut self.country,
            FilterField::State => &mut self.state,
            FilterField::City => &mut self.city,
            FilterField::ZipCode => &mut self.zip_code,
        };
        *slot = value.into();
    }

    /// True when no column is constrained.
    pub fn is_empty(&self) -> bool {
        FilterField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Columns with a non-empty constraint, paired with the constraint.
    fn active(&self) -> Vec<ActiveConstraint> {
        FilterField::ALL
            .into_iter()
            .filter(|f| !self.get(*f).is_empty())
            .map(|field| {
                let needle = self.get(field);
                ActiveConstraint {
                    field,
                    needle: if field.is_case_sensitive() {
                        needle.to_string()
                    } else {
                        needle.to_lowercase()
                    },
                }
            })
            .collect()
    }
}

/// A constraint with its needle pre-normalised for the column's case rule.
struct ActiveConstraint {
    field: FilterField,
    needle: String,
}

impl ActiveConstraint {
    fn matches(&self, record: &AggregatedRecord) -> bool {
        let value = self.field.value_of(record);
        if value.is_empty() {
            return false;
        }
        if self.field.is_case_sensitive() {
            value.contains(self.needle.as_str())
        } else {
            value.to_lowercase().contains(self.needle.as_str())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filtering
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the records satisfying every non-empty constraint, in input order.
///
/// Generic over the record handle so the controller can filter shared
/// (`Arc`) records without cloning their contents.
pub fn filter<R>(records: &[R], criteria: &FilterCriteria) -> Vec<R>
where
    R: AsRef<AggregatedRecord> + Clone,
{
    let constraints = criteria.active();
    if constraints.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|r| constraints.iter().all(|c| c.matches(r.as_ref())))
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
