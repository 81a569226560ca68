//! Multi-location comparison results

use super::context::LocationContext;
use super::location::Location;
use super::record::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One location's value in a delta row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaValue {
    pub value: FieldValue,
    /// True when the value came from a synthetic record
    pub estimated: bool,
}

impl DeltaValue {
    #[must_use]
    pub fn measured(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            estimated: false,
        }
    }

    #[must_use]
    pub fn estimated(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            estimated: true,
        }
    }
}

/// Position of a location in the comparison ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub location: Location,
    /// 1-based rank; `None` for locations with insufficient data
    pub rank: Option<usize>,
    /// Weighted overall score on a 0-10 scale
    pub score: Option<f64>,
    pub insufficient_data: bool,
    /// Fraction of scored fields that were available
    pub coverage: f64,
    /// Available fields backed by measured (non-synthetic) records
    pub measured_fields: usize,
    /// Index of the location in the caller's input
    pub input_index: usize,
}

/// A location that dropped out of the comparison before assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLocation {
    pub query: String,
    pub error: String,
}

/// Side-by-side result of evaluating several locations together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonBundle {
    pub contexts: Vec<LocationContext>,
    /// Field name to one slot per context, aligned with `contexts`
    pub deltas: BTreeMap<String, Vec<Option<DeltaValue>>>,
    pub ranking: Vec<RankingEntry>,
    #[serde(default)]
    pub failed: Vec<FailedLocation>,
}

impl ComparisonBundle {
    /// Locations in ranking order
    #[must_use]
    pub fn ranked_locations(&self) -> Vec<&Location> {
        self.ranking.iter().map(|entry| &entry.location).collect()
    }

    /// Best fully-scored location, if any
    #[must_use]
    pub fn winner(&self) -> Option<&RankingEntry> {
        self.ranking.first().filter(|entry| entry.rank.is_some())
    }
}
