//! Per-location context: the merged dataset handed to synthesis

use super::location::Location;
use super::record::{
    CONFIDENCE_FIELD, DERIVED_FROM_FIELD, FieldValue, SourceId, SourceRecord, SourceStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything known about one location
///
/// Holds exactly one record per source that was needed for the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    pub location: Location,
    pub records: BTreeMap<SourceId, SourceRecord>,
}

impl LocationContext {
    #[must_use]
    pub fn new(location: Location, records: BTreeMap<SourceId, SourceRecord>) -> Self {
        Self { location, records }
    }

    #[must_use]
    pub fn record(&self, source: SourceId) -> Option<&SourceRecord> {
        self.records.get(&source)
    }

    /// Value of a field from any available record, with the record it came from
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(&FieldValue, &SourceRecord)> {
        self.records
            .values()
            .filter(|r| r.is_available())
            .find_map(|r| r.fields.get(name).map(|v| (v, r)))
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(|(v, _)| v.as_f64())
    }

    /// Data fields of every available record, excluding provenance markers
    pub fn available_fields(&self) -> impl Iterator<Item = (&str, &FieldValue, &SourceRecord)> {
        self.records
            .values()
            .filter(|r| r.is_available())
            .flat_map(|r| {
                r.fields
                    .iter()
                    .filter(|(name, _)| !is_marker_field(name))
                    .map(move |(name, value)| (name.as_str(), value, r))
            })
    }

    /// Number of records with the given status
    #[must_use]
    pub fn count_status(&self, status: SourceStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    /// Equality ignoring record timestamps
    #[must_use]
    pub fn same_content(&self, other: &LocationContext) -> bool {
        self.location == other.location
            && self.records.len() == other.records.len()
            && self
                .records
                .iter()
                .zip(other.records.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.same_content(b))
    }
}

/// Provenance markers are metadata, not data
#[must_use]
pub fn is_marker_field(name: &str) -> bool {
    name == CONFIDENCE_FIELD || name == DERIVED_FROM_FIELD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{NormalizedRecord, UnavailableReason};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn sample() -> LocationContext {
        let now = Utc::now();
        let mut records = BTreeMap::new();
        records.insert(
            SourceId::Walkability,
            SourceRecord::ok(
                SourceId::Walkability,
                NormalizedRecord::new().with("walk_score", 72.0),
                now,
            ),
        );
        records.insert(
            SourceId::Housing,
            SourceRecord::synthetic(
                SourceId::Housing,
                NormalizedRecord::new().with("housing_price", 300_000.0),
                BTreeSet::from([SourceId::Demographics]),
                UnavailableReason::Timeout,
                now,
            ),
        );
        records.insert(
            SourceId::Crime,
            SourceRecord::unavailable(SourceId::Crime, UnavailableReason::NotConfigured, now),
        );
        LocationContext::new(Location::from_coordinates(30.0, -96.0), records)
    }

    #[test]
    fn test_field_lookup_skips_unavailable() {
        let context = sample();
        assert_eq!(context.number("walk_score"), Some(72.0));
        assert_eq!(context.number("housing_price"), Some(300_000.0));
        assert!(context.field("safety_score").is_none());
    }

    #[test]
    fn test_available_fields_hide_markers() {
        let context = sample();
        let names: Vec<&str> = context.available_fields().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["housing_price", "walk_score"]);
    }

    #[test]
    fn test_count_status() {
        let context = sample();
        assert_eq!(context.count_status(SourceStatus::Ok), 1);
        assert_eq!(context.count_status(SourceStatus::Synthetic), 1);
        assert_eq!(context.count_status(SourceStatus::Unavailable), 1);
    }
}
