//! Comparative aggregator: several locations assembled side by side

use super::assembler::ContextAssembler;
use super::scoring;
use crate::models::{ComparisonBundle, DeltaValue, FailedLocation, Location, LocationContext};
use crate::sources::IntentHints;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ComparativeAggregator {
    assembler: ContextAssembler,
    min_coverage: f64,
}

impl ComparativeAggregator {
    #[must_use]
    pub fn new(assembler: ContextAssembler, min_coverage: f64) -> Self {
        Self {
            assembler,
            min_coverage,
        }
    }

    /// One independent assembly per location, run concurrently
    #[instrument(skip_all, fields(locations = locations.len()))]
    pub async fn compare(&self, locations: &[Location], hints: &IntentHints) -> ComparisonBundle {
        self.compare_with_failures(locations, hints, Vec::new()).await
    }

    /// As [`compare`](Self::compare), carrying locations that failed before assembly
    pub async fn compare_with_failures(
        &self,
        locations: &[Location],
        hints: &IntentHints,
        failed: Vec<FailedLocation>,
    ) -> ComparisonBundle {
        let contexts = join_all(
            locations
                .iter()
                .map(|location| self.assembler.assemble(location, hints)),
        )
        .await;

        let bundle = bundle(contexts, self.min_coverage, failed);
        info!(
            compared = bundle.contexts.len(),
            failed = bundle.failed.len(),
            winner = bundle.winner().map(|w| w.location.label()).unwrap_or("-"),
            "Comparison complete"
        );
        bundle
    }
}

/// Deltas and ranking over already assembled contexts
#[must_use]
pub fn bundle(
    contexts: Vec<LocationContext>,
    min_coverage: f64,
    failed: Vec<FailedLocation>,
) -> ComparisonBundle {
    let deltas = deltas(&contexts);
    let ranking = scoring::rank(&contexts, min_coverage);
    ComparisonBundle {
        contexts,
        deltas,
        ranking,
        failed,
    }
}

/// Fields present in at least two contexts, one slot per context in input order
#[must_use]
pub fn deltas(contexts: &[LocationContext]) -> BTreeMap<String, Vec<Option<DeltaValue>>> {
    let names: BTreeSet<&str> = contexts
        .iter()
        .flat_map(|c| c.available_fields().map(|(name, _, _)| name))
        .collect();

    names
        .into_iter()
        .filter_map(|name| {
            let row: Vec<Option<DeltaValue>> = contexts
                .iter()
                .map(|c| {
                    c.field(name).map(|(value, record)| DeltaValue {
                        value: value.clone(),
                        estimated: record.is_synthetic(),
                    })
                })
                .collect();
            (row.iter().flatten().count() >= 2).then(|| (name.to_string(), row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedRecord, SourceId, SourceRecord, UnavailableReason};
    use chrono::Utc;

    fn context(name: &str, records: Vec<SourceRecord>) -> LocationContext {
        LocationContext::new(
            Location::new(name, 30.0, -96.0, name),
            records.into_iter().map(|r| (r.source_id, r)).collect(),
        )
    }

    #[test]
    fn test_deltas_need_two_locations() {
        let now = Utc::now();
        let a = context(
            "a",
            vec![
                SourceRecord::ok(
                    SourceId::Housing,
                    NormalizedRecord::new().with("housing_price", 550_000.0),
                    now,
                ),
                SourceRecord::ok(
                    SourceId::Weather,
                    NormalizedRecord::new().with("temperature_c", 24.0),
                    now,
                ),
            ],
        );
        let b = context(
            "b",
            vec![
                SourceRecord::synthetic(
                    SourceId::Housing,
                    NormalizedRecord::new().with("housing_price", 375_000.0),
                    BTreeSet::from([SourceId::Geocoding]),
                    UnavailableReason::Timeout,
                    now,
                ),
                SourceRecord::unavailable(SourceId::Weather, UnavailableReason::Timeout, now),
            ],
        );
        let c = context("c", vec![]);

        let deltas = deltas(&[a, b, c]);
        assert_eq!(
            deltas["housing_price"],
            vec![
                Some(DeltaValue::measured(550_000.0)),
                Some(DeltaValue::estimated(375_000.0)),
                None
            ]
        );
        assert!(!deltas.contains_key("temperature_c"));
        assert!(!deltas.contains_key("confidence"));
        assert!(!deltas.contains_key("derived_from"));
    }
}
