//! Fallback resolver
//!
//! Turns a failed source into a low-confidence estimate derived from the
//! records that did arrive, or into an explicit `Unavailable` record. The
//! policy is an ordered table; the first row naming the failed source wins.
//! Only measured (`Ok`) records are consulted, so the result depends on
//! nothing but the failure and that set.

use crate::models::{
    Location, NormalizedRecord, SourceId, SourceRecord, SourceStatus, UnavailableReason,
};
use crate::sources::crime::safety_label;
use crate::sources::housing::estimated_rent;
use crate::sources::walkability::walk_description;
use crate::sources::FetchError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Regional averages: (city, median price, monthly rent)
pub const REGIONAL_HOUSING: &[(&str, f64, f64)] = &[
    ("College Station", 285_000.0, 1_200.0),
    ("Bryan", 210_000.0, 950.0),
    ("Austin", 550_000.0, 1_850.0),
    ("Houston", 325_000.0, 1_400.0),
    ("Dallas", 375_000.0, 1_600.0),
];

/// Price and rent used when neither the city nor the income is known
pub const DEFAULT_HOUSING: (f64, f64) = (300_000.0, 1_300.0);

/// Home price as a multiple of household income
pub const PRICE_TO_INCOME: f64 = 4.4;

/// Safety score assumed when nothing else is known
pub const NEUTRAL_SAFETY: f64 = 7.0;
/// Income the neutral baseline is calibrated against
pub const REFERENCE_INCOME: f64 = 68_500.0;
const MAX_INCOME_ADJUSTMENT: f64 = 1.5;

/// Measured records of one location, as seen by the derivations
pub struct Evidence<'a> {
    pub location: &'a Location,
    records: &'a BTreeMap<SourceId, SourceRecord>,
}

impl<'a> Evidence<'a> {
    #[must_use]
    pub fn new(location: &'a Location, records: &'a BTreeMap<SourceId, SourceRecord>) -> Self {
        Self { location, records }
    }

    fn number(&self, source: SourceId, field: &str) -> Option<f64> {
        self.records
            .get(&source)
            .filter(|r| r.status == SourceStatus::Ok)
            .and_then(|r| r.number(field))
    }
}

/// A derivation: estimated fields plus the sources they came from
type Derivation = fn(&Evidence<'_>) -> Option<(NormalizedRecord, BTreeSet<SourceId>)>;

/// Ordered policy table
const POLICIES: &[(SourceId, Derivation)] = &[
    (SourceId::Housing, estimate_housing),
    (SourceId::Walkability, estimate_walkability),
    (SourceId::Crime, estimate_safety),
];

/// Replacement record for a failed source. Never fails.
#[must_use]
pub fn resolve(
    source: SourceId,
    failure: &FetchError,
    evidence: &Evidence<'_>,
    at: DateTime<Utc>,
) -> SourceRecord {
    let Some((_, derive)) = POLICIES.iter().find(|(id, _)| *id == source) else {
        return SourceRecord::unavailable(source, failure.reason(), at);
    };

    match derive(evidence) {
        Some((record, derived_from)) => {
            debug!(source = %source, ?derived_from, "Derived synthetic record");
            SourceRecord::synthetic(source, record, derived_from, failure.reason(), at)
        }
        None => {
            debug!(source = %source, "No inputs to derive an estimate from");
            SourceRecord::unavailable(
                source,
                UnavailableReason::NoDerivation {
                    cause: failure.reason().to_string(),
                },
                at,
            )
        }
    }
}

/// Regional averages by city name, else an income multiple, else the default row
fn estimate_housing(evidence: &Evidence<'_>) -> Option<(NormalizedRecord, BTreeSet<SourceId>)> {
    let address = evidence.location.resolved_address.to_ascii_lowercase();
    if let Some((city, price, rent)) = REGIONAL_HOUSING
        .iter()
        .find(|(city, _, _)| address.contains(&city.to_ascii_lowercase()))
    {
        let record = NormalizedRecord::new()
            .with("housing_price", *price)
            .with("median_rent", *rent)
            .with("housing_source", format!("regional average ({city})"));
        return Some((record, BTreeSet::from([SourceId::Geocoding])));
    }

    if let Some(income) = evidence.number(SourceId::Demographics, "median_income") {
        let price = (income * PRICE_TO_INCOME / 1_000.0).round() * 1_000.0;
        let record = NormalizedRecord::new()
            .with("housing_price", price)
            .with("median_rent", estimated_rent(price))
            .with("housing_source", "income multiple");
        return Some((record, BTreeSet::from([SourceId::Demographics])));
    }

    let (price, rent) = DEFAULT_HOUSING;
    let record = NormalizedRecord::new()
        .with("housing_price", price)
        .with("median_rent", rent)
        .with("housing_source", "regional average (default)");
    Some((record, BTreeSet::from([SourceId::Geocoding])))
}

/// Blend of amenity density and population density (a street-network proxy)
fn estimate_walkability(
    evidence: &Evidence<'_>,
) -> Option<(NormalizedRecord, BTreeSet<SourceId>)> {
    let mut components = Vec::new();
    let mut derived_from = BTreeSet::new();

    if let Some(count) = evidence.number(SourceId::Amenities, "amenity_count") {
        components.push((count * 5.0).min(100.0));
        derived_from.insert(SourceId::Amenities);
    }
    if let Some(density) = evidence.number(SourceId::Demographics, "population_density") {
        components.push((density / 100.0).min(100.0));
        derived_from.insert(SourceId::Demographics);
    }
    if components.is_empty() {
        return None;
    }

    let score = (components.iter().sum::<f64>() / components.len() as f64).floor();
    let record = NormalizedRecord::new()
        .with("walk_score", score)
        .with("walk_description", walk_description(score))
        .with("walk_source", "density estimate");
    Some((record, derived_from))
}

/// Neutral baseline, nudged by household income relative to the reference when known
fn estimate_safety(evidence: &Evidence<'_>) -> Option<(NormalizedRecord, BTreeSet<SourceId>)> {
    let (score, derived_from) = match evidence.number(SourceId::Demographics, "median_income") {
        Some(income) => {
            let adjustment = ((income - REFERENCE_INCOME) / REFERENCE_INCOME * 2.0)
                .clamp(-MAX_INCOME_ADJUSTMENT, MAX_INCOME_ADJUSTMENT);
            let score = ((NEUTRAL_SAFETY + adjustment).clamp(0.0, 10.0) * 10.0).round() / 10.0;
            (score, BTreeSet::from([SourceId::Demographics]))
        }
        None => (NEUTRAL_SAFETY, BTreeSet::new()),
    };

    let record = NormalizedRecord::new()
        .with("safety_score", score)
        .with("safety_label", safety_label(score));
    Some((record, derived_from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CONFIDENCE_FIELD, DERIVED_FROM_FIELD, LOW_CONFIDENCE};
    use rstest::rstest;

    fn ok(source: SourceId, record: NormalizedRecord) -> (SourceId, SourceRecord) {
        (source, SourceRecord::ok(source, record, Utc::now()))
    }

    fn location(address: &str) -> Location {
        Location::new(address, 32.0, -97.0, address)
    }

    #[test]
    fn test_regional_housing_estimate() {
        let location = location("Lakewood, Dallas, Dallas County, Texas, USA");
        let records = BTreeMap::new();
        let record = resolve(
            SourceId::Housing,
            &FetchError::Timeout,
            &Evidence::new(&location, &records),
            Utc::now(),
        );

        assert_eq!(record.status, SourceStatus::Synthetic);
        assert_eq!(record.number("housing_price"), Some(375_000.0));
        assert_eq!(record.number("median_rent"), Some(1_600.0));
        assert_eq!(record.text(CONFIDENCE_FIELD), Some(LOW_CONFIDENCE));
        assert_eq!(record.derived_from, BTreeSet::from([SourceId::Geocoding]));
        assert_eq!(record.reason, Some(UnavailableReason::Timeout));
    }

    #[test]
    fn test_income_multiple_housing_estimate() {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::from([ok(
            SourceId::Demographics,
            NormalizedRecord::new().with("median_income", 70_000.0),
        )]);
        let record = resolve(
            SourceId::Housing,
            &FetchError::NotConfigured,
            &Evidence::new(&location, &records),
            Utc::now(),
        );

        assert_eq!(record.number("housing_price"), Some(308_000.0));
        assert_eq!(record.number("median_rent"), Some(1_540.0));
        assert_eq!(record.text(DERIVED_FROM_FIELD), Some("demographics"));
    }

    #[test]
    fn test_walkability_blends_available_proxies() {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::from([
            ok(SourceId::Amenities, NormalizedRecord::new().with("amenity_count", 12.0)),
            ok(
                SourceId::Demographics,
                NormalizedRecord::new().with("population_density", 4_200.0),
            ),
        ]);
        let record = resolve(
            SourceId::Walkability,
            &FetchError::HttpError(503),
            &Evidence::new(&location, &records),
            Utc::now(),
        );

        // (60 + 42) / 2
        assert_eq!(record.number("walk_score"), Some(51.0));
        assert_eq!(
            record.derived_from,
            BTreeSet::from([SourceId::Amenities, SourceId::Demographics])
        );
    }

    #[rstest]
    #[case(68_500.0, 7.0)]
    #[case(85_625.0, 7.5)]
    #[case(250_000.0, 8.5)]
    #[case(10_000.0, 5.5)]
    fn test_safety_baseline(#[case] income: f64, #[case] expected: f64) {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::from([ok(
            SourceId::Demographics,
            NormalizedRecord::new().with("median_income", income),
        )]);
        let record = resolve(
            SourceId::Crime,
            &FetchError::NotConfigured,
            &Evidence::new(&location, &records),
            Utc::now(),
        );
        assert_eq!(record.number("safety_score"), Some(expected));
        assert!(record.is_synthetic());
    }

    #[test]
    fn test_no_inputs_gives_no_derivation() {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::new();
        let record = resolve(
            SourceId::Walkability,
            &FetchError::HttpError(500),
            &Evidence::new(&location, &records),
            Utc::now(),
        );
        assert_eq!(record.status, SourceStatus::Unavailable);
        assert!(matches!(record.reason, Some(UnavailableReason::NoDerivation { .. })));
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_safety_without_income_is_neutral() {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::new();
        let record = resolve(
            SourceId::Crime,
            &FetchError::HttpError(500),
            &Evidence::new(&location, &records),
            Utc::now(),
        );
        assert_eq!(record.status, SourceStatus::Synthetic);
        assert_eq!(record.number("safety_score"), Some(NEUTRAL_SAFETY));
        assert_eq!(record.text("safety_label"), Some("Moderately Safe"));
        assert!(record.derived_from.is_empty());
        assert_eq!(record.reason, Some(UnavailableReason::HttpError { status: 500 }));
    }

    #[test]
    fn test_housing_default_row_without_city_or_income() {
        let location = location("Springfield, Illinois");
        let records = BTreeMap::new();
        let record = resolve(
            SourceId::Housing,
            &FetchError::NotConfigured,
            &Evidence::new(&location, &records),
            Utc::now(),
        );
        assert_eq!(record.status, SourceStatus::Synthetic);
        assert_eq!(record.number("housing_price"), Some(300_000.0));
        assert_eq!(record.number("median_rent"), Some(1_300.0));
        assert_eq!(record.derived_from, BTreeSet::from([SourceId::Geocoding]));
    }

    #[test]
    fn test_sources_without_policy_are_never_fabricated() {
        let location = location("Dallas, Texas");
        let records = BTreeMap::from([ok(
            SourceId::Demographics,
            NormalizedRecord::new().with("median_income", 70_000.0),
        )]);
        for source in [SourceId::Weather, SourceId::Commute, SourceId::AirQuality] {
            let record = resolve(
                source,
                &FetchError::Timeout,
                &Evidence::new(&location, &records),
                Utc::now(),
            );
            assert_eq!(record.status, SourceStatus::Unavailable);
            assert_eq!(record.reason, Some(UnavailableReason::Timeout));
        }
    }

    #[test]
    fn test_synthetic_inputs_are_ignored() {
        let location = location("Springfield, Illinois");
        let mut records = BTreeMap::new();
        records.insert(
            SourceId::Demographics,
            SourceRecord::synthetic(
                SourceId::Demographics,
                NormalizedRecord::new().with("median_income", 90_000.0),
                BTreeSet::new(),
                UnavailableReason::Timeout,
                Utc::now(),
            ),
        );
        let record = resolve(
            SourceId::Crime,
            &FetchError::Timeout,
            &Evidence::new(&location, &records),
            Utc::now(),
        );
        // the estimated income is not used; only the neutral baseline remains
        assert_eq!(record.number("safety_score"), Some(NEUTRAL_SAFETY));
        assert!(record.derived_from.is_empty());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let location = location("Austin, Texas");
        let records = BTreeMap::from([ok(
            SourceId::Demographics,
            NormalizedRecord::new()
                .with("median_income", 91_000.0)
                .with("population_density", 3_100.0),
        )]);
        let evidence = Evidence::new(&location, &records);
        let at = Utc::now();
        for source in SourceId::ALL {
            let first = resolve(source, &FetchError::Timeout, &evidence, at);
            let second = resolve(source, &FetchError::Timeout, &evidence, at);
            assert_eq!(first, second);
        }
    }
}
