//! Overall score and ranking
//!
//! Each scored field is mapped onto 0-10 and weighted. Weights renormalize
//! over the fields a location actually has, so a missing source lowers
//! coverage rather than the score itself.

use crate::models::{LocationContext, RankingEntry};
use std::cmp::Ordering;

/// One scored field
#[derive(Debug, Clone, Copy)]
pub struct FieldWeight {
    pub field: &'static str,
    pub weight: f64,
    /// Raw value to 0-10, higher is better
    pub normalize: fn(f64) -> f64,
}

/// Fixed weights; they sum to 1.0
pub const WEIGHTS: &[FieldWeight] = &[
    FieldWeight {
        field: "safety_score",
        weight: 0.20,
        normalize: |v| v,
    },
    FieldWeight {
        field: "housing_price",
        weight: 0.15,
        normalize: |price| 10.0 * (1.0 - (price - 150_000.0) / 850_000.0),
    },
    FieldWeight {
        field: "walk_score",
        weight: 0.15,
        normalize: |score| score / 10.0,
    },
    FieldWeight {
        field: "commute_minutes",
        weight: 0.15,
        normalize: |minutes| 10.0 - (minutes - 10.0) / 5.0,
    },
    FieldWeight {
        field: "pm25_ugm3",
        weight: 0.10,
        normalize: |pm25| 10.0 - pm25 / 5.5,
    },
    FieldWeight {
        field: "amenity_count",
        weight: 0.10,
        normalize: |count| count.min(20.0) / 2.0,
    },
    FieldWeight {
        field: "temp_max_c",
        weight: 0.10,
        normalize: |celsius| 10.0 - (celsius - 22.0).abs() / 2.0,
    },
    FieldWeight {
        field: "median_income",
        weight: 0.05,
        normalize: |income| income / 150_000.0 * 10.0,
    },
];

/// Share of scored fields that must be present for a numeric rank
pub const DEFAULT_MIN_COVERAGE: f64 = 0.5;

/// Score of one context before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct LocationScore {
    /// `None` when coverage is below the threshold
    pub score: Option<f64>,
    pub coverage: f64,
    pub measured_fields: usize,
    /// Commute hours plus price in millions; lower is cheaper
    pub cost_proxy: Option<f64>,
}

impl LocationScore {
    #[must_use]
    pub fn insufficient_data(&self) -> bool {
        self.score.is_none()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score a context on the fixed weights
#[must_use]
pub fn score(context: &LocationContext, min_coverage: f64) -> LocationScore {
    let available: Vec<(&FieldWeight, f64)> = WEIGHTS
        .iter()
        .filter_map(|w| context.number(w.field).map(|v| (w, v)))
        .collect();

    let coverage = round2(available.len() as f64 / WEIGHTS.len() as f64);
    let total_weight: f64 = available.iter().map(|(w, _)| w.weight).sum();

    let score = (coverage >= min_coverage && total_weight > 0.0).then(|| {
        let weighted: f64 = available
            .iter()
            .map(|(w, v)| w.weight * (w.normalize)(*v).clamp(0.0, 10.0))
            .sum();
        round2(weighted / total_weight)
    });

    let measured_fields = context
        .available_fields()
        .filter(|(_, _, record)| !record.is_synthetic())
        .count();

    let commute = context.number("commute_minutes").map(|m| m / 60.0);
    let price = context.number("housing_price").map(|p| p / 1_000_000.0);
    let cost_proxy = match (commute, price) {
        (None, None) => None,
        (c, p) => Some(c.unwrap_or(0.0) + p.unwrap_or(0.0)),
    };

    LocationScore {
        score,
        coverage,
        measured_fields,
        cost_proxy,
    }
}

/// Order: score descending, then more measured fields, then lower cost
/// proxy (locations without one come last), then input order
fn compare_scored(a: &RankingEntry, b: &RankingEntry, costs: &[Option<f64>]) -> Ordering {
    let score = |e: &RankingEntry| e.score.unwrap_or(f64::NEG_INFINITY);
    let cost = |e: &RankingEntry| costs[e.input_index].unwrap_or(f64::INFINITY);

    score(b)
        .total_cmp(&score(a))
        .then_with(|| b.measured_fields.cmp(&a.measured_fields))
        .then_with(|| cost(a).total_cmp(&cost(b)))
        .then_with(|| a.input_index.cmp(&b.input_index))
}

/// Rank contexts; insufficient-data locations follow in input order without a rank
#[must_use]
pub fn rank(contexts: &[LocationContext], min_coverage: f64) -> Vec<RankingEntry> {
    let scores: Vec<LocationScore> = contexts.iter().map(|c| score(c, min_coverage)).collect();
    let costs: Vec<Option<f64>> = scores.iter().map(|s| s.cost_proxy).collect();

    let (mut scored, insufficient): (Vec<RankingEntry>, Vec<RankingEntry>) = contexts
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(input_index, (context, s))| RankingEntry {
            location: context.location.clone(),
            rank: None,
            score: s.score,
            insufficient_data: s.insufficient_data(),
            coverage: s.coverage,
            measured_fields: s.measured_fields,
            input_index,
        })
        .partition(|entry| !entry.insufficient_data);

    scored.sort_by(|a, b| compare_scored(a, b, &costs));
    for (position, entry) in scored.iter_mut().enumerate() {
        entry.rank = Some(position + 1);
    }

    scored.extend(insufficient);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NormalizedRecord, SourceId, SourceRecord, UnavailableReason};
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn context(name: &str, fields: &[(&str, f64)]) -> LocationContext {
        let record = fields
            .iter()
            .fold(NormalizedRecord::new(), |r, (k, v)| r.with(k, *v));
        let records = BTreeMap::from([(
            SourceId::Weather,
            SourceRecord::ok(SourceId::Weather, record, Utc::now()),
        )]);
        LocationContext::new(Location::new(name, 30.0, -96.0, name), records)
    }

    const FULL: &[(&str, f64)] = &[
        ("safety_score", 8.0),
        ("housing_price", 320_000.0),
        ("walk_score", 60.0),
        ("commute_minutes", 20.0),
        ("pm25_ugm3", 8.0),
        ("amenity_count", 12.0),
        ("temp_max_c", 30.0),
        ("median_income", 70_000.0),
    ];

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = WEIGHTS.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_renormalizes_over_available_fields() {
        let only_safety_and_walk = context(
            "a",
            &[
                ("safety_score", 8.0),
                ("walk_score", 60.0),
                ("amenity_count", 20.0),
                ("temp_max_c", 22.0),
            ],
        );
        let s = score(&only_safety_and_walk, 0.5);
        // (0.2*8 + 0.15*6 + 0.1*10 + 0.1*10) / 0.55
        assert_eq!(s.score, Some(8.18));
        assert_eq!(s.coverage, 0.5);
    }

    #[test]
    fn test_low_coverage_is_insufficient() {
        let sparse = context("sparse", &[("safety_score", 9.0), ("walk_score", 90.0)]);
        let s = score(&sparse, DEFAULT_MIN_COVERAGE);
        assert!(s.insufficient_data());
        assert_eq!(s.coverage, 0.25);
    }

    #[test]
    fn test_normalized_values_are_clamped() {
        let extreme = context(
            "x",
            &[
                ("housing_price", 5_000_000.0),
                ("commute_minutes", 2.0),
                ("pm25_ugm3", 500.0),
                ("median_income", 400_000.0),
            ],
        );
        // housing 0, commute 10, pm25 0, income 10
        let s = score(&extreme, 0.5);
        assert_eq!(s.score, Some(round2((0.15 * 10.0 + 0.05 * 10.0) / 0.45)));
    }

    #[test]
    fn test_rank_orders_by_score() {
        let mut worse = FULL.to_vec();
        worse[0] = ("safety_score", 4.0);
        let contexts = vec![context("worse", &worse), context("better", FULL)];

        let ranking = rank(&contexts, 0.5);
        assert_eq!(ranking[0].location.query, "better");
        assert_eq!(ranking[0].rank, Some(1));
        assert_eq!(ranking[1].location.query, "worse");
        assert_eq!(ranking[1].rank, Some(2));
    }

    #[test]
    fn test_exact_tie_prefers_measured_fields() {
        let plain = context("plain", FULL);
        let mut richer = context("richer", FULL);
        richer.records.insert(
            SourceId::Crime,
            SourceRecord::ok(
                SourceId::Crime,
                NormalizedRecord::new().with("total_incidents", 40.0),
                Utc::now(),
            ),
        );

        let ranking = rank(&[plain, richer], 0.5);
        assert_eq!(ranking[0].score, ranking[1].score);
        assert_eq!(ranking[0].location.query, "richer");
    }

    #[test]
    fn test_exact_tie_falls_back_to_input_order() {
        let ranking = rank(&[context("first", FULL), context("second", FULL)], 0.5);
        assert_eq!(ranking[0].location.query, "first");
        assert_eq!(ranking[1].location.query, "second");
    }

    /// Every scored field at the top of its scale
    const PERFECT: &[(&str, f64)] = &[
        ("safety_score", 10.0),
        ("housing_price", 120_000.0),
        ("walk_score", 100.0),
        ("commute_minutes", 8.0),
        ("pm25_ugm3", 0.0),
        ("amenity_count", 20.0),
        ("temp_max_c", 22.0),
        ("median_income", 150_000.0),
    ];

    #[test]
    fn test_exact_tie_prefers_lower_cost_proxy() {
        // commute and price both clamp to 10, so only the cost proxy differs
        let mut pricier = PERFECT.to_vec();
        pricier[1] = ("housing_price", 140_000.0);
        pricier[3] = ("commute_minutes", 9.0);
        let contexts = vec![context("pricier", &pricier), context("cheaper", PERFECT)];

        let ranking = rank(&contexts, 0.5);
        assert_eq!(ranking[0].score, ranking[1].score);
        assert_eq!(ranking[0].measured_fields, ranking[1].measured_fields);
        assert_eq!(ranking[0].location.query, "cheaper");
        assert_eq!(ranking[1].location.query, "pricier");
        assert_eq!(ranking[1].rank, Some(2));
    }

    #[test]
    fn test_missing_cost_proxy_sorts_after_present_one() {
        // same score and measured count, but no commute or price to compare on
        let mut no_cost: Vec<(&str, f64)> = PERFECT
            .iter()
            .copied()
            .filter(|(name, _)| *name != "housing_price" && *name != "commute_minutes")
            .collect();
        no_cost.extend([("total_incidents", 0.0), ("population_density", 2_000.0)]);
        let contexts = vec![context("no_cost", &no_cost), context("with_cost", PERFECT)];

        assert_eq!(score(&contexts[0], 0.5).cost_proxy, None);
        let ranking = rank(&contexts, 0.5);
        assert_eq!(ranking[0].score, ranking[1].score);
        assert_eq!(ranking[0].measured_fields, ranking[1].measured_fields);
        assert_eq!(ranking[0].location.query, "with_cost");
        assert_eq!(ranking[1].location.query, "no_cost");
    }

    #[test]
    fn test_compare_scored_tie_break_chain() {
        let entry = |input_index: usize, score: f64, measured_fields: usize| RankingEntry {
            location: Location::new("x", 30.0, -96.0, "x"),
            rank: None,
            score: Some(score),
            insufficient_data: false,
            coverage: 1.0,
            measured_fields,
            input_index,
        };
        let costs = [Some(0.9), Some(0.4), None, Some(0.4)];
        let order = |a: RankingEntry, b: RankingEntry| compare_scored(&a, &b, &costs);

        // lower cost wins over input order
        assert_eq!(order(entry(0, 7.0, 8), entry(1, 7.0, 8)), Ordering::Greater);
        // a missing proxy loses to any present one
        assert_eq!(order(entry(2, 7.0, 8), entry(0, 7.0, 8)), Ordering::Greater);
        // equal cost falls through to input order
        assert_eq!(order(entry(1, 7.0, 8), entry(3, 7.0, 8)), Ordering::Less);
        // measured fields outrank cost
        assert_eq!(order(entry(0, 7.0, 9), entry(1, 7.0, 8)), Ordering::Less);
    }

    #[test]
    fn test_synthetic_fields_do_not_count_as_measured() {
        let mut ctx = context("a", FULL);
        ctx.records.insert(
            SourceId::Housing,
            SourceRecord::synthetic(
                SourceId::Housing,
                NormalizedRecord::new().with("median_rent", 1_500.0),
                BTreeSet::from([SourceId::Geocoding]),
                UnavailableReason::Timeout,
                Utc::now(),
            ),
        );
        assert_eq!(score(&ctx, 0.5).measured_fields, FULL.len());
    }

    #[test]
    fn test_insufficient_data_comes_last_without_rank() {
        let contexts = vec![
            context("sparse", &[("safety_score", 10.0)]),
            context("full", FULL),
        ];
        let ranking = rank(&contexts, 0.5);

        assert_eq!(ranking[0].location.query, "full");
        assert_eq!(ranking[0].rank, Some(1));
        assert_eq!(ranking[1].location.query, "sparse");
        assert!(ranking[1].insufficient_data);
        assert_eq!(ranking[1].rank, None);
        assert_eq!(ranking[1].score, None);
    }
}
