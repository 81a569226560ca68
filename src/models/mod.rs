//! Data models for the neighborhood intelligence engine
//!
//! This module contains the core domain models organized by concern:
//! - Location: geocoded coordinates and query parsing
//! - Record: source identifiers and the normalized record schema
//! - Context: the merged per-location dataset
//! - Comparison: multi-location deltas and ranking

pub mod comparison;
pub mod context;
pub mod location;
pub mod record;

// Re-export all public types for convenient access
pub use comparison::{ComparisonBundle, DeltaValue, FailedLocation, RankingEntry};
pub use context::LocationContext;
pub use location::{Location, LocationInput, LocationParser};
pub use record::{
    CONFIDENCE_FIELD, DERIVED_FROM_FIELD, FieldValue, LOW_CONFIDENCE, NormalizedRecord, SourceId,
    SourceRecord, SourceStatus, UnavailableReason,
};
