//! Neighborhood intelligence: location context assembly and comparison
//!
//! This library resolves a location, fetches every relevant data source
//! concurrently, fills failed sources with low-confidence estimates, and
//! merges the results into one context. Several contexts can be compared and
//! ranked, and either can be handed to a language model for a narrative.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod location_resolver;
pub mod models;
pub mod service;
pub mod sources;
pub mod synthesis;
pub mod telemetry;
pub mod web;

// Re-export core types for public API
pub use config::IntelConfig;
pub use engine::{ComparativeAggregator, ContextAssembler};
pub use error::IntelError;
pub use location_resolver::LocationResolver;
pub use models::{
    ComparisonBundle, Location, LocationContext, NormalizedRecord, SourceId, SourceRecord,
    SourceStatus,
};
pub use service::{IntelService, ToolTarget};
pub use sources::{IntentHints, SourceAdapter, SourceRegistry};
pub use synthesis::{Analysis, SynthesisClient, SynthesisError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, IntelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
