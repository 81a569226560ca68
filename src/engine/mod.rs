//! Context assembly engine
//!
//! - assembler: source selection, concurrent fetches, fold into a context
//! - fallback: derived estimates for failed sources
//! - scoring: overall score and ranking
//! - compare: side-by-side bundles across locations

pub mod assembler;
pub mod compare;
pub mod fallback;
pub mod scoring;

pub use assembler::ContextAssembler;
pub use compare::ComparativeAggregator;
pub use scoring::{DEFAULT_MIN_COVERAGE, LocationScore, WEIGHTS};
