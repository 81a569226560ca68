//! Context assembler
//!
//! Fans out one task per selected source, each under its own timeout, then
//! folds the outcomes (with fallbacks for the failures) into a
//! [`LocationContext`]. Every selected source ends up with exactly one record.

use super::fallback::{self, Evidence};
use crate::models::{Location, LocationContext, NormalizedRecord, SourceId, SourceRecord};
use crate::sources::{ErrorClass, FetchError, FetchParams, IntentHints, SourceRegistry};
use chrono::Utc;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

type Outcome = Result<NormalizedRecord, FetchError>;

/// Builds one context per location from the capability table
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    registry: Arc<SourceRegistry>,
}

impl ContextAssembler {
    #[must_use]
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Assemble with default provider options
    pub async fn assemble(&self, location: &Location, hints: &IntentHints) -> LocationContext {
        self.assemble_with_options(location, hints, &BTreeMap::new())
            .await
    }

    /// Assemble, passing source-specific options (commute destination, amenity type, ...)
    #[instrument(skip(self, hints, options), fields(location = %location.label()))]
    pub async fn assemble_with_options(
        &self,
        location: &Location,
        hints: &IntentHints,
        options: &BTreeMap<String, String>,
    ) -> LocationContext {
        let started = Instant::now();
        let selected = self.registry.select(hints);
        let params = Arc::new(FetchParams {
            location: location.clone(),
            options: options.clone(),
        });

        let mut outcomes: BTreeMap<SourceId, Outcome> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut active = Vec::new();

        for source in &selected {
            let Some(capability) = self.registry.capability(*source) else {
                continue;
            };
            if !capability.configured {
                outcomes.insert(*source, Err(FetchError::NotConfigured));
                continue;
            }

            active.push(*source);
            let adapter = capability.adapter();
            let timeout = capability.timeout;
            let params = Arc::clone(&params);
            let source = *source;
            tasks.spawn(async move {
                let fetch = AssertUnwindSafe(adapter.fetch(&params)).catch_unwind();
                let outcome = match tokio::time::timeout(timeout, fetch).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(_)) => Err(FetchError::Malformed("adapter panicked".into())),
                    Err(_) => Err(FetchError::Timeout),
                };
                (source, outcome)
            });
        }

        // Per-task timeouts fire first; this bounds the whole location
        let deadline = self.registry.max_timeout(active.iter());
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((source, outcome)) => {
                        outcomes.insert(source, outcome);
                    }
                    Err(e) => error!("Fetch task failed to join: {}", e),
                }
            }
        };
        if tokio::time::timeout(deadline, collect).await.is_err() {
            warn!(deadline_ms = deadline.as_millis() as u64, "Assembly deadline reached");
        }
        // Abandon stragglers before folding
        drop(tasks);

        for source in active {
            outcomes.entry(source).or_insert(Err(FetchError::Timeout));
        }

        let context = fold(location, outcomes);
        info!(
            sources = context.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assembled location context"
        );
        context
    }

    /// Single source, no fallback; backs the per-source tools
    #[instrument(skip(self, params), fields(location = %params.location.label()))]
    pub async fn fetch_one(&self, source: SourceId, params: FetchParams) -> SourceRecord {
        let outcome = match self.registry.capability(source) {
            None => Err(FetchError::NotConfigured),
            Some(capability) if !capability.configured => Err(FetchError::NotConfigured),
            Some(capability) => {
                let adapter = capability.adapter();
                tokio::time::timeout(capability.timeout, adapter.fetch(&params))
                    .await
                    .unwrap_or(Err(FetchError::Timeout))
            }
        };

        let now = Utc::now();
        match outcome {
            Ok(record) => SourceRecord::ok(source, record, now),
            Err(e) => {
                log_failure(source, &e);
                SourceRecord::unavailable(source, e.reason(), now)
            }
        }
    }
}

/// Successes first, then fallbacks against the successful set only
fn fold(location: &Location, outcomes: BTreeMap<SourceId, Outcome>) -> LocationContext {
    let now = Utc::now();
    let mut records = BTreeMap::new();
    let mut failures = Vec::new();

    for (source, outcome) in outcomes {
        match outcome {
            Ok(record) => {
                records.insert(source, SourceRecord::ok(source, record, now));
            }
            Err(e) => failures.push((source, e)),
        }
    }

    let measured = records.clone();
    let evidence = Evidence::new(location, &measured);
    for (source, failure) in failures {
        log_failure(source, &failure);
        records.insert(source, fallback::resolve(source, &failure, &evidence, now));
    }

    debug!(records = records.len(), "Folded source outcomes");
    LocationContext::new(location.clone(), records)
}

fn log_failure(source: SourceId, failure: &FetchError) {
    let class = failure.class();
    match class {
        ErrorClass::Configuration => {
            info!(source = %source, class = class.as_str(), "Source skipped: {}", failure);
        }
        ErrorClass::Transient => {
            warn!(source = %source, class = class.as_str(), "Source failed: {}", failure);
        }
        ErrorClass::Permanent => {
            error!(source = %source, class = class.as_str(), "Source failed: {}", failure);
        }
    }
}
