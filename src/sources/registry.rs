//! Capability table: which source serves which fields, under which timeout
//!
//! Resolved once at startup from the configured adapters. The assembler only
//! ever looks sources up here; it never dispatches on provider names.

use super::air_quality::OpenAqAdapter;
use super::amenities::PlacesAdapter;
use super::commute::DistanceMatrixAdapter;
use super::crime::CrimeDataAdapter;
use super::demographics::CensusAdapter;
use super::geocoding::GeocodingAdapter;
use super::housing::HousingAdapter;
use super::http::build_client;
use super::walkability::WalkabilityAdapter;
use super::weather::OpenMeteoAdapter;
use super::SourceAdapter;
use crate::config::{IntelConfig, ProvidersConfig};
use crate::models::SourceId;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One row of the capability table
#[derive(Clone)]
pub struct Capability {
    pub source: SourceId,
    pub fields: &'static [&'static str],
    pub timeout: Duration,
    /// False when the provider's credentials are missing
    pub configured: bool,
    pub credential_hint: Option<&'static str>,
    adapter: Arc<dyn SourceAdapter>,
}

impl Capability {
    #[must_use]
    pub fn adapter(&self) -> Arc<dyn SourceAdapter> {
        Arc::clone(&self.adapter)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("source", &self.source)
            .field("fields", &self.fields)
            .field("timeout", &self.timeout)
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

/// Which fields the caller cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IntentHints {
    /// Every registered source
    #[default]
    All,
    /// Field names, or source/tool names as shorthand for all of a source's fields
    Only(BTreeSet<String>),
}

impl IntentHints {
    /// Empty input or an explicit "all" means every source
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() || names.contains("all") {
            IntentHints::All
        } else {
            IntentHints::Only(names)
        }
    }
}

/// The capability table
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    entries: BTreeMap<SourceId, Capability>,
}

impl SourceRegistry {
    #[must_use]
    pub fn builder(providers: ProvidersConfig) -> RegistryBuilder {
        RegistryBuilder {
            providers,
            adapters: Vec::new(),
        }
    }

    /// Build the production table with one HTTP adapter per provider
    pub fn from_config(config: &IntelConfig) -> Result<Self> {
        let client = build_client(&config.providers.user_agent)
            .with_context(|| "Failed to create HTTP client")?;
        let credentials = &config.credentials;

        let registry = Self::builder(config.providers.clone())
            .register(Arc::new(GeocodingAdapter))
            .register(Arc::new(OpenMeteoAdapter::new(client.clone())))
            .register(Arc::new(OpenAqAdapter::new(
                client.clone(),
                credentials.air_quality_api_key.clone(),
            )))
            .register(Arc::new(CrimeDataAdapter::new(
                client.clone(),
                credentials.rapidapi_key.clone(),
            )))
            .register(Arc::new(HousingAdapter::new(
                client.clone(),
                credentials.rapidapi_key.clone(),
            )))
            .register(Arc::new(WalkabilityAdapter::new(
                client.clone(),
                credentials.walkscore_api_key.clone(),
            )))
            .register(Arc::new(DistanceMatrixAdapter::new(
                client.clone(),
                credentials.google_maps_api_key.clone(),
                config.commute.default_destination.clone(),
                config.commute.mode.clone(),
            )))
            .register(Arc::new(PlacesAdapter::new(
                client.clone(),
                credentials.google_maps_api_key.clone(),
                config.amenities.default_type.clone(),
                config.amenities.radius_meters,
            )))
            .register(Arc::new(CensusAdapter::new(
                client,
                credentials.census_api_key.clone(),
            )))
            .build();

        for capability in registry.sources().filter(|c| !c.configured) {
            info!(
                source = %capability.source,
                hint = capability.credential_hint.unwrap_or("-"),
                "Source not configured, it will be reported as unavailable"
            );
        }

        Ok(registry)
    }

    #[must_use]
    pub fn capability(&self, source: SourceId) -> Option<&Capability> {
        self.entries.get(&source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Capability> {
        self.entries.values()
    }

    /// Source whose capability row lists the field
    #[must_use]
    pub fn owner_of(&self, field: &str) -> Option<SourceId> {
        self.entries
            .values()
            .find(|c| c.fields.contains(&field))
            .map(|c| c.source)
    }

    /// Minimal set of sources able to satisfy the hints
    ///
    /// Unknown names are ignored; if nothing is left the full set is used.
    #[must_use]
    pub fn select(&self, hints: &IntentHints) -> BTreeSet<SourceId> {
        let names = match hints {
            IntentHints::All => return self.entries.keys().copied().collect(),
            IntentHints::Only(names) => names,
        };

        let mut selected = BTreeSet::new();
        for name in names {
            let by_source = name
                .parse::<SourceId>()
                .ok()
                .filter(|id| self.entries.contains_key(id));

            match by_source.or_else(|| self.owner_of(name)) {
                Some(source) => {
                    selected.insert(source);
                }
                None => warn!(hint = %name, "No source provides this field, ignoring"),
            }
        }

        if selected.is_empty() {
            debug!("No usable hints, selecting every source");
            return self.entries.keys().copied().collect();
        }
        selected
    }

    /// Longest timeout among the given sources; bounds a whole assembly
    #[must_use]
    pub fn max_timeout<'a>(&self, sources: impl IntoIterator<Item = &'a SourceId>) -> Duration {
        sources
            .into_iter()
            .filter_map(|id| self.entries.get(id))
            .map(|c| c.timeout)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Collects adapters and resolves their rows
pub struct RegistryBuilder {
    providers: ProvidersConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl RegistryBuilder {
    /// Register an adapter; a later adapter for the same source replaces the earlier one
    #[must_use]
    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    #[must_use]
    pub fn build(self) -> SourceRegistry {
        let mut entries = BTreeMap::new();
        for adapter in self.adapters {
            let source = adapter.source_id();
            let capability = Capability {
                source,
                fields: adapter.supported_fields(),
                timeout: self.providers.timeout_for(source, adapter.default_timeout()),
                configured: adapter.is_configured(),
                credential_hint: adapter.credential_hint(),
                adapter,
            };
            debug!(
                source = %source,
                timeout_ms = capability.timeout.as_millis() as u64,
                configured = capability.configured,
                "Registered source"
            );
            entries.insert(source, capability);
        }
        SourceRegistry { entries }
    }
}
