//! Tool surface over the engine
//!
//! Glues location resolution, context assembly, comparison and synthesis
//! together. Every inbound tool (CLI, HTTP) goes through [`IntelService`].

use crate::config::IntelConfig;
use crate::engine::{ComparativeAggregator, ContextAssembler};
use crate::location_resolver::LocationResolver;
use crate::models::{
    ComparisonBundle, FailedLocation, Location, LocationContext, LocationParser, SourceId,
    SourceRecord,
};
use crate::sources::{FetchParams, Geocoder, IntentHints, NominatimGeocoder, SourceRegistry};
use crate::synthesis::{
    Analysis, DEFAULT_GOALS, OpenRouterClient, SynthesisClient, SynthesisInput,
};
use crate::{IntelError, Result};
use anyhow::Context as _;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const EVALUATE_TOOL: &str = "evaluate";

/// Where a tool should look
#[derive(Debug, Clone, PartialEq)]
pub enum ToolTarget {
    /// Address or "lat,lon" text, resolved through geocoding
    Query(String),
    /// Known coordinates; an address, when given, names them without a lookup
    Coordinates {
        latitude: f64,
        longitude: f64,
        address: Option<String>,
    },
}

/// Description of one inbound tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ToolParameter],
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolParameter {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

const fn param(name: &'static str, description: &'static str, required: bool) -> ToolParameter {
    ToolParameter {
        name,
        description,
        required,
        default: None,
    }
}

const fn optional(
    name: &'static str,
    description: &'static str,
    default: &'static str,
) -> ToolParameter {
    ToolParameter {
        name,
        description,
        required: false,
        default: Some(default),
    }
}

const LAT: ToolParameter = param("lat", "Latitude in decimal degrees", false);
const LON: ToolParameter = param("lon", "Longitude in decimal degrees", false);
const ADDRESS: ToolParameter = param("address", "Street address, or lat,lon", false);

static TOOLS: &[ToolInfo] = &[
    ToolInfo {
        name: "geocode",
        description: "Convert an address to geographic coordinates",
        parameters: &[param("address", "Street address", true)],
    },
    ToolInfo {
        name: "weather",
        description: "Current conditions and today's forecast",
        parameters: &[LAT, LON, ADDRESS],
    },
    ToolInfo {
        name: "air_quality",
        description: "PM2.5 measurements from nearby OpenAQ stations",
        parameters: &[LAT, LON, ADDRESS],
    },
    ToolInfo {
        name: "walkability",
        description: "Walk score from Walk Score, or an OpenStreetMap density estimate",
        parameters: &[LAT, LON, ADDRESS],
    },
    ToolInfo {
        name: "crime_data",
        description: "Reported incidents and a safety score for the area",
        parameters: &[
            LAT,
            LON,
            ADDRESS,
            optional("start_date", "Start date (M/D/YYYY)", "1/1/2024"),
            optional("end_date", "End date (M/D/YYYY)", "12/31/2024"),
        ],
    },
    ToolInfo {
        name: "housing",
        description: "Housing prices from Zillow and Realty Mole",
        parameters: &[LAT, LON, ADDRESS],
    },
    ToolInfo {
        name: "commute",
        description: "Travel time and distance to a destination",
        parameters: &[
            LAT,
            LON,
            ADDRESS,
            optional(
                "destination",
                "Commute destination",
                "Texas A&M University, College Station",
            ),
            optional("mode", "driving, walking, transit or bicycling", "driving"),
        ],
    },
    ToolInfo {
        name: "amenities",
        description: "Nearby places of one type",
        parameters: &[LAT, LON, ADDRESS, optional("type", "Place type", "school")],
    },
    ToolInfo {
        name: "demographics",
        description: "Census tract income, population and education",
        parameters: &[LAT, LON, ADDRESS],
    },
    ToolInfo {
        name: EVALUATE_TOOL,
        description: "Full context for a location with an AI evaluation",
        parameters: &[
            param("address", "Street address, or lat,lon", true),
            optional("goals", "What the resident is looking for", DEFAULT_GOALS),
            param("hints", "Comma separated fields or tools to limit the sources", false),
        ],
    },
];

/// Context of one location plus its narrative
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub context: LocationContext,
    pub goals: String,
    pub analysis: Analysis,
}

/// Comparison bundle plus an optional comparative narrative
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    #[serde(flatten)]
    pub bundle: ComparisonBundle,
    pub goals: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

/// Result of a tool call
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Record(SourceRecord),
    Evaluation(Box<Evaluation>),
}

/// Entry point for every inbound tool
#[derive(Clone)]
pub struct IntelService {
    resolver: LocationResolver,
    assembler: ContextAssembler,
    aggregator: ComparativeAggregator,
    synthesis: Arc<dyn SynthesisClient>,
}

impl IntelService {
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        geocoder: Arc<dyn Geocoder>,
        synthesis: Arc<dyn SynthesisClient>,
        min_coverage: f64,
    ) -> Self {
        let assembler = ContextAssembler::new(registry);
        Self {
            resolver: LocationResolver::new(geocoder),
            aggregator: ComparativeAggregator::new(assembler.clone(), min_coverage),
            assembler,
            synthesis,
        }
    }

    /// Bound each geocoding call; a lookup that runs out fails its location
    #[must_use]
    pub fn with_geocode_timeout(mut self, timeout: Duration) -> Self {
        self.resolver = self.resolver.with_timeout(timeout);
        self
    }

    /// Production wiring: HTTP adapters, Nominatim and OpenRouter
    pub fn from_config(config: &IntelConfig) -> anyhow::Result<Self> {
        let registry = SourceRegistry::from_config(config)?;
        let client = crate::sources::build_client(&config.providers.user_agent)
            .with_context(|| "Failed to create HTTP client")?;

        let geocoder = Arc::new(NominatimGeocoder::new(client.clone()));
        let synthesis = Arc::new(OpenRouterClient::new(
            client,
            &config.synthesis,
            &config.credentials,
        ));

        let geocode_timeout = config.providers.timeout_for(SourceId::Geocoding, None);
        Ok(Self::new(
            Arc::new(registry),
            geocoder,
            synthesis,
            config.scoring.min_coverage,
        )
        .with_geocode_timeout(geocode_timeout))
    }

    #[must_use]
    pub fn list_tools() -> &'static [ToolInfo] {
        TOOLS
    }

    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        self.assembler.registry()
    }

    /// Resolve a target into a location
    pub async fn locate(&self, target: &ToolTarget) -> Result<Location> {
        match target {
            ToolTarget::Query(query) => self.resolver.resolve(query).await,
            ToolTarget::Coordinates {
                latitude,
                longitude,
                address,
            } => {
                LocationParser::validate_coordinates(*latitude, *longitude)?;
                match address.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                    Some(address) => Ok(Location::new(address, *latitude, *longitude, address)),
                    None => {
                        self.resolver
                            .resolve(&format!("{latitude},{longitude}"))
                            .await
                    }
                }
            }
        }
    }

    /// Full context for one location, with a narrative when synthesis is up
    #[instrument(skip(self, hints))]
    pub async fn evaluate(
        &self,
        query: &str,
        goals: Option<&str>,
        hints: &IntentHints,
    ) -> Result<Evaluation> {
        let location = self.resolver.resolve(query).await?;
        self.evaluate_location(&location, goals, hints, &BTreeMap::new())
            .await
    }

    async fn evaluate_location(
        &self,
        location: &Location,
        goals: Option<&str>,
        hints: &IntentHints,
        options: &BTreeMap<String, String>,
    ) -> Result<Evaluation> {
        let goals = goals_or_default(goals);
        let context = self
            .assembler
            .assemble_with_options(location, hints, options)
            .await;

        let analysis = Analysis::from(
            self.synthesis
                .synthesize(SynthesisInput::Context {
                    context: &context,
                    goals: &goals,
                })
                .await,
        );
        if let Analysis::Unavailable { reason } = &analysis {
            warn!(location = %location.label(), "Analysis unavailable: {}", reason);
        }

        Ok(Evaluation {
            context,
            goals,
            analysis,
        })
    }

    /// Compare several queries; those that fail to resolve are listed in `failed`
    #[instrument(skip(self, queries, hints), fields(queries = queries.len()))]
    pub async fn compare(
        &self,
        queries: &[String],
        goals: Option<&str>,
        hints: &IntentHints,
        synthesize: bool,
    ) -> Result<Comparison> {
        if queries.len() < 2 {
            return Err(IntelError::validation(
                "A comparison needs at least two locations",
            ));
        }

        let resolved = join_all(queries.iter().map(|q| self.resolver.resolve(q))).await;

        let mut locations = Vec::new();
        let mut failed = Vec::new();
        for (query, outcome) in queries.iter().zip(resolved) {
            match outcome {
                Ok(location) => locations.push(location),
                Err(e) if e.is_location_scoped() => {
                    warn!(query = %query, "Dropping location from comparison: {}", e);
                    failed.push(FailedLocation {
                        query: query.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let bundle = self
            .aggregator
            .compare_with_failures(&locations, hints, failed)
            .await;
        let goals = goals_or_default(goals);

        let analysis = if synthesize && !bundle.contexts.is_empty() {
            Some(Analysis::from(
                self.synthesis
                    .synthesize(SynthesisInput::Comparison {
                        bundle: &bundle,
                        goals: &goals,
                    })
                    .await,
            ))
        } else {
            None
        };

        Ok(Comparison {
            bundle,
            goals,
            analysis,
        })
    }

    /// Run a tool by name
    ///
    /// Per-source tools return the raw record with no fallback; `evaluate`
    /// reads `goals` and `hints` from the options.
    #[instrument(skip(self, target, options))]
    pub async fn run_tool(
        &self,
        name: &str,
        target: &ToolTarget,
        options: BTreeMap<String, String>,
    ) -> Result<ToolOutput> {
        let name = name.trim().to_ascii_lowercase();
        if name == EVALUATE_TOOL {
            let location = self.locate(target).await?;
            let hints = IntentHints::from_names(
                options
                    .get("hints")
                    .map(|h| h.split(',').collect::<Vec<_>>())
                    .unwrap_or_default(),
            );
            let evaluation = self
                .evaluate_location(
                    &location,
                    options.get("goals").map(String::as_str),
                    &hints,
                    &options,
                )
                .await?;
            return Ok(ToolOutput::Evaluation(Box::new(evaluation)));
        }

        let source: SourceId = name
            .parse()
            .map_err(|_| IntelError::validation(format!("Unknown tool: {name}")))?;
        let location = self.locate(target).await?;
        let record = self
            .assembler
            .fetch_one(source, FetchParams { location, options })
            .await;

        info!(tool = %name, status = ?record.status, "Tool call complete");
        Ok(ToolOutput::Record(record))
    }
}

fn goals_or_default(goals: Option<&str>) -> String {
    goals
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(DEFAULT_GOALS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_every_source_has_a_tool() {
        let names: BTreeSet<&str> = IntelService::list_tools().iter().map(|t| t.name).collect();
        for source in SourceId::ALL {
            assert!(names.contains(source.tool_name()), "missing {source}");
        }
        assert!(names.contains(EVALUATE_TOOL));
        assert_eq!(names.len(), SourceId::ALL.len() + 1);
    }

    #[test]
    fn test_goals_default() {
        assert_eq!(goals_or_default(None), DEFAULT_GOALS);
        assert_eq!(goals_or_default(Some("  ")), DEFAULT_GOALS);
        assert_eq!(goals_or_default(Some("Quiet street")), "Quiet street");
    }
}
