//! Walkability: the Walk Score API when a key is present, otherwise an
//! estimate from OpenStreetMap feature density within one kilometre

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub const WALKSCORE_URL: &str = "https://api.walkscore.com/score";
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
const OSM_RADIUS_METERS: u32 = 1_000;

const FIELDS: &[&str] = &[
    "walk_score",
    "walk_description",
    "transit_score",
    "bike_score",
    "walk_source",
    "amenities_nearby",
    "shops_nearby",
    "transit_stops",
    "pedestrian_ways",
];

/// Walk Score's own bands
#[must_use]
pub fn walk_description(score: f64) -> &'static str {
    match score {
        s if s >= 90.0 => "Walker's Paradise - Daily errands do not require a car",
        s if s >= 70.0 => "Very Walkable - Most errands can be accomplished on foot",
        s if s >= 50.0 => "Somewhat Walkable - Some errands can be accomplished on foot",
        s if s >= 25.0 => "Car-Dependent - Most errands require a car",
        _ => "Very Car-Dependent - Almost all errands require a car",
    }
}

#[derive(Debug, Deserialize)]
struct WalkScoreResponse {
    status: i64,
    walkscore: Option<f64>,
    description: Option<String>,
    transit: Option<SubScore>,
    bike: Option<SubScore>,
}

#[derive(Debug, Deserialize)]
struct SubScore {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
struct OsmElement {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Feature counts around a point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OsmCounts {
    pub amenities: usize,
    pub shops: usize,
    pub transit: usize,
    pub pedestrian: usize,
}

impl OsmCounts {
    fn tally(elements: &[OsmElement]) -> Self {
        let mut counts = Self::default();
        for tags in elements.iter().map(|e| &e.tags) {
            if tags.contains_key("amenity") {
                counts.amenities += 1;
            }
            if tags.contains_key("shop") {
                counts.shops += 1;
            }
            if tags.contains_key("public_transport") {
                counts.transit += 1;
            }
            let footway = matches!(
                tags.get("highway").map(String::as_str),
                Some("footway" | "pedestrian")
            );
            if footway || tags.contains_key("footway") {
                counts.pedestrian += 1;
            }
        }
        counts
    }

    /// Capped points per feature kind, summed to a 0-100 score
    #[must_use]
    pub fn score(&self) -> f64 {
        let amenity = (self.amenities as f64 * 2.0).min(40.0);
        let shop = (self.shops as f64 * 1.5).min(25.0);
        let transit = (self.transit as f64 * 4.0).min(20.0);
        let pedestrian = (self.pedestrian as f64).min(15.0);
        (amenity + shop + transit + pedestrian).floor()
    }

    fn into_record(self) -> NormalizedRecord {
        let score = self.score();
        NormalizedRecord::new()
            .with("walk_score", score)
            .with("walk_description", walk_description(score))
            .with("walk_source", "openstreetmap")
            .with("amenities_nearby", self.amenities)
            .with("shops_nearby", self.shops)
            .with("transit_stops", self.transit)
            .with("pedestrian_ways", self.pedestrian)
    }
}

fn overpass_query(latitude: f64, longitude: f64) -> String {
    let around = format!("around:{OSM_RADIUS_METERS},{latitude},{longitude}");
    format!(
        r#"[out:json][timeout:25];
(
  node["amenity"]({around});
  way["amenity"]({around});
  node["shop"]({around});
  way["shop"]({around});
  node["public_transport"]({around});
  way["highway"="footway"]({around});
  way["highway"="pedestrian"]({around});
);
out tags;"#
    )
}

fn from_walkscore(response: WalkScoreResponse) -> Result<NormalizedRecord, FetchError> {
    if response.status != 1 {
        return Err(FetchError::Malformed(format!(
            "Walk Score status {}",
            response.status
        )));
    }
    let score = response
        .walkscore
        .ok_or_else(|| FetchError::Malformed("no walkscore in response".into()))?;

    Ok(NormalizedRecord::new()
        .with("walk_score", score)
        .with(
            "walk_description",
            response
                .description
                .unwrap_or_else(|| walk_description(score).to_string()),
        )
        .with_opt("transit_score", response.transit.and_then(|t| t.score))
        .with_opt("bike_score", response.bike.and_then(|b| b.score))
        .with("walk_source", "walkscore"))
}

pub struct WalkabilityAdapter {
    client: Client,
    walkscore_key: Option<String>,
}

impl WalkabilityAdapter {
    #[must_use]
    pub fn new(client: Client, walkscore_key: Option<String>) -> Self {
        Self {
            client,
            walkscore_key,
        }
    }

    async fn walkscore(
        &self,
        key: &str,
        params: &FetchParams,
    ) -> Result<NormalizedRecord, FetchError> {
        let location = &params.location;
        let request = self.client.get(WALKSCORE_URL).query(&[
            ("format", "json".to_string()),
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("address", location.resolved_address.clone()),
            ("transit", "1".to_string()),
            ("bike", "1".to_string()),
            ("wsapikey", key.to_string()),
        ]);
        from_walkscore(get_json(request).await?)
    }

    async fn openstreetmap(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let query = overpass_query(params.location.latitude, params.location.longitude);
        let request = self.client.post(OVERPASS_URL).form(&[("data", query)]);
        let response: OverpassResponse = get_json(request).await?;
        let counts = OsmCounts::tally(&response.elements);
        debug!(?counts, "Tallied OpenStreetMap features");
        Ok(counts.into_record())
    }
}

#[async_trait]
impl SourceAdapter for WalkabilityAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Walkability
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn default_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        if let Some(key) = self.walkscore_key.as_deref() {
            match self.walkscore(key, params).await {
                Ok(record) => return Ok(record),
                Err(e) => debug!("Walk Score failed, estimating from OpenStreetMap: {}", e),
            }
        }
        self.openstreetmap(params).await
    }
}
