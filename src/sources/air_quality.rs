//! OpenAQ v3: nearest monitoring station and its latest PM2.5 reading

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const OPENAQ_URL: &str = "https://api.openaq.org/v3";
const SEARCH_RADIUS_METERS: u32 = 25_000;
const STATION_LIMIT: u32 = 5;

const FIELDS: &[&str] = &[
    "nearest_station",
    "station_distance_km",
    "stations_nearby",
    "pm25_ugm3",
    "air_quality_category",
];

#[derive(Debug, Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Station {
    id: u64,
    name: Option<String>,
    /// Meters from the query point
    distance: Option<f64>,
    #[serde(default)]
    sensors: Vec<Sensor>,
}

#[derive(Debug, Deserialize)]
struct Sensor {
    id: u64,
    parameter: Parameter,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Reading {
    #[serde(rename = "sensorsId")]
    sensors_id: u64,
    value: Option<f64>,
}

/// EPA breakpoints for 24h PM2.5 in µg/m³
#[must_use]
pub fn pm25_category(pm25: f64) -> &'static str {
    match pm25 {
        v if v <= 12.0 => "Good",
        v if v <= 35.4 => "Moderate",
        v if v <= 55.4 => "Unhealthy for Sensitive Groups",
        v if v <= 150.4 => "Unhealthy",
        v if v <= 250.4 => "Very Unhealthy",
        _ => "Hazardous",
    }
}

pub struct OpenAqAdapter {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAqAdapter {
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: OPENAQ_URL.to_string(),
        }
    }

    async fn latest_pm25(&self, api_key: &str, station: &Station) -> Option<f64> {
        let sensor = station
            .sensors
            .iter()
            .find(|s| s.parameter.name.eq_ignore_ascii_case("pm25"))?;

        let request = self
            .client
            .get(format!("{}/locations/{}/latest", self.base_url, station.id))
            .header("X-API-Key", api_key);

        match get_json::<Results<Reading>>(request).await {
            Ok(latest) => latest
                .results
                .into_iter()
                .find(|r| r.sensors_id == sensor.id)
                .and_then(|r| r.value)
                .filter(|v| *v >= 0.0),
            Err(e) => {
                debug!(station = station.id, "Latest readings unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for OpenAqAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::AirQuality
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn credential_hint(&self) -> Option<&'static str> {
        Some("AIR_QUALITY_API_KEY")
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::NotConfigured)?;
        let location = &params.location;

        let request = self
            .client
            .get(format!("{}/locations", self.base_url))
            .header("X-API-Key", api_key)
            .query(&[
                (
                    "coordinates",
                    format!("{},{}", location.latitude, location.longitude),
                ),
                ("radius", SEARCH_RADIUS_METERS.to_string()),
                ("limit", STATION_LIMIT.to_string()),
            ]);

        let stations: Results<Station> = get_json(request).await?;
        let record = NormalizedRecord::new().with("stations_nearby", stations.results.len());

        let Some(closest) = stations.results.first() else {
            debug!("No monitoring stations within {} m", SEARCH_RADIUS_METERS);
            return Ok(record);
        };

        let pm25 = self.latest_pm25(api_key, closest).await;
        Ok(record
            .with_opt("nearest_station", closest.name.clone())
            .with_opt(
                "station_distance_km",
                closest.distance.map(|m| (m / 100.0).round() / 10.0),
            )
            .with_opt("pm25_ugm3", pm25)
            .with_opt("air_quality_category", pm25.map(pm25_category)))
    }
}
