//! Travel time to a destination via the Google Distance Matrix API

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

pub const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

const FIELDS: &[&str] = &[
    "commute_minutes",
    "commute_distance_km",
    "commute_destination",
    "commute_mode",
];

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    destination_addresses: Vec<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    duration: Option<Measure>,
    distance: Option<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: f64,
}

/// Google reports failures in the body with HTTP 200
pub(crate) fn google_status(status: &str) -> Result<(), FetchError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "REQUEST_DENIED" => Err(FetchError::HttpError(403)),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(FetchError::HttpError(429)),
        "UNKNOWN_ERROR" => Err(FetchError::HttpError(503)),
        other => Err(FetchError::Malformed(format!("status {other}"))),
    }
}

fn normalize(
    response: MatrixResponse,
    destination: &str,
    mode: &str,
) -> Result<NormalizedRecord, FetchError> {
    google_status(&response.status)?;

    let element = response
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or_else(|| FetchError::Malformed("empty distance matrix".into()))?;

    if element.status != "OK" {
        return Err(FetchError::Malformed(format!(
            "no route to '{destination}': {}",
            element.status
        )));
    }
    let duration = element
        .duration
        .ok_or_else(|| FetchError::Malformed("route without duration".into()))?;

    let resolved_destination = response
        .destination_addresses
        .into_iter()
        .next()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| destination.to_string());

    Ok(NormalizedRecord::new()
        .with("commute_minutes", (duration.value / 60.0).round())
        .with_opt(
            "commute_distance_km",
            element.distance.map(|d| (d.value / 100.0).round() / 10.0),
        )
        .with("commute_destination", resolved_destination)
        .with("commute_mode", mode))
}

pub struct DistanceMatrixAdapter {
    client: Client,
    api_key: Option<String>,
    default_destination: String,
    mode: String,
}

impl DistanceMatrixAdapter {
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        default_destination: String,
        mode: String,
    ) -> Self {
        Self {
            client,
            api_key,
            default_destination,
            mode,
        }
    }
}

#[async_trait]
impl SourceAdapter for DistanceMatrixAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Commute
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn credential_hint(&self) -> Option<&'static str> {
        Some("GOOGLE_MAPS_API_KEY")
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::NotConfigured)?;
        let destination = params
            .option("destination")
            .unwrap_or(self.default_destination.as_str());
        let mode = params.option("mode").unwrap_or(self.mode.as_str());

        let request = self.client.get(DISTANCE_MATRIX_URL).query(&[
            ("origins", params.location.format_coordinates().replace(' ', "")),
            ("destinations", destination.to_string()),
            ("mode", mode.to_string()),
            ("key", api_key.to_string()),
        ]);

        normalize(get_json(request).await?, destination, mode)
    }
}
