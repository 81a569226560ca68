//! Geocoding
//!
//! [`NominatimGeocoder`] turns free-form addresses into coordinates and back.
//! It runs once per location, before assembly. [`GeocodingAdapter`] then
//! publishes the already resolved location as the `geocoding` record so that
//! fallbacks and synthesis can see it like any other source.

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// One geocoder match
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

/// Forward and reverse geocoding
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Matches for an address, best first
    async fn forward(&self, query: &str) -> Result<Vec<GeocodeHit>, FetchError>;

    /// Display name for a coordinate pair
    async fn reverse(&self, latitude: f64, longitude: f64)
        -> Result<Option<GeocodeHit>, FetchError>;
}

/// Nominatim search result; coordinates arrive as strings
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Nominatim reverse lookups answer `{"error": ...}` instead of a 404
#[derive(Debug, Deserialize)]
struct NominatimReverse {
    lat: Option<String>,
    lon: Option<String>,
    #[serde(default)]
    display_name: String,
    error: Option<String>,
}

impl NominatimPlace {
    fn into_hit(self) -> Result<GeocodeHit, FetchError> {
        let latitude = self
            .lat
            .parse()
            .map_err(|_| FetchError::Malformed(format!("bad latitude '{}'", self.lat)))?;
        let longitude = self
            .lon
            .parse()
            .map_err(|_| FetchError::Malformed(format!("bad longitude '{}'", self.lon)))?;
        Ok(GeocodeHit {
            latitude,
            longitude,
            display_name: self.display_name,
        })
    }
}

/// OpenStreetMap Nominatim client
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, NOMINATIM_URL)
    }

    #[must_use]
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn forward(&self, query: &str) -> Result<Vec<GeocodeHit>, FetchError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=5",
            self.base_url,
            urlencoding::encode(query)
        );
        debug!("Nominatim search URL: {}", url);

        let places: Vec<NominatimPlace> = get_json(self.client.get(&url)).await?;
        places.into_iter().map(NominatimPlace::into_hit).collect()
    }

    #[instrument(skip(self))]
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodeHit>, FetchError> {
        let request = self.client.get(format!("{}/reverse", self.base_url)).query(&[
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("format", "json".to_string()),
        ]);

        let response: NominatimReverse = get_json(request).await?;
        if let Some(error) = response.error {
            debug!("Reverse geocoding found nothing: {}", error);
            return Ok(None);
        }
        match (response.lat, response.lon) {
            (Some(lat), Some(lon)) => NominatimPlace {
                lat,
                lon,
                display_name: response.display_name,
            }
            .into_hit()
            .map(Some),
            _ => Ok(None),
        }
    }
}

/// Publishes the resolved location; never touches the network
pub struct GeocodingAdapter;

const FIELDS: &[&str] = &["latitude", "longitude", "resolved_address"];

#[async_trait]
impl SourceAdapter for GeocodingAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Geocoding
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let location = &params.location;
        Ok(NormalizedRecord::new()
            .with("latitude", location.latitude)
            .with("longitude", location.longitude)
            .with("resolved_address", location.resolved_address.as_str()))
    }
}
