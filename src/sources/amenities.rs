//! Nearby places of one type via Google Places nearby search

use super::commute::google_status;
use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use haversine::{Location as HaversineLocation, Units, distance};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

pub const PLACES_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";

const FIELDS: &[&str] = &[
    "amenity_type",
    "amenity_count",
    "nearest_amenity",
    "nearest_amenity_km",
    "average_rating",
];

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: Option<String>,
    rating: Option<f64>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

fn normalize(
    response: PlacesResponse,
    latitude: f64,
    longitude: f64,
    amenity_type: &str,
) -> Result<NormalizedRecord, FetchError> {
    google_status(&response.status)?;

    let origin = HaversineLocation {
        latitude,
        longitude,
    };
    let nearest = response
        .results
        .iter()
        .filter_map(|place| {
            let at = &place.geometry.as_ref()?.location;
            let km = distance(
                HaversineLocation {
                    latitude: origin.latitude,
                    longitude: origin.longitude,
                },
                HaversineLocation {
                    latitude: at.lat,
                    longitude: at.lng,
                },
                Units::Kilometers,
            );
            Some((place, km))
        })
        .min_by(|(_, a), (_, b)| a.total_cmp(b));

    let ratings: Vec<f64> = response.results.iter().filter_map(|p| p.rating).collect();
    let average_rating = (!ratings.is_empty())
        .then(|| (ratings.iter().sum::<f64>() / ratings.len() as f64 * 10.0).round() / 10.0);

    Ok(NormalizedRecord::new()
        .with("amenity_type", amenity_type)
        .with("amenity_count", response.results.len())
        .with_opt("nearest_amenity", nearest.and_then(|(p, _)| p.name.clone()))
        .with_opt(
            "nearest_amenity_km",
            nearest.map(|(_, km)| (km * 100.0).round() / 100.0),
        )
        .with_opt("average_rating", average_rating))
}

pub struct PlacesAdapter {
    client: Client,
    api_key: Option<String>,
    default_type: String,
    radius_meters: u32,
}

impl PlacesAdapter {
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        default_type: String,
        radius_meters: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            default_type,
            radius_meters,
        }
    }
}

#[async_trait]
impl SourceAdapter for PlacesAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Amenities
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
        let amenity_type = params.option("type").unwrap_or(self.default_type.as_str());
        let location = &params.location;

        let request = self.client.get(PLACES_URL).query(&[
            (
                "location",
                format!("{},{}", location.latitude, location.longitude),
            ),
            ("radius", self.radius_meters.to_string()),
            ("type", amenity_type.to_string()),
            ("key", api_key.to_string()),
        ]);

        normalize(
            get_json(request).await?,
            location.latitude,
            location.longitude,
            amenity_type,
        )
    }
}
