//! Location Resolution Module
//!
//! Turns a query ("30.628,-96.334" or a street address) into a [`Location`].
//! Coordinates skip forward geocoding and are only named via reverse
//! geocoding; addresses that cannot be geocoded are a terminal failure for
//! that location.

use crate::models::{Location, LocationInput, LocationParser};
use crate::sources::Geocoder;
use crate::IntelError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Bound on a single forward or reverse geocoding call
pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Service for resolving location queries
#[derive(Clone)]
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
}

impl LocationResolver {
    #[must_use]
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            timeout: DEFAULT_GEOCODE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Resolve a location query into a structured Location
    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str) -> Result<Location, IntelError> {
        let location = match LocationParser::parse(query)? {
            LocationInput::Coordinates(lat, lon) => self.resolve_coordinates(query, lat, lon).await,
            LocationInput::Address(address) => self.resolve_address(&address).await?,
        };

        debug!(
            "Resolved location: {} at ({}, {})",
            location.resolved_address, location.latitude, location.longitude
        );
        Ok(location)
    }

    /// Name coordinates via reverse geocoding, falling back to the coordinates themselves
    async fn resolve_coordinates(&self, query: &str, lat: f64, lon: f64) -> Location {
        let fallback_name = format!("{lat:.4}, {lon:.4}");
        let lookup = timeout(self.timeout, self.geocoder.reverse(lat, lon)).await;
        let resolved_address = match lookup {
            Ok(Ok(Some(hit))) if !hit.display_name.is_empty() => hit.display_name,
            Ok(Ok(_)) => {
                debug!("No reverse geocoding results found, using coordinates as name");
                fallback_name
            }
            Ok(Err(e)) => {
                warn!("Reverse geocoding failed: {}, using coordinates as name", e);
                fallback_name
            }
            Err(_) => {
                warn!(
                    "Reverse geocoding timed out after {:?}, using coordinates as name",
                    self.timeout
                );
                fallback_name
            }
        };
        Location::new(query.trim(), lat, lon, resolved_address)
    }

    /// Geocode an address; the first (best) match wins
    async fn resolve_address(&self, address: &str) -> Result<Location, IntelError> {
        let hits = timeout(self.timeout, self.geocoder.forward(address))
            .await
            .map_err(|_| IntelError::geocoding(address, "timed out"))?
            .map_err(|e| IntelError::geocoding(address, e.to_string()))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| IntelError::geocoding(address, "Location not found"))?;

        debug!(
            "Found location: {} ({:.4}, {:.4})",
            hit.display_name, hit.latitude, hit.longitude
        );
        let resolved_address = if hit.display_name.is_empty() {
            address.to_string()
        } else {
            hit.display_name
        };
        Ok(Location::new(address, hit.latitude, hit.longitude, resolved_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FetchError, GeocodeHit};
    use async_trait::async_trait;

    struct FixedGeocoder {
        forward: Result<Vec<GeocodeHit>, FetchError>,
        reverse: Result<Option<GeocodeHit>, FetchError>,
    }

    /// Accepts every call and never answers
    struct HangingGeocoder;

    #[async_trait]
    impl Geocoder for HangingGeocoder {
        async fn forward(&self, _query: &str) -> Result<Vec<GeocodeHit>, FetchError> {
            std::future::pending().await
        }

        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<GeocodeHit>, FetchError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn forward(&self, _query: &str) -> Result<Vec<GeocodeHit>, FetchError> {
            self.forward.clone()
        }

        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<GeocodeHit>, FetchError> {
            self.reverse.clone()
        }
    }

    fn hit(name: &str) -> GeocodeHit {
        GeocodeHit {
            latitude: 30.628,
            longitude: -96.3344,
            display_name: name.to_string(),
        }
    }

    fn resolver(
        forward: Result<Vec<GeocodeHit>, FetchError>,
        reverse: Result<Option<GeocodeHit>, FetchError>,
    ) -> LocationResolver {
        LocationResolver::new(Arc::new(FixedGeocoder { forward, reverse }))
    }

    #[tokio::test]
    async fn test_address_uses_first_hit() {
        let resolver = resolver(Ok(vec![hit("College Station, TX"), hit("Elsewhere")]), Ok(None));
        let location = resolver.resolve("College Station").await.unwrap();
        assert_eq!(location.query, "College Station");
        assert_eq!(location.resolved_address, "College Station, TX");
        assert_eq!(location.latitude, 30.628);
    }

    #[tokio::test]
    async fn test_unknown_address_is_geocoding_failure() {
        let resolver = resolver(Ok(vec![]), Ok(None));
        let err = resolver.resolve("Atlantis").await.unwrap_err();
        assert!(matches!(err, IntelError::Geocoding { .. }));
    }

    #[tokio::test]
    async fn test_geocoder_outage_is_geocoding_failure() {
        let resolver = resolver(Err(FetchError::HttpError(503)), Ok(None));
        let err = resolver.resolve("Bryan, TX").await.unwrap_err();
        assert!(err.is_location_scoped());
    }

    #[tokio::test]
    async fn test_coordinates_are_reverse_geocoded() {
        let resolver = resolver(Ok(vec![]), Ok(Some(hit("Northgate, College Station"))));
        let location = resolver.resolve("30.6280, -96.3344").await.unwrap();
        assert_eq!(location.resolved_address, "Northgate, College Station");
        assert_eq!(location.longitude, -96.3344);
    }

    #[tokio::test]
    async fn test_coordinates_fallback_name() {
        let resolver = resolver(Ok(vec![]), Err(FetchError::Timeout));
        let location = resolver.resolve("46.8182,8.2275").await.unwrap();
        assert_eq!(location.resolved_address, "46.8182, 8.2275");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_forward_lookup_times_out() {
        let resolver =
            LocationResolver::new(Arc::new(HangingGeocoder)).with_timeout(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        let err = resolver.resolve("Bryan, TX").await.unwrap_err();

        assert!(matches!(err, IntelError::Geocoding { .. }));
        assert!(err.is_location_scoped());
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_reverse_lookup_uses_coordinates() {
        let resolver = LocationResolver::new(Arc::new(HangingGeocoder));
        let location = resolver.resolve("30.6280,-96.3344").await.unwrap();
        assert_eq!(location.resolved_address, "30.6280, -96.3344");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let resolver = resolver(Ok(vec![]), Ok(None));
        let err = resolver.resolve("  ").await.unwrap_err();
        assert!(matches!(err, IntelError::Validation { .. }));
    }
}
