//! Location model and query parsing

use crate::IntelError;
use serde::{Deserialize, Serialize};

/// A geocoded location
///
/// Created once by the location resolver and never modified afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    /// The query the caller typed (address or "lat,lon")
    pub query: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Display address returned by the geocoder
    pub resolved_address: String,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        latitude: f64,
        longitude: f64,
        resolved_address: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            latitude,
            longitude,
            resolved_address: resolved_address.into(),
        }
    }

    /// Location from bare coordinates, named after the coordinates themselves
    #[must_use]
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        let name = format!("{latitude:.4}, {longitude:.4}");
        Self::new(name.clone(), latitude, longitude, name)
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// Short label used in logs and comparison output
    #[must_use]
    pub fn label(&self) -> &str {
        if self.query.is_empty() {
            &self.resolved_address
        } else {
            &self.query
        }
    }
}

/// Types of location input
#[derive(Debug, Clone, PartialEq)]
pub enum LocationInput {
    /// Coordinates (latitude, longitude)
    Coordinates(f64, f64),
    /// Free-form address or place name
    Address(String),
}

/// Location query parsing
pub struct LocationParser;

impl LocationParser {
    /// Parse a query into coordinates or an address
    pub fn parse(input: &str) -> Result<LocationInput, IntelError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IntelError::validation("Location cannot be empty"));
        }

        if let Ok((lat, lon)) = Self::parse_coordinates(input) {
            return Ok(LocationInput::Coordinates(lat, lon));
        }

        Ok(LocationInput::Address(input.to_string()))
    }

    /// Parse coordinates from "30.6280,-96.3344" or "30.6280 -96.3344"
    pub fn parse_coordinates(input: &str) -> Result<(f64, f64), IntelError> {
        let parts: Vec<&str> = input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.len() != 2 {
            return Err(IntelError::validation(
                "Coordinates must be in format 'lat,lon'",
            ));
        }

        let lat = parts[0]
            .parse::<f64>()
            .map_err(|_| IntelError::validation(format!("Invalid latitude: {}", parts[0])))?;
        let lon = parts[1]
            .parse::<f64>()
            .map_err(|_| IntelError::validation(format!("Invalid longitude: {}", parts[1])))?;

        Self::validate_coordinates(lat, lon)?;
        Ok((lat, lon))
    }

    /// Range check for a coordinate pair
    pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), IntelError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(IntelError::validation(format!(
                "Latitude must be between -90 and 90, got: {lat}"
            )));
        }

        if !(-180.0..=180.0).contains(&lon) {
            return Err(IntelError::validation(format!(
                "Longitude must be between -180 and 180, got: {lon}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_coordinates() {
        assert_eq!(
            LocationParser::parse("30.6280,-96.3344").unwrap(),
            LocationInput::Coordinates(30.628, -96.3344)
        );
        assert_eq!(
            LocationParser::parse("30.6280 -96.3344").unwrap(),
            LocationInput::Coordinates(30.628, -96.3344)
        );
        assert_eq!(
            LocationParser::parse(" -46.8182, -8.2275 ").unwrap(),
            LocationInput::Coordinates(-46.8182, -8.2275)
        );
    }

    #[test]
    fn test_parser_out_of_range_is_address() {
        assert!(matches!(
            LocationParser::parse("91.0,8.0").unwrap(),
            LocationInput::Address(_)
        ));
        assert!(matches!(
            LocationParser::parse("46.0,-181.0").unwrap(),
            LocationInput::Address(_)
        ));
        assert!(matches!(
            LocationParser::parse("46.0,8.0,0.0").unwrap(),
            LocationInput::Address(_)
        ));
    }

    #[test]
    fn test_parser_addresses() {
        assert_eq!(
            LocationParser::parse("Southwood Valley, College Station, Texas").unwrap(),
            LocationInput::Address("Southwood Valley, College Station, Texas".to_string())
        );
        assert!(matches!(
            LocationParser::parse("77840").unwrap(),
            LocationInput::Address(_)
        ));
    }

    #[test]
    fn test_parser_rejects_empty() {
        let err = LocationParser::parse("   ").unwrap_err();
        assert!(err.to_string().contains("Location cannot be empty"));
    }

    #[test]
    fn test_location_from_coordinates() {
        let location = Location::from_coordinates(46.8182, 8.2275);
        assert_eq!(location.resolved_address, "46.8182, 8.2275");
        assert_eq!(location.label(), "46.8182, 8.2275");
    }
}
