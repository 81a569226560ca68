//! Source adapters
//!
//! One adapter per external provider. Every adapter translates its provider's
//! response into a [`NormalizedRecord`] so the rest of the engine never sees a
//! provider-specific shape:
//! - geocoding: Nominatim (forward and reverse)
//! - weather: Open-Meteo
//! - air quality: OpenAQ v3
//! - crime: RapidAPI crime data
//! - housing: Zillow, then Realty Mole (both via RapidAPI)
//! - walkability: Walk Score, or an OpenStreetMap density estimate
//! - commute: Google distance matrix
//! - amenities: Google Places nearby search
//! - demographics: US Census ACS 5-year tables

pub mod air_quality;
pub mod amenities;
pub mod commute;
pub mod crime;
pub mod demographics;
pub mod geocoding;
pub mod housing;
mod http;
pub mod registry;
pub mod walkability;
pub mod weather;

use crate::models::{Location, NormalizedRecord, SourceId, UnavailableReason};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use geocoding::{GeocodeHit, Geocoder, NominatimGeocoder};
pub use http::build_client;
pub use registry::{Capability, IntentHints, RegistryBuilder, SourceRegistry};

/// Why a single fetch failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("source is not configured")]
    NotConfigured,

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error {0}")]
    HttpError(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Error taxonomy used for logging and fallback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing credentials
    Configuration,
    /// Timeouts, connection failures, 5xx and 429
    Transient,
    /// Other 4xx and schema mismatches
    Permanent,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        }
    }
}

impl FetchError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::NotConfigured => ErrorClass::Configuration,
            FetchError::Timeout | FetchError::Network(_) => ErrorClass::Transient,
            FetchError::HttpError(status) if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            FetchError::HttpError(_) | FetchError::Malformed(_) => ErrorClass::Permanent,
        }
    }

    /// Reason recorded on the resulting `Unavailable` or `Synthetic` record
    #[must_use]
    pub fn reason(&self) -> UnavailableReason {
        match self {
            FetchError::NotConfigured => UnavailableReason::NotConfigured,
            FetchError::Timeout => UnavailableReason::Timeout,
            FetchError::HttpError(status) => UnavailableReason::HttpError { status: *status },
            FetchError::Network(detail) => UnavailableReason::Network {
                detail: detail.clone(),
            },
            FetchError::Malformed(detail) => UnavailableReason::Malformed {
                detail: detail.clone(),
            },
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpError(status.as_u16())
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Input handed to every adapter
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub location: Location,
    /// Source-specific extras (commute destination, amenity type, crime date range)
    pub options: BTreeMap<String, String>,
}

impl FetchParams {
    #[must_use]
    pub fn new(location: Location) -> Self {
        Self {
            location,
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Uniform capability every provider exposes
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Field names this adapter can produce
    fn supported_fields(&self) -> &'static [&'static str];

    /// Provider-specific timeout; `None` uses the configured default
    fn default_timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether the credentials this provider needs are present
    fn is_configured(&self) -> bool {
        true
    }

    /// Environment variable that enables this provider, for operator hints
    fn credential_hint(&self) -> Option<&'static str> {
        None
    }

    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError>;
}
