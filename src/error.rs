//! Error types and handling for the neighborhood intelligence engine

use thiserror::Error;

/// Main error type for the library
///
/// Only failures above the source level surface here. Provider failures are
/// absorbed by the context assembler and show up as `Unavailable` or
/// `Synthetic` records instead.
#[derive(Error, Debug)]
pub enum IntelError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A location query could not be resolved to coordinates
    #[error("Geocoding failed for '{query}': {message}")]
    Geocoding { query: String, message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },
}

impl IntelError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new geocoding failure for a query
    pub fn geocoding<Q: Into<String>, S: Into<String>>(query: Q, message: S) -> Self {
        Self::Geocoding {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this error only affects a single location of a comparison
    #[must_use]
    pub fn is_location_scoped(&self) -> bool {
        matches!(self, Self::Geocoding { .. } | Self::Validation { .. })
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            IntelError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            IntelError::Geocoding { query, .. } => {
                format!("Could not find a location for '{query}'. Try a more specific address.")
            }
            IntelError::Validation { message } => {
                format!("Invalid input: {message}")
            }
        }
    }
}
