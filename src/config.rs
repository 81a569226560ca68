//! Configuration management
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::IntelError;
use crate::models::SourceId;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    /// Data provider settings
    pub providers: ProvidersConfig,
    /// Provider credentials
    pub credentials: CredentialsConfig,
    /// Language model synthesis settings
    pub synthesis: SynthesisConfig,
    /// Comparison scoring settings
    pub scoring: ScoringConfig,
    /// Commute source settings
    pub commute: CommuteConfig,
    /// Amenities source settings
    pub amenities: AmenitiesConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Tool server settings
    pub server: ServerConfig,
}

/// Data provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Timeout for providers that do not declare their own, in seconds
    pub default_timeout_seconds: u32,
    /// Per-source timeout overrides in seconds, keyed by source id
    pub timeouts: HashMap<String, u32>,
    /// User agent sent to every provider
    pub user_agent: String,
}

/// Provider credentials
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub google_maps_api_key: Option<String>,
    pub walkscore_api_key: Option<String>,
    /// Used for both crime data and housing
    pub rapidapi_key: Option<String>,
    /// OpenAQ key
    pub air_quality_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub census_api_key: Option<String>,
}

/// Language model synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u32,
}

/// Comparison scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum fraction of scored fields a location needs to be ranked
    pub min_coverage: f64,
}

/// Commute source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommuteConfig {
    pub default_destination: String,
    /// Travel mode passed to the distance matrix (driving, walking, transit, bicycling)
    pub mode: String,
}

/// Amenities source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmenitiesConfig {
    /// Place type searched when the caller does not name one
    pub default_type: String,
    pub radius_meters: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (pretty or json)
    pub format: String,
}

/// Tool server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

// Default value functions
fn default_provider_timeout() -> u32 {
    10
}

fn default_user_agent() -> String {
    format!("neighborhood-intel/{}", crate::VERSION)
}

fn default_synthesis_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_synthesis_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_synthesis_timeout() -> u32 {
    60
}

fn default_min_coverage() -> f64 {
    0.5
}

fn default_commute_destination() -> String {
    "Texas A&M University, College Station".to_string()
}

fn default_commute_mode() -> String {
    "driving".to_string()
}

fn default_amenity_type() -> String {
    "school".to_string()
}

fn default_amenity_radius() -> u32 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_provider_timeout(),
            timeouts: HashMap::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: default_synthesis_base_url(),
            model: default_synthesis_model(),
            timeout_seconds: default_synthesis_timeout(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_coverage: default_min_coverage(),
        }
    }
}

impl Default for CommuteConfig {
    fn default() -> Self {
        Self {
            default_destination: default_commute_destination(),
            mode: default_commute_mode(),
        }
    }
}

impl Default for AmenitiesConfig {
    fn default() -> Self {
        Self {
            default_type: default_amenity_type(),
            radius_meters: default_amenity_radius(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

impl ProvidersConfig {
    /// Effective timeout for a source: config override, then the adapter's own, then the default
    #[must_use]
    pub fn timeout_for(&self, source: SourceId, adapter_default: Option<Duration>) -> Duration {
        if let Some(seconds) = self.timeouts.get(source.as_str()) {
            return Duration::from_secs(u64::from(*seconds));
        }
        adapter_default
            .unwrap_or_else(|| Duration::from_secs(u64::from(self.default_timeout_seconds)))
    }
}

impl CredentialsConfig {
    /// Fill unset keys from the conventional provider environment variables
    #[must_use]
    pub fn with_env_fallback(mut self) -> Self {
        fn fill(slot: &mut Option<String>, var: &str) {
            if slot.as_deref().is_none_or(str::is_empty) {
                *slot = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            }
        }

        fill(&mut self.google_maps_api_key, "GOOGLE_MAPS_API_KEY");
        fill(&mut self.walkscore_api_key, "WALKSCORE_API_KEY");
        fill(&mut self.rapidapi_key, "RAPIDAPI_KEY");
        fill(&mut self.air_quality_api_key, "AIR_QUALITY_API_KEY");
        fill(&mut self.openrouter_api_key, "OPENROUTER_API_KEY");
        fill(&mut self.census_api_key, "CENSUS_API_KEY");
        self
    }
}

impl IntelConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // NEIGHBORHOOD_PROVIDERS__DEFAULT_TIMEOUT_SECONDS=5 and friends
        builder = builder.add_source(
            Environment::with_prefix("NEIGHBORHOOD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: IntelConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.credentials = config.credentials.with_env_fallback();
        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("neighborhood-intel").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.providers.default_timeout_seconds == 0 {
            self.providers.default_timeout_seconds = default_provider_timeout();
        }
        if self.providers.user_agent.is_empty() {
            self.providers.user_agent = default_user_agent();
        }
        if self.synthesis.base_url.is_empty() {
            self.synthesis.base_url = default_synthesis_base_url();
        }
        if self.synthesis.model.is_empty() {
            self.synthesis.model = default_synthesis_model();
        }
        if self.synthesis.timeout_seconds == 0 {
            self.synthesis.timeout_seconds = default_synthesis_timeout();
        }
        if self.commute.default_destination.is_empty() {
            self.commute.default_destination = default_commute_destination();
        }
        if self.commute.mode.is_empty() {
            self.commute.mode = default_commute_mode();
        }
        if self.amenities.default_type.is_empty() {
            self.amenities.default_type = default_amenity_type();
        }
        if self.amenities.radius_meters == 0 {
            self.amenities.radius_meters = default_amenity_radius();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.providers.default_timeout_seconds > 300 {
            return Err(
                IntelError::config("Provider timeout cannot exceed 300 seconds").into(),
            );
        }

        for (source, seconds) in &self.providers.timeouts {
            if source.parse::<SourceId>().is_err() {
                return Err(IntelError::config(format!(
                    "Unknown source '{source}' in provider timeouts"
                ))
                .into());
            }
            if *seconds == 0 || *seconds > 300 {
                return Err(IntelError::config(format!(
                    "Timeout for '{source}' must be between 1 and 300 seconds"
                ))
                .into());
            }
        }

        if self.synthesis.timeout_seconds > 300 {
            return Err(
                IntelError::config("Synthesis timeout cannot exceed 300 seconds").into(),
            );
        }

        if !(self.scoring.min_coverage > 0.0 && self.scoring.min_coverage <= 1.0) {
            return Err(IntelError::config(
                "Scoring min_coverage must be greater than 0 and at most 1",
            )
            .into());
        }

        if self.amenities.radius_meters > 50_000 {
            return Err(IntelError::config("Amenity radius cannot exceed 50000 meters").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(IntelError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(IntelError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        let valid_modes = ["driving", "walking", "transit", "bicycling"];
        if !valid_modes.contains(&self.commute.mode.as_str()) {
            return Err(IntelError::config(format!(
                "Invalid commute mode '{}'. Must be one of: {}",
                self.commute.mode,
                valid_modes.join(", ")
            ))
            .into());
        }

        if !self.synthesis.base_url.starts_with("http://")
            && !self.synthesis.base_url.starts_with("https://")
        {
            return Err(IntelError::config(
                "Synthesis base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IntelConfig::default();
        assert_eq!(config.providers.default_timeout_seconds, 10);
        assert_eq!(config.synthesis.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.commute.default_destination, "Texas A&M University, College Station");
        assert_eq!(config.amenities.default_type, "school");
        assert_eq!(config.logging.level, "info");
        assert!(config.credentials.rapidapi_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_resolution_order() {
        let mut providers = ProvidersConfig::default();
        providers.timeouts.insert("crime".to_string(), 3);

        assert_eq!(
            providers.timeout_for(SourceId::Crime, Some(Duration::from_secs(15))),
            Duration::from_secs(3)
        );
        assert_eq!(
            providers.timeout_for(SourceId::Walkability, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            providers.timeout_for(SourceId::Weather, None),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = IntelConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = IntelConfig::default();
        config.providers.default_timeout_seconds = 500;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("timeout cannot exceed"));

        let mut config = IntelConfig::default();
        config.scoring.min_coverage = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unknown_timeout_source() {
        let mut config = IntelConfig::default();
        config.providers.timeouts.insert("zillow".to_string(), 5);
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Unknown source"));
    }

    #[test]
    fn test_apply_defaults_fills_blanks() {
        let mut config = IntelConfig::default();
        config.synthesis.model = String::new();
        config.amenities.radius_meters = 0;
        config.apply_defaults();
        assert_eq!(config.synthesis.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.amenities.radius_meters, 2000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "neighborhood-intel-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[providers]
default_timeout_seconds = 7

[providers.timeouts]
housing = 12

[scoring]
min_coverage = 0.6

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = IntelConfig::load_from_path(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.providers.default_timeout_seconds, 7);
        assert_eq!(config.providers.timeouts.get("housing"), Some(&12));
        assert_eq!(config.scoring.min_coverage, 0.6);
        assert_eq!(config.logging.format, "json");
        // untouched sections keep their defaults
        assert_eq!(config.commute.mode, "driving");
    }

    #[test]
    fn test_config_path_generation() {
        if let Some(path) = IntelConfig::get_config_path() {
            assert!(path.to_string_lossy().contains("neighborhood-intel"));
            assert!(path.to_string_lossy().contains("config.toml"));
        }
    }
}
