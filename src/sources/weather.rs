//! Open-Meteo current conditions plus a short daily outlook

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1";

const FIELDS: &[&str] = &[
    "temperature_c",
    "wind_speed_kmh",
    "weather_description",
    "temp_max_c",
    "temp_min_c",
    "precipitation_mm",
    "uv_index_max",
    "daylight_hours",
];

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
    daily: Option<DailyData>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u8,
}

/// Daily series; only the first day is used
#[derive(Debug, Default, Deserialize)]
struct DailyData {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    uv_index_max: Vec<Option<f64>>,
    /// Seconds of daylight
    #[serde(default)]
    daylight_duration: Vec<Option<f64>>,
}

fn first(series: &[Option<f64>]) -> Option<f64> {
    series.first().copied().flatten()
}

/// WMO weather interpretation codes
#[must_use]
pub fn weather_code_to_description(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

impl ForecastResponse {
    fn into_record(self) -> Result<NormalizedRecord, FetchError> {
        let current = self
            .current_weather
            .ok_or_else(|| FetchError::Malformed("no current weather in response".into()))?;
        let daily = self.daily.unwrap_or_default();

        Ok(NormalizedRecord::new()
            .with("temperature_c", current.temperature)
            .with("wind_speed_kmh", current.windspeed)
            .with(
                "weather_description",
                weather_code_to_description(current.weathercode),
            )
            .with_opt("temp_max_c", first(&daily.temperature_2m_max))
            .with_opt("temp_min_c", first(&daily.temperature_2m_min))
            .with_opt("precipitation_mm", first(&daily.precipitation_sum))
            .with_opt("uv_index_max", first(&daily.uv_index_max))
            .with_opt(
                "daylight_hours",
                first(&daily.daylight_duration).map(|s| (s / 360.0).round() / 10.0),
            ))
    }
}

/// Keyless weather provider
pub struct OpenMeteoAdapter {
    client: Client,
    base_url: String,
}

impl OpenMeteoAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: OPEN_METEO_URL.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for OpenMeteoAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Weather
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let location = &params.location;
        let url = format!(
            "{}/forecast?latitude={}&longitude={}&current_weather=true&daily=temperature_2m_max,temperature_2m_min,precipitation_sum,uv_index_max,daylight_duration&forecast_days=3&timezone=auto",
            self.base_url, location.latitude, location.longitude
        );
        debug!("OpenMeteo API request URL: {}", url);

        let response: ForecastResponse = get_json(self.client.get(&url)).await?;
        response.into_record()
    }
}
