//! Reported incidents from the jgentes crime data API on RapidAPI

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub const CRIME_URL: &str = "https://jgentes-crime-data-v1.p.rapidapi.com/crime";
const RAPIDAPI_HOST: &str = "jgentes-Crime-Data-v1.p.rapidapi.com";

pub const DEFAULT_START_DATE: &str = "1/1/2024";
pub const DEFAULT_END_DATE: &str = "12/31/2024";

const FIELDS: &[&str] = &[
    "total_incidents",
    "safety_score",
    "safety_label",
    "top_category",
    "date_range",
];

#[derive(Debug, Deserialize)]
struct Incident {
    category: Option<String>,
}

/// Safety score (0-10) and label for an incident count
#[must_use]
pub fn safety_rating(total_incidents: usize) -> (f64, &'static str) {
    let score = match total_incidents {
        0 => 10.0,
        n if n < 50 => 9.0,
        n if n < 150 => 8.0,
        n if n < 300 => 7.0,
        n if n < 500 => 6.0,
        n if n < 800 => 5.0,
        _ => 4.0,
    };
    (score, safety_label(score))
}

/// Label for a safety score on the same bands
#[must_use]
pub fn safety_label(score: f64) -> &'static str {
    match score {
        s if s >= 10.0 => "No Reported Crimes",
        s if s >= 9.0 => "Very Safe",
        s if s >= 8.0 => "Safe",
        s if s >= 7.0 => "Moderately Safe",
        s if s >= 6.0 => "Average",
        s if s >= 5.0 => "Below Average",
        _ => "High Crime Area",
    }
}

/// Most frequent category; ties go to the alphabetically first name
fn top_category(incidents: &[Incident]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for incident in incidents {
        let category = incident.category.as_deref().unwrap_or("Unknown");
        *counts.entry(category).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| b_name.cmp(a_name)))
        .map(|(name, _)| name.to_string())
}

pub struct CrimeDataAdapter {
    client: Client,
    api_key: Option<String>,
}

impl CrimeDataAdapter {
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SourceAdapter for CrimeDataAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Crime
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn default_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(15))
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn credential_hint(&self) -> Option<&'static str> {
        Some("RAPIDAPI_KEY")
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::NotConfigured)?;
        let start_date = params.option("start_date").unwrap_or(DEFAULT_START_DATE);
        let end_date = params.option("end_date").unwrap_or(DEFAULT_END_DATE);

        let request = self
            .client
            .get(CRIME_URL)
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", RAPIDAPI_HOST)
            .query(&[
                ("startdate", start_date.to_string()),
                ("enddate", end_date.to_string()),
                ("long", params.location.longitude.to_string()),
                ("lat", params.location.latitude.to_string()),
            ]);

        let incidents: Vec<Incident> = get_json(request).await?;
        debug!("Received {} crime incidents", incidents.len());
        Ok(normalize(&incidents, start_date, end_date))
    }
}

fn normalize(incidents: &[Incident], start_date: &str, end_date: &str) -> NormalizedRecord {
    let (score, label) = safety_rating(incidents.len());
    NormalizedRecord::new()
        .with("total_incidents", incidents.len())
        .with("safety_score", score)
        .with("safety_label", label)
        .with_opt("top_category", top_category(incidents))
        .with("date_range", format!("{start_date} to {end_date}"))
}
