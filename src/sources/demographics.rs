//! US Census demographics
//!
//! Two calls: the Census geocoder maps the coordinates to a tract, then the
//! ACS 5-year tables give income, population and education for that tract.

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

pub const CENSUS_GEOCODER_URL: &str =
    "https://geocoding.geo.census.gov/geocoder/geographies/coordinates";
pub const ACS_URL: &str = "https://api.census.gov/data/2022/acs/acs5";

const SQUARE_METERS_PER_SQUARE_MILE: f64 = 2_589_988.11;

const MEDIAN_INCOME: &str = "B19013_001E";
const POPULATION: &str = "B01003_001E";
const EDUCATION_TOTAL: &str = "B15003_001E";
/// Bachelor's, master's, professional and doctorate degrees
const DEGREE_COLUMNS: [&str; 4] = ["B15003_022E", "B15003_023E", "B15003_024E", "B15003_025E"];

const FIELDS: &[&str] = &[
    "median_income",
    "population",
    "population_density",
    "bachelors_or_higher_pct",
    "census_tract",
];

/// Tract identifiers plus land area
#[derive(Debug, Clone, PartialEq)]
struct Tract {
    state: String,
    county: String,
    tract: String,
    land_area_m2: Option<f64>,
}

/// Census values arrive as strings or numbers depending on the endpoint
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    // ACS marks suppressed estimates with large negative sentinels
    parsed.filter(|n| *n >= 0.0)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_tract(response: &Value) -> Result<Tract, FetchError> {
    let tract = response
        .pointer("/result/geographies/Census Tracts/0")
        .ok_or_else(|| FetchError::Malformed("no census tract for coordinates".into()))?;

    let field = |name: &str| {
        tract
            .get(name)
            .and_then(text)
            .ok_or_else(|| FetchError::Malformed(format!("tract without {name}")))
    };

    Ok(Tract {
        state: field("STATE")?,
        county: field("COUNTY")?,
        tract: field("TRACT")?,
        land_area_m2: tract.get("AREALAND").and_then(number),
    })
}

/// ACS answers a header row followed by one data row
fn parse_acs(response: &Value, tract: &Tract) -> Result<NormalizedRecord, FetchError> {
    let rows = response
        .as_array()
        .filter(|rows| rows.len() >= 2)
        .ok_or_else(|| FetchError::Malformed("ACS response without data row".into()))?;
    let (header, data) = (&rows[0], &rows[1]);

    let column = |name: &str| -> Option<f64> {
        let index = header
            .as_array()?
            .iter()
            .position(|h| h.as_str() == Some(name))?;
        data.get(index).and_then(number)
    };

    let population = column(POPULATION);
    let density = population
        .zip(tract.land_area_m2.filter(|a| *a > 0.0))
        .map(|(people, area)| (people / (area / SQUARE_METERS_PER_SQUARE_MILE)).round());

    let degrees: Option<f64> = DEGREE_COLUMNS.iter().map(|c| column(c)).sum();
    let bachelors_pct = degrees
        .zip(column(EDUCATION_TOTAL).filter(|t| *t > 0.0))
        .map(|(d, total)| (d / total * 1000.0).round() / 10.0);

    Ok(NormalizedRecord::new()
        .with_opt("median_income", column(MEDIAN_INCOME))
        .with_opt("population", population)
        .with_opt("population_density", density)
        .with_opt("bachelors_or_higher_pct", bachelors_pct)
        .with(
            "census_tract",
            format!("{}{}{}", tract.state, tract.county, tract.tract),
        ))
}

pub struct CensusAdapter {
    client: Client,
    api_key: Option<String>,
}

impl CensusAdapter {
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SourceAdapter for CensusAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Demographics
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    #[instrument(skip_all, fields(location = %params.location.label()))]
    async fn fetch(&self, params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
        let location = &params.location;
        let request = self.client.get(CENSUS_GEOCODER_URL).query(&[
            ("x", location.longitude.to_string()),
            ("y", location.latitude.to_string()),
            ("benchmark", "Public_AR_Current".to_string()),
            ("vintage", "Current_Current".to_string()),
            ("layers", "Census Tracts".to_string()),
            ("format", "json".to_string()),
        ]);
        let tract = parse_tract(&get_json::<Value>(request).await?)?;
        debug!(?tract, "Resolved census tract");

        let columns = [MEDIAN_INCOME, POPULATION, EDUCATION_TOTAL]
            .into_iter()
            .chain(DEGREE_COLUMNS)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = format!(
            "{ACS_URL}?get={columns}&for=tract:{}&in=state:{}%20county:{}",
            tract.tract, tract.state, tract.county
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&key={}", urlencoding::encode(key)));
        }

        let acs: Value = get_json(self.client.get(&url)).await?;
        parse_acs(&acs, &tract)
    }
}
