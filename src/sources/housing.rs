//! Housing prices: Zillow listings first, Realty Mole assessments second
//!
//! Both providers sit behind RapidAPI and share one key. When neither
//! answers, the fallback resolver estimates prices from regional averages.

use super::http::get_json;
use super::{FetchError, FetchParams, SourceAdapter};
use crate::models::{NormalizedRecord, SourceId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const ZILLOW_URL: &str = "https://zillow-com1.p.rapidapi.com/propertyExtendedSearch";
const ZILLOW_HOST: &str = "zillow-com1.p.rapidapi.com";
pub const REALTY_MOLE_URL: &str = "https://realty-mole-property-api.p.rapidapi.com/properties";
const REALTY_MOLE_HOST: &str = "realty-mole-property-api.p.rapidapi.com";

/// Monthly rent as a share of the purchase price
pub const MONTHLY_RENT_RATIO: f64 = 0.005;
const LISTINGS_ANALYZED: usize = 5;

const FIELDS: &[&str] = &[
    "housing_price",
    "median_rent",
    "price_low",
    "price_high",
    "properties_analyzed",
    "housing_source",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZillowResponse {
    Search { props: Vec<Listing> },
    Bare(Vec<Listing>),
}

#[derive(Debug, Deserialize)]
struct Listing {
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RealtyMoleResponse {
    Many(Vec<Property>),
    One(Property),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Property {
    assessed_value: Option<f64>,
}

/// Rent estimate rounded to whole dollars
#[must_use]
pub fn estimated_rent(price: f64) -> f64 {
    (price * MONTHLY_RENT_RATIO).round()
}

fn from_listings(response: ZillowResponse) -> Result<NormalizedRecord, FetchError> {
    let listings = match response {
        ZillowResponse::Search { props } => props,
        ZillowResponse::Bare(listings) => listings,
    };
    let analyzed: Vec<&Listing> = listings.iter().take(LISTINGS_ANALYZED).collect();
    let prices: Vec<f64> = analyzed
        .iter()
        .filter_map(|l| l.price)
        .filter(|p| *p > 0.0)
        .collect();

    if prices.is_empty() {
        return Err(FetchError::Malformed("no priced listings".into()));
    }

    let average = (prices.iter().sum::<f64>() / prices.len() as f64).round();
    let low = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let high = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(NormalizedRecord::new()
        .with("housing_price", average)
        .with("median_rent", estimated_rent(average))
        .with("price_low", low)
        .with("price_high", high)
        .with("properties_analyzed", analyzed.len())
        .with("housing_source", "zillow"))
}

fn from_assessment(response: RealtyMoleResponse) -> Result<NormalizedRecord, FetchError> {
    let value = match response {
        RealtyMoleResponse::Many(properties) => {
            properties.into_iter().find_map(|p| p.assessed_value)
        }
        RealtyMoleResponse::One(property) => property.assessed_value,
    }
    .filter(|v| *v > 0.0)
    .ok_or_else(|| FetchError::Malformed("no assessed value".into()))?;

    Ok(NormalizedRecord::new()
        .with("housing_price", value)
        .with("median_rent", estimated_rent(value))
        .with("properties_analyzed", 1.0)
        .with("housing_source", "realty_mole"))
}

pub struct HousingAdapter {
    client: Client,
    api_key: Option<String>,
}

impl HousingAdapter {
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn zillow(&self, api_key: &str, address: &str) -> Result<NormalizedRecord, FetchError> {
        let request = self
            .client
            .get(ZILLOW_URL)
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", ZILLOW_HOST)
            .query(&[("location", address), ("status_type", "ForSale")]);
        from_listings(get_json(request).await?)
    }

    async fn realty_mole(
        &self,
        api_key: &str,
        address: &str,
    ) -> Result<NormalizedRecord, FetchError> {
        let request = self
            .client
            .get(REALTY_MOLE_URL)
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", REALTY_MOLE_HOST)
            .query(&[("address", address)]);
        from_assessment(get_json(request).await?)
    }
}

#[async_trait]
impl SourceAdapter for HousingAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Housing
    }

    fn supported_fields(&self) -> &'static [&'static str] {
        FIELDS
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
        let address = params.location.resolved_address.as_str();

        match self.zillow(api_key, address).await {
            Ok(record) => Ok(record),
            Err(e) => {
                debug!("Zillow lookup failed, trying Realty Mole: {}", e);
                self.realty_mole(api_key, address).await
            }
        }
    }
}
