//! Source identifiers and the normalized record schema shared by every provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Field marking a derived value as inferred rather than measured
pub const CONFIDENCE_FIELD: &str = "confidence";
/// Field listing the sources a synthetic value was derived from
pub const DERIVED_FROM_FIELD: &str = "derived_from";
/// Confidence value carried by every synthetic record
pub const LOW_CONFIDENCE: &str = "low";

/// Closed set of external data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Geocoding,
    Weather,
    AirQuality,
    Crime,
    Housing,
    Walkability,
    Commute,
    Amenities,
    Demographics,
}

impl SourceId {
    /// Every source, in table order
    pub const ALL: [SourceId; 9] = [
        SourceId::Geocoding,
        SourceId::Weather,
        SourceId::AirQuality,
        SourceId::Crime,
        SourceId::Housing,
        SourceId::Walkability,
        SourceId::Commute,
        SourceId::Amenities,
        SourceId::Demographics,
    ];

    /// Stable identifier used as a map key and in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::Geocoding => "geocoding",
            SourceId::Weather => "weather",
            SourceId::AirQuality => "air_quality",
            SourceId::Crime => "crime",
            SourceId::Housing => "housing",
            SourceId::Walkability => "walkability",
            SourceId::Commute => "commute",
            SourceId::Amenities => "amenities",
            SourceId::Demographics => "demographics",
        }
    }

    /// Name of the inbound tool serving this source
    #[must_use]
    pub fn tool_name(self) -> &'static str {
        match self {
            SourceId::Geocoding => "geocode",
            SourceId::Crime => "crime_data",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    /// Accepts both the source identifier and its tool name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == s || id.tool_name() == s)
            .ok_or_else(|| format!("Unknown source '{s}'"))
    }
}

/// A single normalized value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// What an adapter hands back: provider data already translated into field names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub fields: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Insert only when the provider actually returned the value
    #[must_use]
    pub fn with_opt<V: Into<FieldValue>>(mut self, name: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.fields.insert(name.to_string(), value.into());
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Unavailable,
    Synthetic,
}

/// Why a record is unavailable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnavailableReason {
    NotConfigured,
    Timeout,
    HttpError { status: u16 },
    Network { detail: String },
    Malformed { detail: String },
    /// The fetch failed and no fallback could derive a value; `cause` is the fetch failure
    NoDerivation { cause: String },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotConfigured => f.write_str("not configured"),
            UnavailableReason::Timeout => f.write_str("timed out"),
            UnavailableReason::HttpError { status } => write!(f, "HTTP {status}"),
            UnavailableReason::Network { detail } => write!(f, "network error: {detail}"),
            UnavailableReason::Malformed { detail } => write!(f, "malformed response: {detail}"),
            UnavailableReason::NoDerivation { cause } => {
                write!(f, "{cause}; no estimate could be derived")
            }
        }
    }
}

/// One source's contribution to a location context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: SourceId,
    pub status: SourceStatus,
    pub fields: BTreeMap<String, FieldValue>,
    /// Provenance of a synthetic record
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub derived_from: BTreeSet<SourceId>,
    /// Failure behind an unavailable record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
    pub fetched_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Measured record from a successful fetch
    #[must_use]
    pub fn ok(source_id: SourceId, record: NormalizedRecord, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id,
            status: SourceStatus::Ok,
            fields: record.fields,
            derived_from: BTreeSet::new(),
            reason: None,
            fetched_at,
        }
    }

    /// Explicitly absent record
    #[must_use]
    pub fn unavailable(
        source_id: SourceId,
        reason: UnavailableReason,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            status: SourceStatus::Unavailable,
            fields: BTreeMap::new(),
            derived_from: BTreeSet::new(),
            reason: Some(reason),
            fetched_at,
        }
    }

    /// Derived record; stamps the low-confidence marker and provenance into the fields
    #[must_use]
    pub fn synthetic(
        source_id: SourceId,
        record: NormalizedRecord,
        derived_from: BTreeSet<SourceId>,
        reason: UnavailableReason,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut fields = record.fields;
        fields.insert(CONFIDENCE_FIELD.to_string(), LOW_CONFIDENCE.into());
        let provenance = derived_from
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        fields.insert(DERIVED_FROM_FIELD.to_string(), provenance.into());

        Self {
            source_id,
            status: SourceStatus::Synthetic,
            fields,
            derived_from,
            reason: Some(reason),
            fetched_at,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status != SourceStatus::Unavailable
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.status == SourceStatus::Synthetic
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    /// Equality ignoring `fetched_at`
    #[must_use]
    pub fn same_content(&self, other: &SourceRecord) -> bool {
        self.source_id == other.source_id
            && self.status == other.status
            && self.fields == other.fields
            && self.derived_from == other.derived_from
            && self.reason == other.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_round_trips_tool_names() {
        for id in SourceId::ALL {
            assert_eq!(id.as_str().parse::<SourceId>().unwrap(), id);
            assert_eq!(id.tool_name().parse::<SourceId>().unwrap(), id);
        }
        assert_eq!("crime_data".parse::<SourceId>().unwrap(), SourceId::Crime);
        assert!("zillow".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_synthetic_record_is_marked() {
        let record = SourceRecord::synthetic(
            SourceId::Housing,
            NormalizedRecord::new().with("housing_price", 375_000.0),
            BTreeSet::from([SourceId::Geocoding, SourceId::Demographics]),
            UnavailableReason::Timeout,
            Utc::now(),
        );

        assert_eq!(record.status, SourceStatus::Synthetic);
        assert_eq!(record.text(CONFIDENCE_FIELD), Some(LOW_CONFIDENCE));
        assert_eq!(record.text(DERIVED_FROM_FIELD), Some("geocoding,demographics"));
        assert_eq!(record.number("housing_price"), Some(375_000.0));
        assert!(record.is_available());
    }

    #[test]
    fn test_unavailable_record_serializes_reason() {
        let record = SourceRecord::unavailable(
            SourceId::Crime,
            UnavailableReason::NotConfigured,
            Utc::now(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"]["kind"], "not_configured");
        assert!(json.get("derived_from").is_none());
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = SourceRecord::ok(
            SourceId::Weather,
            NormalizedRecord::new().with("temperature_c", 21.5),
            Utc::now(),
        );
        let mut b = a.clone();
        b.fetched_at = a.fetched_at + chrono::Duration::seconds(30);
        assert!(a.same_content(&b));
        assert_ne!(a, b);
    }
}
