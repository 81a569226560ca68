use std::collections::BTreeMap;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    IntelError,
    service::{Comparison, IntelService, ToolInfo, ToolOutput, ToolTarget},
    sources::IntentHints,
};

/// Body of a tool call: a location plus tool-specific string options
#[derive(Debug, Default, Deserialize)]
pub struct ToolRequest {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub address: Option<String>,
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl ToolRequest {
    fn target(&self) -> Result<ToolTarget, IntelError> {
        match (self.lat, self.lon, self.address.as_deref()) {
            (Some(latitude), Some(longitude), address) => Ok(ToolTarget::Coordinates {
                latitude,
                longitude,
                address: address.map(str::to_string),
            }),
            (None, None, Some(address)) => Ok(ToolTarget::Query(address.to_string())),
            _ => Err(IntelError::validation(
                "Provide either lat and lon, or an address",
            )),
        }
    }

    fn string_options(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(","),
                    Value::Null | Value::Object(_) => return None,
                };
                Some((key.clone(), text))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub locations: Vec<String>,
    pub goals: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default = "default_synthesize")]
    pub synthesize: bool,
}

fn default_synthesize() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ApiSource {
    pub source: &'static str,
    pub tool: &'static str,
    pub fields: &'static [&'static str],
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_hint: Option<&'static str>,
    pub timeout_seconds: f64,
}

/// Error body `{"error": ...}` with a status derived from the failure
pub struct ApiError(IntelError);

impl From<IntelError> for ApiError {
    fn from(err: IntelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IntelError::Validation { .. } => StatusCode::BAD_REQUEST,
            IntelError::Geocoding { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IntelError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.user_message() }))).into_response()
    }
}

pub fn router(service: IntelService) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
        .route("/sources", get(list_sources))
        .route("/compare", post(compare))
        .with_state(service)
}

async fn list_tools() -> Json<&'static [ToolInfo]> {
    Json(IntelService::list_tools())
}

async fn list_sources(State(service): State<IntelService>) -> Json<Vec<ApiSource>> {
    let sources = service
        .registry()
        .sources()
        .map(|c| ApiSource {
            source: c.source.as_str(),
            tool: c.source.tool_name(),
            fields: c.fields,
            configured: c.configured,
            credential_hint: c.credential_hint,
            timeout_seconds: c.timeout.as_secs_f64(),
        })
        .collect();
    Json(sources)
}

async fn call_tool(
    State(service): State<IntelService>,
    Path(name): Path<String>,
    Json(request): Json<ToolRequest>,
) -> Result<Json<ToolOutput>, ApiError> {
    let target = request.target()?;
    let output = service
        .run_tool(&name, &target, request.string_options())
        .await?;
    Ok(Json(output))
}

async fn compare(
    State(service): State<IntelService>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<Comparison>, ApiError> {
    let hints = IntentHints::from_names(&request.hints);
    let comparison = service
        .compare(
            &request.locations,
            request.goals.as_deref(),
            &hints,
            request.synthesize,
        )
        .await?;
    Ok(Json(comparison))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::models::{NormalizedRecord, SourceId};
    use crate::sources::{
        FetchError, FetchParams, GeocodeHit, Geocoder, SourceAdapter, SourceRegistry,
    };
    use crate::synthesis::{SynthesisClient, SynthesisError, SynthesisInput};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoGeocoder;

    #[async_trait]
    impl Geocoder for NoGeocoder {
        async fn forward(&self, _query: &str) -> Result<Vec<GeocodeHit>, FetchError> {
            Ok(Vec::new())
        }

        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<GeocodeHit>, FetchError> {
            Ok(None)
        }
    }

    struct Offline;

    #[async_trait]
    impl SynthesisClient for Offline {
        async fn synthesize(&self, _input: SynthesisInput<'_>) -> Result<String, SynthesisError> {
            Err(SynthesisError::Unavailable("offline".into()))
        }
    }

    struct FixedWeather;

    #[async_trait]
    impl SourceAdapter for FixedWeather {
        fn source_id(&self) -> SourceId {
            SourceId::Weather
        }

        fn supported_fields(&self) -> &'static [&'static str] {
            &["temperature_c"]
        }

        async fn fetch(&self, _params: &FetchParams) -> Result<NormalizedRecord, FetchError> {
            Ok(NormalizedRecord::new().with("temperature_c", 21.5))
        }
    }

    fn app() -> Router {
        let registry = SourceRegistry::builder(ProvidersConfig::default())
            .register(Arc::new(FixedWeather))
            .build();
        let service = IntelService::new(
            Arc::new(registry),
            Arc::new(NoGeocoder),
            Arc::new(Offline),
            0.5,
        );
        router(service)
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (status, body) = send(Request::get("/tools").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 10);
        assert_eq!(body[0]["name"], "geocode");
    }

    #[tokio::test]
    async fn test_tool_with_coordinates_and_address() {
        let (status, body) = send(post(
            "/tools/weather",
            json!({"lat": 30.628, "lon": -96.334, "address": "College Station, TX"}),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source_id"], "weather");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["fields"]["temperature_c"], 21.5);
    }

    #[tokio::test]
    async fn test_unregistered_source_is_not_configured() {
        let (status, body) = send(post("/tools/housing", json!({"lat": 30.6, "lon": -96.3}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unavailable");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_bad_request() {
        let (status, body) = send(post("/tools/horoscope", json!({"lat": 1.0, "lon": 2.0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_missing_location_is_bad_request() {
        let (status, _) = send(post("/tools/weather", json!({"mode": "walking"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_address_is_unprocessable() {
        let (status, _) = send(post("/tools/weather", json!({"address": "Atlantis"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_string_options() {
        let request: ToolRequest = serde_json::from_value(json!({
            "lat": 1.0,
            "lon": 2.0,
            "destination": "Downtown",
            "radius": 1500,
            "hints": ["walk_score", "housing"],
            "extra": null
        }))
        .unwrap();
        let options = request.string_options();
        assert_eq!(options["destination"], "Downtown");
        assert_eq!(options["radius"], "1500");
        assert_eq!(options["hints"], "walk_score,housing");
        assert!(!options.contains_key("extra"));
        assert!(!options.contains_key("lat"));
    }
}
