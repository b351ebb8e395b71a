//! OpenRouteService isochrone client
//!
//! POSTs one location per request to `/v2/isochrones/{profile}` and reads
//! `area` and `total_pop` from the first feature of the response.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchError, IsochroneFetcher, IsochroneResult};
use crate::config::OracleConfig;
use crate::model::{DistanceBudget, Point};

#[derive(Debug, Serialize)]
struct IsochroneRequest {
    /// `[lng, lat]` pairs
    locations: Vec<[f64; 2]>,
    range: Vec<u64>,
    smoothing: f64,
    range_type: &'static str,
    attributes: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    area: f64,
    total_pop: f64,
}

#[derive(Debug, Deserialize)]
struct OracleErrorBody {
    error: OracleErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OracleErrorDetail {
    Message(String),
    Structured { message: String },
}

pub struct OpenRouteServiceFetcher {
    client: Client,
    endpoint: String,
    api_key: String,
    smoothing: f64,
}

impl OpenRouteServiceFetcher {
    pub fn new(config: &OracleConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No routing API key configured (set ORS_API_KEY)"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v2/isochrones/{}",
                config.base_url.trim_end_matches('/'),
                config.profile
            ),
            api_key,
            smoothing: config.smoothing,
        })
    }

    fn request_body(&self, point: &Point, budget: DistanceBudget) -> IsochroneRequest {
        IsochroneRequest {
            locations: vec![[point.lng, point.lat]],
            range: vec![budget.meters()],
            smoothing: self.smoothing,
            range_type: "distance",
            attributes: ["area", "total_pop"],
        }
    }
}

/// Pull area, population and geometry out of a FeatureCollection
fn parse_feature_collection(body: Value) -> Result<IsochroneResult, FetchError> {
    let properties = body
        .get("features")
        .and_then(|f| f.get(0))
        .and_then(|f| f.get("properties"))
        .cloned()
        .ok_or_else(|| FetchError::MalformedResponse("missing features[0].properties".to_string()))?;

    let props: FeatureProperties = serde_json::from_value(properties)
        .map_err(|e| FetchError::MalformedResponse(format!("bad feature properties: {}", e)))?;

    if !props.area.is_finite() || props.area < 0.0 {
        return Err(FetchError::MalformedResponse(format!("invalid area {}", props.area)));
    }
    // Beyond u64 the cast would silently saturate
    if !props.total_pop.is_finite() || props.total_pop < 0.0 || props.total_pop >= u64::MAX as f64 {
        return Err(FetchError::MalformedResponse(format!("invalid total_pop {}", props.total_pop)));
    }

    Ok(IsochroneResult {
        area_m2: props.area,
        population: props.total_pop.round() as u64,
        geometry: body,
    })
}

fn oracle_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<OracleErrorBody>(body) {
        Ok(OracleErrorBody { error: OracleErrorDetail::Message(m) }) => m,
        Ok(OracleErrorBody { error: OracleErrorDetail::Structured { message } }) => message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    }
}

#[async_trait]
impl IsochroneFetcher for OpenRouteServiceFetcher {
    async fn fetch(&self, point: &Point, budget: DistanceBudget) -> Result<IsochroneResult, FetchError> {
        debug!(point = %point.id, budget_m = budget.meters(), "Requesting isochrone");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&self.request_body(point, budget))
            .send()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::NetworkFailure(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            let message = oracle_message(status, &text);
            warn!(point = %point.id, status = status.as_u16(), "Oracle rejected request: {}", message);
            return Err(FetchError::OracleError { status: status.as_u16(), message });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| FetchError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        parse_feature_collection(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_feature_collection() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "group_index": 0, "value": 4166.0, "area": 2000000.0, "total_pop": 1500.0 },
                "geometry": { "type": "Polygon", "coordinates": [] }
            }]
        });
        let result = parse_feature_collection(body.clone()).unwrap();
        assert_eq!(result.area_m2, 2_000_000.0);
        assert_eq!(result.population, 1500);
        assert_eq!(result.geometry, body);
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let empty = json!({ "type": "FeatureCollection", "features": [] });
        assert!(matches!(parse_feature_collection(empty), Err(FetchError::MalformedResponse(_))));

        let no_pop = json!({ "features": [{ "properties": { "area": 10.0 } }] });
        assert!(matches!(parse_feature_collection(no_pop), Err(FetchError::MalformedResponse(_))));

        let negative = json!({ "features": [{ "properties": { "area": 10.0, "total_pop": -3 } }] });
        assert!(matches!(parse_feature_collection(negative), Err(FetchError::MalformedResponse(_))));

        let oversized = json!({ "features": [{ "properties": { "area": 10.0, "total_pop": 1e20 } }] });
        assert!(matches!(parse_feature_collection(oversized), Err(FetchError::MalformedResponse(_))));
    }

    #[test]
    fn test_oracle_message_variants() {
        assert_eq!(oracle_message(StatusCode::FORBIDDEN, r#"{"error":"Access to this API has been disallowed"}"#),
            "Access to this API has been disallowed");
        assert_eq!(oracle_message(StatusCode::BAD_REQUEST, r#"{"error":{"code":3002,"message":"Parameter 'range' is out of bounds"}}"#),
            "Parameter 'range' is out of bounds");
        assert_eq!(oracle_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[test]
    fn test_request_body_shape() {
        let config = OracleConfig {
            api_key: Some("secret".to_string()),
            ..OracleConfig::default()
        };
        let fetcher = OpenRouteServiceFetcher::new(&config).unwrap();
        let point = Point { id: crate::model::PointId(0), lat: 53.55, lng: 10.0 };
        let body = serde_json::to_value(fetcher.request_body(&point, DistanceBudget(4166))).unwrap();

        assert_eq!(body, json!({
            "locations": [[10.0, 53.55]],
            "range": [4166],
            "smoothing": 0.1,
            "range_type": "distance",
            "attributes": ["area", "total_pop"]
        }));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let config = OracleConfig { api_key: None, ..OracleConfig::default() };
        assert!(OpenRouteServiceFetcher::new(&config).is_err());
    }
}
