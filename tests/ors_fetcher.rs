//! OpenRouteService client against a mock HTTP server

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use isochrone_dashboard::config::OracleConfig;
use isochrone_dashboard::model::{DistanceBudget, Point, PointId};
use isochrone_dashboard::oracle::{FetchError, IsochroneFetcher, OpenRouteServiceFetcher};

fn config(base_url: String) -> OracleConfig {
    OracleConfig {
        base_url,
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 2,
        ..OracleConfig::default()
    }
}

fn hamburg() -> Point {
    Point { id: PointId(0), lat: 53.55, lng: 10.01667 }
}

#[tokio::test]
async fn test_fetch_success() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "group_index": 0, "value": 4166.0, "area": 2000000.0, "total_pop": 1500.0 },
            "geometry": { "type": "Polygon", "coordinates": [[[10.0, 53.5], [10.1, 53.5], [10.0, 53.6], [10.0, 53.5]]] }
        }]
    });

    Mock::given(method("POST"))
        .and(path("/v2/isochrones/driving-car"))
        .and(header("Authorization", "test-key"))
        .and(body_json(json!({
            "locations": [[10.01667, 53.55]],
            "range": [4166],
            "smoothing": 0.1,
            "range_type": "distance",
            "attributes": ["area", "total_pop"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = OpenRouteServiceFetcher::new(&config(server.uri()))?;
    let result = fetcher.fetch(&hamburg(), DistanceBudget(4166)).await?;

    assert_eq!(result.area_km2(), 2.0);
    assert_eq!(result.population, 1500);
    assert_eq!(result.geometry, body);
    Ok(())
}

#[tokio::test]
async fn test_fetch_oracle_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "error": "Quota exceeded" })))
        .mount(&server)
        .await;

    let fetcher = OpenRouteServiceFetcher::new(&config(server.uri()))?;
    let err = fetcher.fetch(&hamburg(), DistanceBudget(1000)).await.unwrap_err();

    assert_eq!(err, FetchError::OracleError { status: 403, message: "Quota exceeded".to_string() });
    Ok(())
}

#[tokio::test]
async fn test_fetch_malformed_response() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let fetcher = OpenRouteServiceFetcher::new(&config(server.uri()))?;
    let err = fetcher.fetch(&hamburg(), DistanceBudget(1000)).await.unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
    Ok(())
}

#[tokio::test]
async fn test_fetch_network_failure() -> anyhow::Result<()> {
    // Grab a free port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let fetcher = OpenRouteServiceFetcher::new(&config(format!("http://{}", addr)))?;
    let err = fetcher.fetch(&hamburg(), DistanceBudget(1000)).await.unwrap_err();
    assert!(matches!(err, FetchError::NetworkFailure(_)));
    Ok(())
}
