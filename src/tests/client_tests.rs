use super::{serve, METADATA_BODY, PROJECTION_BODY};
use chrono::{TimeZone, Utc};
use havvarsel_lib::api::HavvarselClient;
use havvarsel_lib::config::ApiConfig;
use havvarsel_lib::{HavvarselError, Location};

fn client_for(base_url: &str) -> HavvarselClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 2,
        ..ApiConfig::default()
    };
    HavvarselClient::new(&config).unwrap()
}

fn nordnes() -> Location {
    Location::new(5.303883, 60.400485, 0.0).unwrap()
}

fn variables(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_projection_over_http() {
    let server = serve(vec![(200, METADATA_BODY), (200, PROJECTION_BODY)]).await;
    let client = client_for(&server.base_url);

    let projection = client
        .projection(&nordnes(), &variables(&["temperature", "salinity"]))
        .await
        .unwrap();

    let requests = server.request_lines();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("GET /v2/dataprojectionvariables "));
    assert!(requests[1].starts_with(
        "GET /v2/dataprojection/temperature,salinity/5.303883/60.400485?depth=0 "
    ));

    let temperature = projection.variable("temperature").unwrap();
    assert_eq!(temperature.metadata.units(), Some("Celsius"));
    assert_eq!(temperature.series.len(), 3);
    let latest = temperature.series.latest().unwrap();
    assert_eq!(latest.value, Some(11.402));
    assert_eq!(latest.time, Utc.timestamp_millis_opt(1760860800000).unwrap());

    let salinity = projection.variable("salinity").unwrap();
    assert_eq!(salinity.metadata.long_name(), Some("Sea water salinity"));
    assert_eq!(projection.nearest_grid.lat, 60.3987);
}

#[tokio::test]
async fn test_empty_variable_list_requests_temperature() {
    let server = serve(vec![(200, METADATA_BODY), (200, PROJECTION_BODY)]).await;
    let client = client_for(&server.base_url);

    client.projection(&nordnes(), &[]).await.unwrap();

    let requests = server.request_lines();
    assert!(requests[1].contains("/dataprojection/temperature/5.303883/60.400485?depth=0 "));
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let server = serve(vec![(200, METADATA_BODY), (503, "{}")]).await;
    let client = client_for(&server.base_url);

    let err = client
        .projection(&nordnes(), &variables(&["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HavvarselError::Network(_)), "{err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_projection_is_parse_error() {
    let server = serve(vec![(200, METADATA_BODY), (200, super::MALFORMED_BODY)]).await;
    let client = client_for(&server.base_url);

    let err = client
        .projection(&nordnes(), &variables(&["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HavvarselError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn test_metadata_outage_still_fetches_projection() {
    let server = serve(vec![(503, "{}"), (200, PROJECTION_BODY)]).await;
    let client = client_for(&server.base_url);

    let projection = client
        .projection(&nordnes(), &variables(&["temperature", "salinity"]))
        .await
        .unwrap();

    let requests = server.request_lines();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].contains("/dataprojection/temperature,salinity/"));

    let temperature = projection.variable("temperature").unwrap();
    assert!(temperature.metadata.is_empty());
    assert_eq!(temperature.series.latest().unwrap().value, Some(11.402));
    assert!(projection.variable("salinity").unwrap().metadata.is_empty());
}

#[tokio::test]
async fn test_malformed_metadata_still_fetches_projection() {
    let server = serve(vec![(200, "<html>maintenance</html>"), (200, PROJECTION_BODY)]).await;
    let client = client_for(&server.base_url);

    let projection = client
        .projection(&nordnes(), &variables(&["temperature"]))
        .await
        .unwrap();
    assert_eq!(server.request_lines().len(), 2);
    assert_eq!(projection.variable("temperature").unwrap().series.len(), 3);

    // discovery calls still report the failure
    let server = serve(vec![(200, "<html>maintenance</html>")]).await;
    let err = client_for(&server.base_url).available_variables().await.unwrap_err();
    assert!(matches!(err, HavvarselError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn test_available_variables_and_units() {
    let server = serve(vec![(200, METADATA_BODY), (200, METADATA_BODY), (200, METADATA_BODY)]).await;
    let client = client_for(&server.base_url);

    let available = client.available_variables().await.unwrap();
    assert_eq!(
        available.get("temperature").map(String::as_str),
        Some("Sea water potential temperature")
    );
    assert!(!available.contains_key("time"));

    assert_eq!(client.units("salinity").await.unwrap().as_deref(), Some("1e-3"));
    assert_eq!(client.units("u").await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let client = client_for("http://127.0.0.1:1/v2");

    let err = client.variables_metadata().await.unwrap_err();
    assert!(matches!(err, HavvarselError::Network(_)), "{err:?}");
}
