/// Integration tests with mocked upstream services
/// Drives the real HTTP stack against wiremock for every provider
use flate2::write::GzEncoder;
use flate2::Compression;
use mobiscore_enrich::config::{AddressSource, Config};
use mobiscore_enrich::enrichment::EnrichmentPipeline;
use mobiscore_enrich::errors::EnrichError;
use mobiscore_enrich::fetcher::Fetcher;
use mobiscore_enrich::models::LocationQuery;
use serde_json::json;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADDRESS: &str = "Wijnbergenstraat 97 Kessel-Lo";
const SUGGESTED: &str = "Wijnbergenstraat 97, 3010 Leuven";

const FEATURE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs"
                       xmlns:gml="http://www.opengis.net/gml"
                       xmlns:dgstatistics="http://dgstatistics">
  <gml:featureMember>
    <dgstatistics:su_vectorstatisticalunits>
      <dgstatistics:CS01012019>24062A71-</dgstatistics:CS01012019>
    </dgstatistics:su_vectorstatisticalunits>
  </gml:featureMember>
</wfs:FeatureCollection>"#;

const EMPTY_FEATURE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs"
                       xmlns:gml="http://www.opengis.net/gml">
</wfs:FeatureCollection>"#;

/// Helper function to create a config pointing every endpoint at the mock
fn create_test_config(server: &MockServer) -> Config {
    Config {
        geopunt_base_url: format!("{}/geolocation", server.uri()),
        google_geocode_url: format!("{}/maps/api/geocode/json", server.uri()),
        google_api_key: None,
        mobiscore_url: format!("{}/ajax/get-score", server.uri()),
        wms_url: format!("{}/inspire/dgstatistics/service", server.uri()),
        request_timeout_secs: 5,
        ..Config::default()
    }
}

fn geopunt_hit(formatted: &str, lat: f64, lon: f64) -> serde_json::Value {
    json!({
        "LocationResult": [{
            "FormattedAddress": formatted,
            "Location": {"Lat_WGS84": lat, "Lon_WGS84": lon}
        }]
    })
}

fn geopunt_miss() -> serde_json::Value {
    json!({"LocationResult": []})
}

fn mobiscore_body() -> serde_json::Value {
    json!({
        "score": {
            "scores": {
                "totaal": 8.7,
                "gezondheid": 9.1,
                "onderwijs": 8.2,
                "ontspanning_sport_cultuur": 7.9,
                "ov": 9.5,
                "winkels_en_diensten": 8.8
            }
        }
    })
}

async fn mount_location(server: &MockServer, q: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
        .and(path("/geolocation/location"))
        .and(query_param("q", q))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_suggestion(server: &MockServer, q: &str, suggestions: &[&str], times: u64) {
    Mock::given(method("GET"))
        .and(path("/geolocation/suggestion"))
        .and(query_param("q", q))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "SuggestionResult": suggestions })),
        )
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_google(server: &MockServer, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_score_and_features(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mobiscore_body()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/inspire/dgstatistics/service"))
        .and(query_param("request", "GetFeatureInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEATURE_INFO))
        .mount(server)
        .await;
}

/// Log sink shared with a test-local `fmt` subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_primary_geocoder_hit_skips_fallbacks() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    mount_suggestion(&server, ADDRESS, &[], 0).await;
    mount_google(&server, json!({"results": []}), 0).await;
    mount_score_and_features(&server).await;

    let config = Config {
        google_api_key: Some("test_key".to_string()),
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert_eq!(result.address, "Wijnbergenstraat 97, 3010 Leuven, Belgium");
    assert!((result.lat - 50.88).abs() < 0.01);
    assert!((result.lon - 4.71).abs() < 0.01);
    assert_eq!(result.mobi_score.total, Some(8.7));
    assert!(result.mobi_score.values().iter().all(Option::is_some));
    assert_eq!(result.primary_statistical_unit(), Some("24062A71-"));
}

#[tokio::test]
async fn test_suggestion_coordinates_are_used() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[SUGGESTED, "Wijnbergenstraat 9, 3010 Leuven"], 1).await;
    mount_location(&server, SUGGESTED, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    mount_score_and_features(&server).await;

    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .and(query_param("lat", "50.8838"))
        .and(query_param("lon", "4.7142"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mobiscore_body()))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert_eq!(result.lat, 50.8838);
    assert_eq!(result.lon, 4.7142);

    let logs = logs.contents();
    assert!(logs.contains("WARN"), "logs: {}", logs);
    assert!(
        logs.contains(&format!(
            "Trying suggested address '{}' instead of '{}'",
            SUGGESTED, ADDRESS
        )),
        "logs: {}",
        logs
    );
}

#[tokio::test]
async fn test_failed_suggestion_is_not_retried_again() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[SUGGESTED], 1).await;
    mount_location(&server, SUGGESTED, geopunt_miss(), 1).await;
    mount_suggestion(&server, SUGGESTED, &["Elders 1"], 0).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let err = pipeline.enrich(ADDRESS).await.unwrap_err();

    assert!(matches!(err, EnrichError::LocationNotFound { .. }));
}

#[tokio::test]
async fn test_unresolved_without_key_is_location_not_found() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[], 1).await;
    mount_google(&server, json!({"results": []}), 0).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let err = pipeline.enrich(ADDRESS).await.unwrap_err();

    match err {
        EnrichError::LocationNotFound { address } => assert_eq!(address, ADDRESS),
        other => panic!("Expected LocationNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unresolved_with_key_and_google_miss_is_location_not_found() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[], 1).await;
    mount_google(&server, json!({"results": [], "status": "ZERO_RESULTS"}), 1).await;

    let config = Config {
        google_api_key: Some("test_key".to_string()),
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();
    let err = pipeline.enrich(ADDRESS).await.unwrap_err();

    assert!(matches!(err, EnrichError::LocationNotFound { .. }));
}

#[tokio::test]
async fn test_google_fallback_resolves() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[], 1).await;
    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("key", "test_key"))
        .and(query_param("address", ADDRESS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Wijnbergenstraat 97, 3010 Leuven, Belgium",
                "geometry": {"location": {"lat": 50.8839, "lng": 4.7141}}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_score_and_features(&server).await;

    let config = Config {
        google_api_key: Some("test_key".to_string()),
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert_eq!(result.address, "Wijnbergenstraat 97, 3010 Leuven, Belgium");
    assert_eq!(result.lat, 50.8839);
    assert_eq!(result.lon, 4.7141);
}

#[tokio::test]
async fn test_suggestions_can_be_disabled() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 1).await;
    mount_suggestion(&server, ADDRESS, &[SUGGESTED], 0).await;

    let config = Config {
        use_suggestions: false,
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();

    assert!(matches!(
        pipeline.enrich(ADDRESS).await,
        Err(EnrichError::LocationNotFound { .. })
    ));
}

#[tokio::test]
async fn test_input_address_source_keeps_input_text() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    mount_score_and_features(&server).await;

    let config = Config {
        address_source: AddressSource::Input,
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert_eq!(result.address, ADDRESS);
}

#[tokio::test]
async fn test_geocoder_error_propagates_without_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geolocation/location"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&server)
        .await;
    mount_suggestion(&server, ADDRESS, &[], 0).await;
    mount_google(&server, json!({"results": []}), 0).await;

    let config = Config {
        google_api_key: Some("test_key".to_string()),
        ..create_test_config(&server)
    };
    let pipeline = EnrichmentPipeline::new(&config).unwrap();

    assert!(matches!(
        pipeline.enrich(ADDRESS).await,
        Err(EnrichError::Fetch(_))
    ));
}

#[tokio::test]
async fn test_no_features_is_empty_not_error() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mobiscore_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inspire/dgstatistics/service"))
        .and(query_param("info_format", "text/xml"))
        .and(query_param("i", "50"))
        .and(query_param("j", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEATURE_INFO))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert!(result.statistical_units.is_empty());
    assert_eq!(result.primary_statistical_unit(), None);
}

#[tokio::test]
async fn test_score_without_scores_object_is_unavailable() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": null})))
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();

    assert!(matches!(
        pipeline.enrich(ADDRESS).await,
        Err(EnrichError::ScoreUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_missing_sub_scores_are_null() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": {"scores": {"totaal": 5.5, "ov": 3}}
        })))
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let score = pipeline.score(50.8838, 4.7142).await.unwrap();

    assert_eq!(score.total, Some(5.5));
    assert_eq!(score.public_transportation, Some(3.0));
    assert_eq!(score.health, None);
    assert_eq!(score.services, None);
}

#[tokio::test]
async fn test_coordinates_query_bypasses_geocoding() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_miss(), 0).await;
    mount_score_and_features(&server).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let result = pipeline
        .enrich_query(&LocationQuery::Coordinates {
            lat: 50.8838,
            lon: 4.7142,
        })
        .await
        .unwrap();

    assert_eq!(result.lat, 50.8838);
    assert_eq!(result.primary_statistical_unit(), Some("24062A71-"));
}

#[tokio::test]
async fn test_gzip_and_plain_bodies_decode_identically() {
    let server = MockServer::start().await;
    let body = serde_json::to_vec(&mobiscore_body()).unwrap();

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gzipped"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(gzip(&body)),
        )
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
    let plain_url = url::Url::parse(&format!("{}/plain", server.uri())).unwrap();
    let gzip_url = url::Url::parse(&format!("{}/gzipped", server.uri())).unwrap();

    let plain: serde_json::Value = fetcher.fetch_json(&plain_url, &[]).await.unwrap();
    let gzipped: serde_json::Value = fetcher.fetch_json(&gzip_url, &[]).await.unwrap();

    assert_eq!(plain, gzipped);
    assert_eq!(plain, mobiscore_body());
}

#[tokio::test]
async fn test_map_returns_png_bytes() {
    let server = MockServer::start().await;
    let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    Mock::given(method("GET"))
        .and(path("/inspire/dgstatistics/service"))
        .and(query_param("request", "GetMap"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    assert_eq!(pipeline.map(50.9, 4.75, 0.5).await.unwrap(), png);
}

#[tokio::test]
async fn test_wrong_shaped_score_bodies_are_unavailable() {
    for body in [
        json!({"score": "unavailable"}),
        json!({"score": {"scores": []}}),
        json!([]),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/get-score"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
        let err = pipeline.score(50.8838, 4.7142).await.unwrap_err();

        assert!(
            matches!(err, EnrichError::ScoreUnavailable { .. }),
            "body {} gave {:?}",
            body,
            err
        );
    }
}

#[tokio::test]
async fn test_numeric_string_sub_scores_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": {"scores": {"totaal": "8.7", "ov": 9.5}}
        })))
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let score = pipeline.score(50.8838, 4.7142).await.unwrap();

    assert_eq!(score.total, Some(8.7));
    assert_eq!(score.public_transportation, Some(9.5));
}

#[tokio::test]
async fn test_plain_text_feature_info_is_fetch_error() {
    let server = MockServer::start().await;

    mount_location(&server, ADDRESS, geopunt_hit(SUGGESTED, 50.8838, 4.7142), 1).await;
    Mock::given(method("GET"))
        .and(path("/ajax/get-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mobiscore_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inspire/dgstatistics/service"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Service temporarily unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let err = pipeline.enrich(ADDRESS).await.unwrap_err();

    assert_eq!(err.kind(), "fetch");
}

#[tokio::test]
async fn test_location_without_formatted_address_keeps_input_text() {
    let server = MockServer::start().await;

    mount_location(
        &server,
        ADDRESS,
        json!({"LocationResult": [{"Location": {"Lat_WGS84": 50.8838, "Lon_WGS84": 4.7142}}]}),
        1,
    )
    .await;
    mount_score_and_features(&server).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server)).unwrap();
    let result = pipeline.enrich(ADDRESS).await.unwrap();

    assert_eq!(result.address, ADDRESS);
    assert_eq!(result.lat, 50.8838);
}
