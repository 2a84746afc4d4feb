//! Catalog client tests against the in-process mock catalog
//!
//! Covers the two-step search exchange, windowed sampling, envelope
//! failures and single-image fetches.

mod helpers;

use helpers::{MockCatalog, MockSettings, API_KEY, ECHO_HEADER};
use std::collections::BTreeMap;
use vtour_core::catalog::CatalogError;
use vtour_core::transport::{HttpMethod, TransportError, UNSUCCESSFUL_RESPONSE};

#[tokio::test]
async fn test_photos_near_discovers_pages_then_requests_one() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(1);

    let photos = client.photos_near(45.0, 78.0).await.unwrap();
    assert_eq!(photos.len(), 20);

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);

    let discovery = &requests[0];
    assert!(!discovery.contains_key("page"));
    assert_eq!(discovery["method"], "flickr.photos.search");
    assert_eq!(discovery["api_key"], API_KEY);
    assert_eq!(discovery["bbox"], "77,44,79,46");
    assert_eq!(discovery["format"], "json");
    assert_eq!(discovery["nojsoncallback"], "1");
    assert_eq!(discovery["extras"], "url_m");
    assert_eq!(discovery["per_page"], "250");
    assert_eq!(discovery["safe_search"], "1");

    let page: u32 = requests[1]["page"].parse().unwrap();
    assert!((1..=10).contains(&page));
}

#[tokio::test]
async fn test_album_is_a_sorted_contiguous_window() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(2);

    let photos = client.photos_near(10.0, 10.0).await.unwrap();
    let paths: Vec<&str> = photos.iter().filter_map(|p| p.path.as_deref()).collect();
    assert_eq!(paths.len(), 20);

    // Zero-padded indices sort lexically in numeric order
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    let indices: Vec<usize> = paths
        .iter()
        .map(|p| p.rsplit('-').next().unwrap().trim_end_matches(".png").parse().unwrap())
        .collect();
    assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
    assert!(indices[0] <= 230);

    for photo in &photos {
        assert_eq!((photo.width, photo.height), (Some(3), Some(2)));
        assert!(photo.title.is_some());
        assert!(photo.marker_id.is_none());
        assert!(!photo.has_image());
    }
}

#[tokio::test]
async fn test_short_page_returns_every_record() {
    let mock = MockCatalog::start(MockSettings {
        pages: 1,
        records_per_page: 5,
        ..MockSettings::default()
    })
    .await;

    let photos = mock.client(3).photos_near(0.0, 0.0).await.unwrap();
    assert_eq!(photos.len(), 5);
    assert_eq!(mock.requests()[1]["page"], "1");
}

#[tokio::test]
async fn test_zero_records_is_empty_result() {
    let mock = MockCatalog::start(MockSettings {
        pages: 1,
        records_per_page: 0,
        ..MockSettings::default()
    })
    .await;

    let err = mock.client(4).photos_near(0.0, 0.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::EmptyResult));
}

#[tokio::test]
async fn test_zero_pages_never_requests_page_zero() {
    let mock = MockCatalog::start(MockSettings {
        pages: 0,
        ..MockSettings::default()
    })
    .await;

    let err = mock.client(5).photos_near(0.0, 0.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::EmptyResult));
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn test_missing_pages_is_malformed() {
    let mock = MockCatalog::start(MockSettings {
        omit_pages: true,
        ..MockSettings::default()
    })
    .await;

    let err = mock.client(6).photos_near(0.0, 0.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_service_failure_status_is_rejected() {
    let mock = MockCatalog::start(MockSettings {
        fail_message: Some("Invalid API Key (Key has invalid format)".into()),
        ..MockSettings::default()
    })
    .await;

    match mock.client(7).photos_near(0.0, 0.0).await {
        Err(CatalogError::Rejected { message }) => assert!(message.starts_with("Invalid API Key")),
        other => panic!("unexpected: {:?}", other.map(|p| p.len())),
    }
}

#[tokio::test]
async fn test_non_2xx_is_transport_status_error() {
    let mock = MockCatalog::start(MockSettings {
        search_status: Some(503),
        ..MockSettings::default()
    })
    .await;

    match mock.client(8).photos_near(0.0, 0.0).await {
        Err(CatalogError::Transport(TransportError::Status { status, message, domain })) => {
            assert_eq!(status, 503);
            assert_eq!(message, UNSUCCESSFUL_RESPONSE);
            assert_eq!(domain, "CatalogClient");
        }
        other => panic!("unexpected: {:?}", other.map(|p| p.len())),
    }
    assert_eq!(mock.requests().len(), 1, "no retry after a failed request");
}

#[tokio::test]
async fn test_image_data_fetches_raw_bytes() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(9);

    let bytes = client.image_data(&mock.image_url("p001-000.png")).await.unwrap();
    assert_eq!(bytes, helpers::png_bytes(3, 2));

    let err = client.image_data(&mock.image_url("missing.png")).await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Transport(TransportError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(10);

    let err = client.image_data("http://127.0.0.1:1/nothing.png").await.unwrap_err();
    assert!(matches!(err, CatalogError::Transport(TransportError::Network(_))));
}

#[tokio::test]
async fn test_transport_sends_headers_and_json_body() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(11);
    let transport = client.transport();

    let mut headers = BTreeMap::new();
    headers.insert(ECHO_HEADER.to_string(), "vtour-tests".to_string());
    let body = serde_json::json!({"marker": {"latitude": 45.5, "longitude": -122.25}, "photos": [1, 2]});

    let url = reqwest::Url::parse(&mock.echo_url()).unwrap();
    let reply = transport
        .execute(url, HttpMethod::Post, Some(&headers), Some(&body))
        .await
        .unwrap();

    let echoed: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(echoed["header"], "vtour-tests");
    assert_eq!(echoed["body"], body);
}

#[tokio::test]
async fn test_post_to_get_only_route_is_status_error() {
    let mock = MockCatalog::start(MockSettings::default()).await;
    let client = mock.client(12);
    let transport = client.transport();

    let mut params = BTreeMap::new();
    params.insert("page".to_string(), "1".to_string());
    let url = transport.build_url(None, None, &params).unwrap();

    let body = serde_json::json!({"hello": "world"});
    let err = transport
        .execute(url, HttpMethod::Post, None, Some(&body))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 405, .. }));
}
