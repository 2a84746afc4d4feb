//! Test helpers: an in-process image catalog and service builders
//!
//! The mock answers the search endpoint the way the real service does
//! (page count without `page`, a page of records with it) and serves small
//! PNG images for every record URL.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vtour_common::config::CatalogConfig;
use vtour_core::catalog::CatalogClient;
use vtour_core::transport::Transport;
use vtour_core::{Store, TourService};

pub const API_KEY: &str = "test-key";

/// How the mock catalog behaves
#[derive(Debug, Clone)]
pub struct MockSettings {
    pub pages: u32,
    /// Records returned for any page
    pub records_per_page: usize,
    /// Delay before answering a request that names a page
    pub page_delay: Duration,
    /// Delay before answering an image request
    pub image_delay: Duration,
    /// Non-2xx status for every search request
    pub search_status: Option<u16>,
    /// Reply `{"stat": "fail", "message": ...}` to searches
    pub fail_message: Option<String>,
    /// Omit the `pages` field from the envelope
    pub omit_pages: bool,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            pages: 10,
            records_per_page: 250,
            page_delay: Duration::ZERO,
            image_delay: Duration::ZERO,
            search_status: None,
            fail_message: None,
            omit_pages: false,
        }
    }
}

struct MockState {
    settings: MockSettings,
    base_url: String,
    requests: Mutex<Vec<HashMap<String, String>>>,
    image_requests: Mutex<Vec<String>>,
}

/// Running mock catalog
pub struct MockCatalog {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockCatalog {
    pub async fn start(settings: MockSettings) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            settings,
            base_url: format!("http://{}", addr),
            requests: Mutex::new(Vec::new()),
            image_requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/services/rest", get(search))
            .route("/images/:name", get(image))
            .route("/echo", post(echo))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> CatalogConfig {
        CatalogConfig {
            scheme: "http".to_string(),
            host: self.addr.to_string(),
            request_timeout_secs: 5,
            ..CatalogConfig::default()
        }
    }

    pub fn echo_url(&self) -> String {
        format!("{}/echo", self.state.base_url)
    }

    pub fn image_url(&self, name: &str) -> String {
        format!("{}/images/{}", self.state.base_url, name)
    }

    /// Query parameters of every search request received so far
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn image_requests(&self) -> Vec<String> {
        self.state.image_requests.lock().unwrap().clone()
    }

    pub fn client(&self, seed: u64) -> CatalogClient {
        let config = self.config();
        let transport = Transport::from_config(&config).unwrap();
        CatalogClient::with_rng(
            Arc::new(transport),
            config,
            Some(API_KEY.to_string()),
            StdRng::seed_from_u64(seed),
        )
    }

    /// Service over an in-memory store talking to this catalog
    pub async fn service(&self) -> TourService {
        let store = Store::open_in_memory().await.unwrap();
        TourService::new(store, self.client(17))
    }
}

async fn search(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.requests.lock().unwrap().push(params.clone());
    let settings = &state.settings;

    if let Some(status) = settings.search_status {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    if let Some(message) = &settings.fail_message {
        return Json(json!({"stat": "fail", "code": 100, "message": message})).into_response();
    }

    let page: u32 = match params.get("page") {
        Some(page) => {
            tokio::time::sleep(settings.page_delay).await;
            page.parse().unwrap()
        }
        None => 1,
    };

    let photo: Vec<_> = (0..settings.records_per_page)
        .map(|i| {
            json!({
                "id": format!("{}-{}", page, i),
                "title": format!("Photo {} on page {}", i, page),
                "url_m": format!("{}/images/p{:03}-{:03}.png", state.base_url, page, i),
                "height_m": "2",
                "width_m": 3,
            })
        })
        .collect();

    let mut photos = json!({
        "page": page,
        "perpage": 250,
        "total": (settings.pages as usize * settings.records_per_page).to_string(),
        "photo": photo,
    });
    if !settings.omit_pages {
        photos["pages"] = json!(settings.pages);
    }

    Json(json!({"stat": "ok", "photos": photos})).into_response()
}

async fn image(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    state.image_requests.lock().unwrap().push(name.clone());
    tokio::time::sleep(state.settings.image_delay).await;

    if name.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], png_bytes(3, 2)).into_response()
}

/// Header echoed back by the `/echo` route
pub const ECHO_HEADER: &str = "x-vtour-client";

/// Reply with the `ECHO_HEADER` value and the JSON body as received
async fn echo(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let header = headers
        .get(ECHO_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({"header": header, "body": body}))
}

/// A tiny solid PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 120, 200])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}
