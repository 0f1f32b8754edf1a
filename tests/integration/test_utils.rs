//! Test utilities for integration tests.
//!
//! This module provides a mock upstream renderer and helpers building a
//! complete router around it.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use geotile_cache::error::SourceError;
use geotile_cache::grid::{DefaultGridsets, GridSetBroker, GridSubset};
use geotile_cache::layer::{
    MimeType, ParameterFilter, RenderRequest, TileLayer, TileLayerDispatcher, TileSource,
};
use geotile_cache::seed::{BreederConfig, TileBreeder};
use geotile_cache::server::{create_router, AppState, RouterConfig};
use geotile_cache::storage::MemoryBlobStore;
use geotile_cache::tile::TileService;

// =============================================================================
// Mock Tile Source
// =============================================================================

/// A source answering every request with a description of the request.
///
/// The body is `{layer} {srs} {bounds} {width}x{height}`, which lets tests
/// check which area was rendered without decoding an image.
#[derive(Default)]
pub struct MockTileSource {
    requests: Mutex<Vec<RenderRequest>>,
    render_count: AtomicUsize,
    failing: bool,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose upstream is unreachable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn render_count(&self) -> usize {
        self.render_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes, SourceError> {
        if self.failing {
            return Err(SourceError::Http("connection refused".to_string()));
        }
        self.render_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        Ok(Bytes::from(format!(
            "{} {} {} {}x{}",
            request.layer, request.srs, request.bounds, request.width, request.height
        )))
    }
}

// =============================================================================
// Application Fixture
// =============================================================================

/// Router plus handles on its shared components.
pub struct TestApp {
    pub router: Router,
    pub source: Arc<MockTileSource>,
    pub store: Arc<MemoryBlobStore>,
    pub breeder: Arc<TileBreeder>,
}

/// Layer `states` in both world gridsets at levels 0-5, PNG and JPEG, with
/// a `STYLES` filter.
pub fn states_layer(broker: &GridSetBroker, source: Arc<MockTileSource>) -> TileLayer {
    TileLayer::new("states", source)
        .with_subset(
            GridSubset::new(broker.world_epsg4326(), None, Some(0), Some(5), None, None).unwrap(),
        )
        .with_subset(
            GridSubset::new(broker.world_epsg3857(), None, Some(0), Some(5), None, None).unwrap(),
        )
        .with_formats(vec![MimeType::Png, MimeType::Jpeg])
        .with_meta_factors([2, 2])
        .with_parameter_filters(vec![ParameterFilter {
            key: "STYLES".to_string(),
            default: String::new(),
            values: vec![String::new(), "pophatch".to_string()],
        }])
}

pub fn test_app() -> TestApp {
    test_app_with(MockTileSource::new(), |layer| layer)
}

/// Build an app around `source`, letting the caller adjust the layer.
pub fn test_app_with(
    source: MockTileSource,
    configure: impl FnOnce(TileLayer) -> TileLayer,
) -> TestApp {
    let broker = GridSetBroker::new(DefaultGridsets::default()).unwrap();
    let source = Arc::new(source);
    let dispatcher = TileLayerDispatcher::new();
    dispatcher
        .add(configure(states_layer(&broker, source.clone())))
        .unwrap();

    let store = Arc::new(MemoryBlobStore::new());
    let service = Arc::new(TileService::new(Arc::new(dispatcher), store.clone()));
    let breeder = Arc::new(TileBreeder::new(service.clone(), BreederConfig::default()));
    let router = create_router(
        AppState::new(service, breeder.clone()),
        RouterConfig::new().with_tracing(false),
    );

    TestApp {
        router,
        source,
        store,
        breeder,
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

pub async fn send(router: &Router, method: &str, uri: &str, json: Option<&str>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match json {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
}
