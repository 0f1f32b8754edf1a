//! Router configuration for the tile cache.
//!
//! # Route Structure
//!
//! ```text
//! /health                                              - Health check
//! /stats                                               - Request counters
//! /layers                                              - Configured layers
//! /service/tms/1.0.0/{layer@gridset@ext}/{z}/{x}/{y}   - TMS tiles
//! /service/wmts                                        - WMTS GetTile (KVP)
//! /service/wms                                         - Tiled WMS GetMap
//! /service/kml/{layer}.{ext}.kml                       - KML super-overlay
//! /service/kml/{layer}/{x..y..z..}.{ext}[.kml]         - KML overlays and tiles
//! /seed/{layer}                                        - Start a bulk job (POST)
//! /seed/jobs[/{id}]                                    - List or cancel jobs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use geotile_cache::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(tile_service, breeder);
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_job_handler, health_handler, job_handler, jobs_handler, kml_root_handler,
    kml_tile_handler, layers_handler, seed_handler, stats_handler, terminate_jobs_handler,
    tms_handler, wms_handler, wmts_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for layers without their own
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Any CORS origin, one hour max-age, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// The router's `cache_max_age` overrides the one already set on `state`.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let state = state.with_cache_max_age(config.cache_max_age);
    let cors = build_cors_layer(&config);

    let service_routes = Router::new()
        .route(
            "/tms/1.0.0/{layer}/{z}/{x}/{file}",
            get(tms_handler),
        )
        .route("/wmts", get(wmts_handler))
        .route("/wms", get(wms_handler))
        .route("/kml/{file}", get(kml_root_handler))
        .route("/kml/{layer}/{file}", get(kml_tile_handler));

    let seed_routes = Router::new()
        .route("/jobs", get(jobs_handler).delete(terminate_jobs_handler))
        .route("/jobs/{id}", get(job_handler).delete(cancel_job_handler))
        .route("/{layer}", post(seed_handler));

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/layers", get(layers_handler))
        .nest("/service", service_routes)
        .nest("/seed", seed_routes)
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
