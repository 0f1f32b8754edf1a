//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        TMS · WMTS · WMS · KML · /seed · /stats · /health        │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │     kml     │  │        routes           │  │
//! │  │ (requests)  │  │ (documents) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod kml;
pub mod routes;

pub use handlers::{
    health_handler, AppState, ErrorResponse, GridSubsetSummary, HealthResponse, LayerSummary,
    TerminateResponse, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
