//! HTTP request handlers for the tile cache API.
//!
//! # Endpoints
//!
//! - `GET /service/tms/1.0.0/{layer@gridset@ext}/{z}/{x}/{y}.{ext}` - TMS tile
//! - `GET /service/wmts?REQUEST=GetTile&...` - WMTS KVP tile
//! - `GET /service/wms?REQUEST=GetMap&...` - tiled WMS request
//! - `GET /service/kml/...` - KML super-overlays and their tiles
//! - `POST /seed/{layer}`, `GET|DELETE /seed/jobs[/{id}]` - bulk jobs
//! - `GET /layers`, `GET /stats`, `GET /health`

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{GridError, SeedError, TileError};
use crate::grid::{BoundingBox, GridSubset, Srs, TileIndex};
use crate::layer::{MimeType, TileLayer};
use crate::seed::{JobInfo, SeedRequest, TileBreeder};
use crate::tile::{StatsSnapshot, TileRequest, TileResponse, TileService};

use super::kml;

/// Default `Cache-Control` max-age for tiles of layers without their own.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

const CACHE_RESULT_HEADER: HeaderName = HeaderName::from_static("x-cache-result");
const TILE_INDEX_HEADER: HeaderName = HeaderName::from_static("x-tile-index");
const GRIDSET_HEADER: HeaderName = HeaderName::from_static("x-gridset");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,
    pub breeder: Arc<TileBreeder>,

    /// Cache-Control max-age for layers that do not configure one
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(tile_service: Arc<TileService>, breeder: Arc<TileBreeder>) -> Self {
        Self {
            tile_service,
            breeder,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    fn layer(&self, name: &str) -> Result<Arc<TileLayer>, TileError> {
        self.tile_service.dispatcher().layer(name)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One configured layer.
#[derive(Debug, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub gridsets: Vec<GridSubsetSummary>,
    pub formats: Vec<String>,
    pub meta_factors: [u32; 2],
}

/// Where a layer is available within one gridset.
#[derive(Debug, Serialize)]
pub struct GridSubsetSummary {
    pub gridset: String,
    pub srs: String,
    pub zoom_start: usize,
    pub zoom_stop: usize,
    pub bounds: BoundingBox,
}

impl GridSubsetSummary {
    fn new(subset: &GridSubset) -> Self {
        Self {
            gridset: subset.name().to_string(),
            srs: subset.srs().to_string(),
            zoom_start: subset.zoom_start(),
            zoom_stop: subset.zoom_stop(),
            bounds: subset.original_extent(),
        }
    }
}

/// Response of a bulk cancellation.
#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub cancelled: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build the JSON error response, logging by severity.
///
/// 5xx errors are logged at ERROR, 404 at DEBUG and other 4xx at WARN.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

fn grid_error_status(err: &GridError) -> (StatusCode, &'static str) {
    if err.is_outside_coverage() {
        (StatusCode::NOT_FOUND, "outside_coverage")
    } else if err.is_mismatch() {
        (StatusCode::BAD_REQUEST, "grid_mismatch")
    } else if matches!(err, GridError::NotDoubling { .. }) {
        (StatusCode::INTERNAL_SERVER_ERROR, "grid_error")
    } else {
        (StatusCode::BAD_REQUEST, "invalid_request")
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::LayerNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TileError::GridSetNotSupported { .. } => {
                (StatusCode::BAD_REQUEST, "gridset_not_supported")
            }
            TileError::FormatNotSupported { .. } => {
                (StatusCode::BAD_REQUEST, "format_not_supported")
            }
            TileError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            TileError::Grid(err) => grid_error_status(err),
            TileError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            TileError::Source(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for SeedError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            SeedError::LayerNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            SeedError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "job_not_found"),
            SeedError::GridSetNotSupported { .. } => {
                (StatusCode::BAD_REQUEST, "gridset_not_supported")
            }
            SeedError::FormatNotSupported { .. } => {
                (StatusCode::BAD_REQUEST, "format_not_supported")
            }
            SeedError::InvalidRange { .. } => (StatusCode::BAD_REQUEST, "invalid_range"),
            SeedError::Grid(err) => grid_error_status(err),
        };
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Request Parsing
// =============================================================================

/// KVP query with upper-cased keys.
struct KvpParams(BTreeMap<String, String>);

impl KvpParams {
    fn new(query: HashMap<String, String>) -> Self {
        Self(
            query
                .into_iter()
                .map(|(key, value)| (key.to_ascii_uppercase(), value))
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, TileError> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TileError::invalid(format!("missing parameter {}", key)))
    }

    fn require_number<T: std::str::FromStr>(&self, key: &str) -> Result<T, TileError> {
        let value = self.require(key)?;
        value
            .parse()
            .map_err(|_| TileError::invalid(format!("{} is not a number: {}", key, value)))
    }

    fn expect_request(&self, service: &str, request: &str) -> Result<(), TileError> {
        if let Some(given) = self.get("SERVICE") {
            if !given.eq_ignore_ascii_case(service) {
                return Err(TileError::invalid(format!("unexpected service {}", given)));
            }
        }
        let given = self.require("REQUEST")?;
        if !given.eq_ignore_ascii_case(request) {
            return Err(TileError::invalid(format!(
                "only {} requests are supported, got {}",
                request, given
            )));
        }
        Ok(())
    }

    fn into_parameters(self) -> BTreeMap<String, String> {
        self.0
    }
}

fn parse_format(value: &str) -> Result<MimeType, TileError> {
    value.parse().map_err(TileError::invalid)
}

/// `layer@gridset@ext`, with the gridset and extension optional.
fn parse_tms_layer(spec: &str) -> (&str, Option<&str>, Option<&str>) {
    let mut parts = spec.splitn(3, '@');
    let layer = parts.next().unwrap_or_default();
    (layer, parts.next(), parts.next())
}

fn default_gridset(layer: &TileLayer) -> Result<String, TileError> {
    layer
        .gridset_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| TileError::GridSetNotSupported {
            layer: layer.name().to_string(),
            gridset: String::new(),
        })
}

fn kml_subset(layer: &TileLayer) -> Result<Arc<GridSubset>, TileError> {
    layer
        .grid_subset_for_srs(&Srs::EPSG_4326)
        .cloned()
        .ok_or_else(|| TileError::GridSetNotSupported {
            layer: layer.name().to_string(),
            gridset: Srs::EPSG_4326.to_string(),
        })
}

fn tile_response(state: &AppState, gridset: &str, index: TileIndex, tile: TileResponse) -> Response {
    let max_age = tile.max_age.unwrap_or(u64::from(state.cache_max_age));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, tile.format.to_string()),
            (header::CACHE_CONTROL, format!("public, max-age={}", max_age)),
            (CACHE_RESULT_HEADER, tile.cache_result.as_str().to_string()),
            (TILE_INDEX_HEADER, index.to_string()),
            (GRIDSET_HEADER, gridset.to_string()),
        ],
        Body::from(tile.data),
    )
        .into_response()
}

fn kml_response(doc: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, MimeType::Kml.to_string())],
        doc,
    )
        .into_response()
}

// =============================================================================
// Tile Handlers
// =============================================================================

/// TMS tile.
///
/// # Endpoint
///
/// `GET /service/tms/1.0.0/{layer@gridset@ext}/{z}/{x}/{y}.{ext}`
///
/// Rows count from the bottom of the grid. Without a gridset the layer's
/// first one is used; the format comes from the layer spec or the file name.
///
/// # Headers
///
/// - `Content-Type`: MIME type of the tile
/// - `Cache-Control: public, max-age={layer max age or default}`
/// - `X-Cache-Result: HIT|MISS|UNCACHED`
pub async fn tms_handler(
    State(state): State<AppState>,
    Path((layer_spec, z, x, file)): Path<(String, i32, i64, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, TileError> {
    let (layer_name, gridset, spec_ext) = parse_tms_layer(&layer_spec);
    let (y, file_ext) = match file.split_once('.') {
        Some((y, ext)) => (y, Some(ext)),
        None => (file.as_str(), None),
    };
    let y: i64 = y
        .parse()
        .map_err(|_| TileError::invalid(format!("invalid row: {}", y)))?;

    let layer = state.layer(layer_name)?;
    let gridset = match gridset {
        Some(gridset) => gridset.to_string(),
        None => default_gridset(&layer)?,
    };
    let format = match (spec_ext, file_ext) {
        (Some(a), Some(b)) if a != b => {
            return Err(TileError::invalid(format!(
                "format {} does not match file extension {}",
                a, b
            )))
        }
        (Some(ext), _) | (None, Some(ext)) => parse_format(ext)?,
        (None, None) => layer.default_format(),
    };

    let index = TileIndex::new(x, y, z);
    let request = TileRequest::new(layer_name, gridset.as_str(), format, index)
        .with_parameters(KvpParams::new(query).into_parameters());
    let tile = state.tile_service.get_tile(request).await?;
    Ok(tile_response(&state, &gridset, index, tile))
}

/// WMTS KVP `GetTile`.
///
/// # Endpoint
///
/// `GET /service/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER&TILEMATRIXSET&TILEMATRIX&TILEROW&TILECOL&FORMAT`
///
/// `TILEMATRIX` is a level name of the gridset and `TILEROW` counts from
/// the top of the matrix.
pub async fn wmts_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, TileError> {
    let params = KvpParams::new(query);
    params.expect_request("WMTS", "GetTile")?;

    let layer = state.layer(params.require("LAYER")?)?;
    let gridset = params.require("TILEMATRIXSET")?.to_string();
    let subset = layer
        .grid_subset(&gridset)
        .ok_or_else(|| TileError::GridSetNotSupported {
            layer: layer.name().to_string(),
            gridset: gridset.clone(),
        })?;

    let matrix = params.require("TILEMATRIX")?;
    let level = subset
        .grid_index(matrix)
        .ok_or_else(|| TileError::invalid(format!("unknown tile matrix {}", matrix)))?;
    let row: i64 = params.require_number("TILEROW")?;
    let col: i64 = params.require_number("TILECOL")?;
    let high = subset.num_tiles_high(level).unwrap_or(0) as i64;

    let format = match params.get("FORMAT") {
        Some(format) => parse_format(format)?,
        None => layer.default_format(),
    };

    let y = (high - 1)
        .checked_sub(row)
        .ok_or_else(|| TileError::invalid(format!("tile row {} is out of range", row)))?;
    let index = TileIndex::new(col, y, level as i32);
    let request = TileRequest::new(layer.name(), gridset.as_str(), format, index)
        .with_parameters(params.into_parameters());
    let tile = state.tile_service.get_tile(request).await?;
    Ok(tile_response(&state, &gridset, index, tile))
}

/// Tiled WMS `GetMap`.
///
/// # Endpoint
///
/// `GET /service/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS&SRS&BBOX&WIDTH&HEIGHT&FORMAT`
///
/// Only requests matching exactly one tile of a gridset in the requested
/// SRS are served; anything else is a 400.
pub async fn wms_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, TileError> {
    let params = KvpParams::new(query);
    params.expect_request("WMS", "GetMap")?;

    let layer = state.layer(params.require("LAYERS")?)?;
    let srs: Srs = match params.get("SRS") {
        Some(srs) => srs.parse()?,
        None => params.require("CRS")?.parse()?,
    };
    let subset = layer
        .grid_subset_for_srs(&srs)
        .cloned()
        .ok_or_else(|| TileError::GridSetNotSupported {
            layer: layer.name().to_string(),
            gridset: srs.to_string(),
        })?;

    let bounds: BoundingBox = params.require("BBOX")?.parse()?;
    let width: u32 = params.require_number("WIDTH")?;
    let height: u32 = params.require_number("HEIGHT")?;
    subset.check_tile_dimensions(width, height)?;

    let format = match params.get("FORMAT") {
        Some(format) => parse_format(format)?,
        None => layer.default_format(),
    };

    let index = subset.closest_index(&bounds)?;

    let request = TileRequest::new(layer.name(), subset.name(), format, index)
        .with_parameters(params.into_parameters());
    let tile = state.tile_service.get_tile(request).await?;
    Ok(tile_response(&state, subset.name(), index, tile))
}

/// KML root super-overlay.
///
/// # Endpoint
///
/// `GET /service/kml/{layer}.{ext}.kml`
pub async fn kml_root_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, TileError> {
    let (layer_name, ext) = file
        .strip_suffix(".kml")
        .and_then(|stem| stem.rsplit_once('.'))
        .ok_or_else(|| TileError::invalid(format!("expected {{layer}}.{{ext}}.kml, got {}", file)))?;

    let layer = state.layer(layer_name)?;
    let format = parse_format(ext)?;
    if !layer.supports_format(format) {
        return Err(TileError::FormatNotSupported {
            layer: layer.name().to_string(),
            format: format.to_string(),
        });
    }
    let subset = kml_subset(&layer)?;
    Ok(kml_response(kml::super_overlay(&layer, &subset, format)?))
}

/// KML overlay or tile content below the root.
///
/// # Endpoint
///
/// - `GET /service/kml/{layer}/x{X}y{Y}z{Z}.{ext}.kml` - overlay document
/// - `GET /service/kml/{layer}/x{X}y{Y}z{Z}.{ext}` - tile content in EPSG:4326
pub async fn kml_tile_handler(
    State(state): State<AppState>,
    Path((layer_name, file)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, TileError> {
    let invalid = || TileError::invalid(format!("expected x{{X}}y{{Y}}z{{Z}}.{{ext}}[.kml], got {}", file));

    let (location, ext, is_overlay) = match file.strip_suffix(".kml") {
        Some(stem) => match stem.split_once('.') {
            Some((location, ext)) => (location, ext, true),
            // vector content is itself KML
            None => (stem, "kml", false),
        },
        None => {
            let (location, ext) = file.split_once('.').ok_or_else(invalid)?;
            (location, ext, false)
        }
    };
    let index = kml::parse_grid_location(location).ok_or_else(invalid)?;
    let format = parse_format(ext)?;

    let layer = state.layer(&layer_name)?;
    let subset = kml_subset(&layer)?;

    if is_overlay {
        if !layer.supports_format(format) {
            return Err(TileError::FormatNotSupported {
                layer: layer.name().to_string(),
                format: format.to_string(),
            });
        }
        subset.check_coverage(index)?;
        return Ok(kml_response(kml::overlay(&layer, &subset, index, format)?));
    }

    let request = TileRequest::new(layer.name(), subset.name(), format, index)
        .with_parameters(KvpParams::new(query).into_parameters());
    let tile = state.tile_service.get_tile(request).await?;
    Ok(tile_response(&state, subset.name(), index, tile))
}

// =============================================================================
// Seed Handlers
// =============================================================================

/// Start a seed, reseed or truncate job.
///
/// # Endpoint
///
/// `POST /seed/{layer}` with a JSON [`SeedRequest`] body; the layer in the
/// path wins over one in the body.
///
/// # Response
///
/// `202 Accepted` with the new job.
pub async fn seed_handler(
    State(state): State<AppState>,
    Path(layer): Path<String>,
    Json(mut request): Json<SeedRequest>,
) -> Result<(StatusCode, Json<JobInfo>), SeedError> {
    request.layer = layer;
    let job = state.breeder.dispatch(request)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// `GET /seed/jobs`
pub async fn jobs_handler(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.breeder.jobs())
}

/// `GET /seed/jobs/{id}`
pub async fn job_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<JobInfo>, SeedError> {
    Ok(Json(state.breeder.job(id)?))
}

/// `DELETE /seed/jobs/{id}`
pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<JobInfo>, SeedError> {
    Ok(Json(state.breeder.cancel(id)?))
}

/// `DELETE /seed/jobs`
pub async fn terminate_jobs_handler(State(state): State<AppState>) -> Json<TerminateResponse> {
    Json(TerminateResponse {
        cancelled: state.breeder.terminate_all(),
    })
}

// =============================================================================
// Info Handlers
// =============================================================================

/// `GET /layers`
pub async fn layers_handler(State(state): State<AppState>) -> Json<Vec<LayerSummary>> {
    let layers = state
        .tile_service
        .dispatcher()
        .layers()
        .iter()
        .map(|layer| LayerSummary {
            name: layer.name().to_string(),
            gridsets: layer
                .grid_subsets()
                .map(|subset| GridSubsetSummary::new(subset))
                .collect(),
            formats: layer.formats().iter().map(|f| f.to_string()).collect(),
            meta_factors: layer.meta_factors(),
        })
        .collect();
    Json(layers)
}

/// `GET /stats`
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.tile_service.stats().snapshot())
}

/// `GET /health`
///
/// ```json
/// { "status": "healthy", "version": "0.1.0" }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, StorageError};
    use crate::grid::CoverageRect;

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::new("test_error", "Test message");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
        assert!(json.contains("Test message"));
        assert!(!json.contains("status"));

        let response =
            ErrorResponse::with_status("not_found", "Layer not found", StatusCode::NOT_FOUND);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("404"));
    }

    #[test]
    fn test_tile_error_to_status_code() {
        let cases = [
            (
                TileError::LayerNotFound {
                    layer: "roads".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                TileError::GridSetNotSupported {
                    layer: "states".into(),
                    gridset: "EPSG:2163".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                TileError::FormatNotSupported {
                    layer: "states".into(),
                    format: "image/gif".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (TileError::invalid("bad"), StatusCode::BAD_REQUEST),
            (
                TileError::Grid(GridError::OutsideCoverage {
                    x: 5,
                    y: 5,
                    level: 1,
                    coverage: CoverageRect::new(0, 0, 3, 1, 1),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                TileError::Grid(GridError::LevelOutOfRange {
                    level: 30,
                    zoom_start: 0,
                    zoom_stop: 21,
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                TileError::Grid(GridError::ResolutionMismatch {
                    requested: 0.3,
                    closest: 0.35,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                TileError::Grid(GridError::InvalidSrs("EPSG:abc".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                TileError::Storage(StorageError::Io("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                TileError::Source(SourceError::Status {
                    status: 500,
                    url: "http://localhost/wms".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            assert_eq!(err.into_response().status(), expected, "{}", message);
        }
    }

    #[test]
    fn test_seed_error_to_status_code() {
        assert_eq!(
            SeedError::JobNotFound { id: 3 }.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SeedError::InvalidRange {
                reason: "empty".into()
            }
            .into_response()
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SeedError::LayerNotFound {
                layer: "roads".into()
            }
            .into_response()
            .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }

    // -------------------------------------------------------------------------
    // Parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_tms_layer() {
        assert_eq!(
            parse_tms_layer("states@EPSG:4326@png"),
            ("states", Some("EPSG:4326"), Some("png"))
        );
        assert_eq!(
            parse_tms_layer("states@EPSG:900913"),
            ("states", Some("EPSG:900913"), None)
        );
        assert_eq!(parse_tms_layer("states"), ("states", None, None));
    }

    #[test]
    fn test_kvp_params_are_case_insensitive() {
        let query: HashMap<String, String> = [
            ("service", "WMTS"),
            ("Request", "GetTile"),
            ("layer", "states"),
            ("TileRow", "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let params = KvpParams::new(query);

        assert!(params.expect_request("WMTS", "GetTile").is_ok());
        assert!(params.expect_request("WMTS", "GetCapabilities").is_err());
        assert!(params.expect_request("WMS", "GetTile").is_err());
        assert_eq!(params.require("LAYER").unwrap(), "states");
        assert_eq!(params.require_number::<i64>("TILEROW").unwrap(), 3);
        assert!(params.require("TILECOL").is_err());
        assert!(params.require_number::<i64>("LAYER").is_err());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("image/png").unwrap(), MimeType::Png);
        assert_eq!(parse_format("jpeg").unwrap(), MimeType::Jpeg);
        assert!(matches!(
            parse_format("image/tiff"),
            Err(TileError::InvalidRequest { .. })
        ));
    }
}
