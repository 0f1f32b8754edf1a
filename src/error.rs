use thiserror::Error;

use crate::grid::CoverageRect;

/// Errors raised while converting between coordinates and tile indices.
///
/// All variants are terminal: a conversion is a pure function of its inputs,
/// so retrying the same request cannot succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// The requested level is outside the configured zoom range
    #[error("Zoom level {level} is outside the valid range {zoom_start}-{zoom_stop}")]
    LevelOutOfRange {
        level: i64,
        zoom_start: usize,
        zoom_stop: usize,
    },

    /// The tile index is outside the coverage of its level
    #[error("Tile ({x}, {y}) at level {level} is outside the coverage {coverage}")]
    OutsideCoverage {
        x: i64,
        y: i64,
        level: usize,
        coverage: CoverageRect,
    },

    /// No level resolution is close enough to the requested one
    #[error("Requested resolution {requested} does not match any level (closest is {closest})")]
    ResolutionMismatch { requested: f64, closest: f64 },

    /// The bounding box does not line up with the tile grid at the chosen level
    #[error(
        "Bounding box is not aligned to the grid: x offset {x} (closest {pos_x}), \
         y offset {y} (closest {pos_y})"
    )]
    AlignmentMismatch {
        x: f64,
        pos_x: i64,
        y: f64,
        pos_y: i64,
    },

    /// Consecutive levels do not halve the resolution
    #[error("Resolution of gridset {gridset} does not halve between level {level} and the next")]
    NotDoubling { gridset: String, level: usize },

    /// Requested tile size differs from the gridset tile size
    #[error("Tile size {width}x{height} does not match the gridset tile size {expected_width}x{expected_height}")]
    TileSizeMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Bounding box text could not be parsed
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// SRS identifier could not be parsed
    #[error("Invalid SRS: {0}")]
    InvalidSrs(String),
}

impl GridError {
    /// Whether this error means the request does not resolve to a tile of the grid.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            GridError::ResolutionMismatch { .. } | GridError::AlignmentMismatch { .. }
        )
    }

    /// Whether this error means the request lies outside the configured coverage.
    pub fn is_outside_coverage(&self) -> bool {
        matches!(
            self,
            GridError::LevelOutOfRange { .. } | GridError::OutsideCoverage { .. }
        )
    }
}

/// Configuration errors, raised once while gridsets and layers are loaded.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A gridset with the same name is already registered
    #[error("Gridset already exists: {0}")]
    DuplicateGridSet(String),

    /// A layer references a gridset that is not registered
    #[error("Unknown gridset: {0}")]
    UnknownGridSet(String),

    /// Gridset definition is inconsistent
    #[error("Invalid gridset {name}: {reason}")]
    InvalidGridSet { name: String, reason: String },

    /// Layer definition is inconsistent
    #[error("Invalid layer {name}: {reason}")]
    InvalidLayer { name: String, reason: String },

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the tile blob store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Filesystem or backend I/O failure
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Key cannot be mapped to a storage location
    #[error("Invalid tile key: {0}")]
    InvalidKey(String),
}

/// Errors from the upstream tile renderer.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Transport failure talking to the upstream server
    #[error("Upstream request failed: {0}")]
    Http(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Upstream answered with something other than an image
    #[error("Upstream returned unexpected content type {content_type}")]
    UnexpectedContent { content_type: String },
}

/// Errors on the tile request path.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Layer name is not configured
    #[error("Layer not found: {layer}")]
    LayerNotFound { layer: String },

    /// Layer has no subset for the requested gridset
    #[error("Layer {layer} does not support gridset {gridset}")]
    GridSetNotSupported { layer: String, gridset: String },

    /// Layer does not offer the requested format
    #[error("Layer {layer} does not support format {format}")]
    FormatNotSupported { layer: String, format: String },

    /// Request parameters are malformed
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Addressing failure
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Upstream rendering failure
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl TileError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TileError::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Errors from the seed/truncate engine.
#[derive(Debug, Clone, Error)]
pub enum SeedError {
    /// Layer name is not configured
    #[error("Layer not found: {layer}")]
    LayerNotFound { layer: String },

    /// Layer has no subset for the requested gridset
    #[error("Layer {layer} does not support gridset {gridset}")]
    GridSetNotSupported { layer: String, gridset: String },

    /// Layer does not offer the requested format
    #[error("Layer {layer} does not support format {format}")]
    FormatNotSupported { layer: String, format: String },

    /// Seed request parameters are inconsistent
    #[error("Invalid seed range: {reason}")]
    InvalidRange { reason: String },

    /// Job id is unknown
    #[error("Seed job not found: {id}")]
    JobNotFound { id: u64 },

    /// Addressing failure while building the range
    #[error(transparent)]
    Grid(#[from] GridError),
}
