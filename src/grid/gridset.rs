//! Tile pyramids.
//!
//! A [`GridSet`] is an ordered sequence of [`Grid`] levels over one SRS and
//! one reference extent, coarsest first. It converts between coordinates and
//! tile indices at every level.
//!
//! # Index Convention
//!
//! Columns are counted from the left edge of the extent and rows from the
//! bottom, whatever corner the matrix is anchored to:
//!
//! ```text
//!   TopLeft origin *--------+--------+        BottomLeft
//!                  | (0,1)  | (1,1)  |
//!                  +--------+--------+
//!                  | (0,0)  | (1,0)  |
//!                  +--------+--------* origin at bottom-left corner
//! ```
//!
//! With a top-left origin the matrix grows downwards, so a level whose
//! matrix is taller than the extent ends lower than the extent does. The
//! bounds of a given `(x, y, z)` are identical for both anchors whenever the
//! extent is an exact multiple of the tile span.
//!
//! Instances are built by [`GridSetFactory`](super::GridSetFactory) and are
//! immutable afterwards; share them with `Arc`.

use crate::error::GridError;

use super::bbox::BoundingBox;
use super::index::{CoverageRect, TileIndex};
use super::srs::Srs;

/// Maximum relative error between a requested and a matched resolution.
const RESOLUTION_MATCH_TOLERANCE: f64 = 0.1;

/// Maximum distance, in tiles, between a box corner and a grid corner.
const ALIGNMENT_TOLERANCE: f64 = 0.1;

/// Slack allowed when matching an observed resolution against the level list.
const RESOLUTION_SLACK: f64 = 0.005;

// =============================================================================
// Grid
// =============================================================================

/// One level of a pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Map units per pixel
    pub resolution: f64,

    /// Scale denominator at the gridset pixel size
    pub scale_denominator: f64,

    /// Number of tile columns
    pub tiles_wide: u64,

    /// Number of tile rows
    pub tiles_high: u64,

    /// Level identifier used on the wire (WMTS TileMatrix)
    pub name: String,
}

// =============================================================================
// Tile Origin
// =============================================================================

/// Corner of the extent that anchors the tile matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileOrigin {
    #[default]
    BottomLeft,
    TopLeft,
}

// =============================================================================
// GridSet
// =============================================================================

/// Named pyramid of grids over one SRS.
#[derive(Debug, Clone)]
pub struct GridSet {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) srs: Srs,
    pub(crate) tile_width: u32,
    pub(crate) tile_height: u32,
    pub(crate) origin: TileOrigin,
    /// Coordinates of the anchor corner
    pub(crate) tile_origin: [f64; 2],
    /// Reference extent, expanded to the level-0 tile matrix
    pub(crate) extent: BoundingBox,
    /// Extent as configured
    pub(crate) original_extent: BoundingBox,
    pub(crate) grids: Vec<Grid>,
    pub(crate) meters_per_unit: f64,
    pub(crate) pixel_size: f64,
    pub(crate) resolutions_preserved: bool,
    pub(crate) y_coordinate_first: bool,
    pub(crate) scale_warning: bool,
}

impl GridSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn srs(&self) -> &Srs {
        &self.srs
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn origin(&self) -> TileOrigin {
        self.origin
    }

    pub fn is_top_left_aligned(&self) -> bool {
        self.origin == TileOrigin::TopLeft
    }

    /// Coordinates of the corner the matrix is anchored to.
    pub fn tile_origin(&self) -> [f64; 2] {
        self.tile_origin
    }

    /// Reference extent, grown so the level-0 matrix tiles it exactly.
    pub fn bounds(&self) -> BoundingBox {
        self.extent
    }

    pub fn original_extent(&self) -> BoundingBox {
        self.original_extent
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    pub fn grid(&self, level: usize) -> Option<&Grid> {
        self.grids.get(level)
    }

    pub fn num_levels(&self) -> usize {
        self.grids.len()
    }

    pub fn meters_per_unit(&self) -> f64 {
        self.meters_per_unit
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Whether resolutions were configured directly rather than derived.
    pub fn resolutions_preserved(&self) -> bool {
        self.resolutions_preserved
    }

    /// Whether axis order is latitude first in published corner coordinates.
    pub fn y_coordinate_first(&self) -> bool {
        self.y_coordinate_first
    }

    /// Whether scale denominators rest on an assumed meters-per-unit.
    pub fn scale_warning(&self) -> bool {
        self.scale_warning
    }

    pub fn dots_per_inch(&self) -> f64 {
        0.0254 / self.pixel_size
    }

    pub fn resolutions(&self) -> Vec<f64> {
        self.grids.iter().map(|g| g.resolution).collect()
    }

    pub fn scale_denominators(&self) -> Vec<f64> {
        self.grids.iter().map(|g| g.scale_denominator).collect()
    }

    fn level_grid(&self, level: i64) -> Result<&Grid, GridError> {
        usize::try_from(level)
            .ok()
            .and_then(|l| self.grids.get(l))
            .ok_or(GridError::LevelOutOfRange {
                level,
                zoom_start: 0,
                zoom_stop: self.grids.len().saturating_sub(1),
            })
    }

    /// Map-unit span of one tile at `grid`.
    fn tile_span(&self, grid: &Grid) -> (f64, f64) {
        (
            grid.resolution * self.tile_width as f64,
            grid.resolution * self.tile_height as f64,
        )
    }

    /// Row offset, relative to the origin corner, of bottom-counted row `y`.
    fn origin_row(&self, grid: &Grid, y: i64) -> i64 {
        match self.origin {
            TileOrigin::BottomLeft => y,
            TileOrigin::TopLeft => y - grid.tiles_high as i64,
        }
    }

    /// Bottom-counted row of a row offset relative to the origin corner.
    fn bottom_row(&self, grid: &Grid, offset: i64) -> i64 {
        match self.origin {
            TileOrigin::BottomLeft => offset,
            TileOrigin::TopLeft => offset + grid.tiles_high as i64,
        }
    }

    // -------------------------------------------------------------------------
    // Index to coordinates
    // -------------------------------------------------------------------------

    /// Bounds of the tile at `index`.
    pub fn bounds_from_index(&self, index: TileIndex) -> Result<BoundingBox, GridError> {
        let grid = self.level_grid(index.z as i64)?;
        let (width, height) = self.tile_span(grid);
        let row = self.origin_row(grid, index.y);

        Ok(BoundingBox::new(
            self.tile_origin[0] + width * index.x as f64,
            self.tile_origin[1] + height * row as f64,
            self.tile_origin[0] + width * (index.x + 1) as f64,
            self.tile_origin[1] + height * (row + 1) as f64,
        ))
    }

    /// Bounds of an inclusive rectangle of tiles.
    pub fn bounds_from_rectangle(&self, rect: &CoverageRect) -> Result<BoundingBox, GridError> {
        let grid = self.level_grid(rect.level as i64)?;
        let (width, height) = self.tile_span(grid);
        let bottom = self.origin_row(grid, rect.min_y);
        let top = self.origin_row(grid, rect.max_y);

        Ok(BoundingBox::new(
            self.tile_origin[0] + width * rect.min_x as f64,
            self.tile_origin[1] + height * bottom as f64,
            self.tile_origin[0] + width * (rect.max_x + 1) as f64,
            self.tile_origin[1] + height * (top + 1) as f64,
        ))
    }

    // -------------------------------------------------------------------------
    // Coordinates to index
    // -------------------------------------------------------------------------

    /// Index of the tile whose bounds are `tile_bounds`.
    ///
    /// The level is found by a linear scan that stops as soon as the
    /// resolution error grows, so levels must be ordered coarsest first.
    pub fn closest_index(&self, tile_bounds: &BoundingBox) -> Result<TileIndex, GridError> {
        let requested = tile_bounds.width() / self.tile_width as f64;

        let mut best_error = f64::MAX;
        let mut best_level = 0;
        let mut best_resolution = -1.0;

        for (level, grid) in self.grids.iter().enumerate() {
            let error = (requested - grid.resolution).abs();
            if error < best_error {
                best_error = error;
                best_resolution = grid.resolution;
                best_level = level;
            } else {
                break;
            }
        }

        if (requested - best_resolution).abs() > RESOLUTION_MATCH_TOLERANCE * requested {
            return Err(GridError::ResolutionMismatch {
                requested,
                closest: best_resolution,
            });
        }

        self.closest_index_at_level(best_level, tile_bounds)
    }

    /// Index of the tile at `level` whose minimum corner matches `tile_bounds`.
    pub fn closest_index_at_level(
        &self,
        level: usize,
        tile_bounds: &BoundingBox,
    ) -> Result<TileIndex, GridError> {
        let grid = self.level_grid(level as i64)?;
        let (width, height) = self.tile_span(grid);

        let x = (tile_bounds.min_x - self.tile_origin[0]) / width;
        let y = (tile_bounds.min_y - self.tile_origin[1]) / height;

        let pos_x = x.round() as i64;
        let pos_y = y.round() as i64;

        if (x - pos_x as f64).abs() > ALIGNMENT_TOLERANCE
            || (y - pos_y as f64).abs() > ALIGNMENT_TOLERANCE
        {
            return Err(GridError::AlignmentMismatch { x, pos_x, y, pos_y });
        }

        Ok(TileIndex::new(
            pos_x,
            self.bottom_row(grid, pos_y),
            level as i32,
        ))
    }

    /// Smallest rectangle of tiles covering `bounds`, at the level where the
    /// box spans the closest to a whole number of tiles.
    pub fn closest_rectangle(&self, bounds: &BoundingBox) -> CoverageRect {
        let mut best_error = f64::MAX;
        let mut best_level = 0;

        for (level, grid) in self.grids.iter().enumerate() {
            let (width, height) = self.tile_span(grid);
            let count_x = bounds.width() / width;
            let count_y = bounds.height() / height;
            let error = (count_x - count_x.round()).abs() + (count_y - count_y.round()).abs();

            if error < best_error {
                best_error = error;
                best_level = level;
            } else {
                break;
            }
        }

        self.closest_rectangle_at_level(best_level, bounds)
    }

    /// Smallest rectangle of tiles at `level` covering `bounds`.
    ///
    /// The result is not clipped to the matrix and may be empty for a box of
    /// zero width. Callers intersect it with a coverage.
    pub fn closest_rectangle_at_level(&self, level: usize, bounds: &BoundingBox) -> CoverageRect {
        let Some(grid) = self.grids.get(level) else {
            return CoverageRect::new(0, 0, -1, -1, level);
        };
        let (width, height) = self.tile_span(grid);

        let min_x = ((bounds.min_x - self.tile_origin[0]) / width).floor() as i64;
        let min_y = ((bounds.min_y - self.tile_origin[1]) / height).floor() as i64;
        let max_x = ((bounds.max_x - self.tile_origin[0]) / width).ceil() as i64;
        let max_y = ((bounds.max_y - self.tile_origin[1]) / height).ceil() as i64;

        CoverageRect::new(
            min_x,
            self.bottom_row(grid, min_y),
            max_x - 1,
            self.bottom_row(grid, max_y) - 1,
            level,
        )
    }

    /// Full tile matrix of `level`.
    pub fn full_rectangle(&self, level: usize) -> Option<CoverageRect> {
        self.grids.get(level).map(|grid| {
            CoverageRect::new(
                0,
                0,
                grid.tiles_wide as i64 - 1,
                grid.tiles_high as i64 - 1,
                level,
            )
        })
    }

    /// Level whose resolution is nearest to `resolution` without being coarser.
    ///
    /// A level up to 0.5% coarser still matches. Equal distances favour the
    /// finer level. Returns `None` when every level is coarser.
    pub fn level_for_resolution(&self, resolution: f64) -> Option<usize> {
        self.level_for_resolution_in(resolution, 0, self.grids.len().saturating_sub(1))
    }

    pub(crate) fn level_for_resolution_in(
        &self,
        resolution: f64,
        first: usize,
        last: usize,
    ) -> Option<usize> {
        let limit = resolution * (1.0 + RESOLUTION_SLACK);
        let mut best: Option<(usize, f64)> = None;

        for (level, grid) in self.grids.iter().enumerate() {
            if level < first || level > last || grid.resolution > limit {
                continue;
            }
            let distance = (grid.resolution - resolution).abs();
            match best {
                Some((_, best_distance)) if distance > best_distance => {}
                _ => best = Some((level, distance)),
            }
        }

        best.map(|(level, _)| level)
    }

    /// Top-left corner of `level` in the axis order of the SRS.
    ///
    /// Values within 0.5% of an integer are rounded.
    pub fn ordered_top_left_corner(&self, level: usize) -> Option<[f64; 2]> {
        let grid = self.grids.get(level)?;

        let (left, top) = match self.origin {
            TileOrigin::TopLeft => (self.tile_origin[0], self.tile_origin[1]),
            TileOrigin::BottomLeft => {
                let mut top = self.tile_origin[1]
                    + self.tile_height as f64 * grid.resolution * grid.tiles_high as f64;
                if (top - top.round()).abs() < top.abs() / 200.0 {
                    top = top.round();
                }
                (self.tile_origin[0], top)
            }
        };

        if self.y_coordinate_first {
            Some([top, left])
        } else {
            Some([left, top])
        }
    }

    /// Human name of the map unit, guessed from meters per unit.
    pub fn guess_map_units(&self) -> &'static str {
        let mpu = self.meters_per_unit;
        if 113000.0 > mpu && mpu > 110000.0 {
            "degrees"
        } else if 1100.0 > mpu && mpu > 900.0 {
            "kilometers"
        } else if 1.1 > mpu && mpu > 0.9 {
            "meters"
        } else if 0.4 > mpu && mpu > 0.28 {
            "feet"
        } else if 0.03 > mpu && mpu > 0.02 {
            "inches"
        } else if 0.02 > mpu && mpu > 0.005 {
            "centimeters"
        } else if 0.002 > mpu && mpu > 0.0005 {
            "millimeters"
        } else {
            "unknown"
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
