//! Gridsets restricted to an extent and a zoom range.
//!
//! A [`GridSubset`] is what layers, requests and seed tasks actually hold. It
//! caches one coverage rectangle per level: the part of the level's tile
//! matrix that the clipping extent touches.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ConfigError, GridError};

use super::bbox::BoundingBox;
use super::gridset::GridSet;
use super::index::{CoverageRect, TileIndex};
use super::srs::Srs;

/// Maximum relative deviation from an exact halving between adjacent levels.
const DOUBLING_TOLERANCE: f64 = 0.025;

/// A gridset, an optional clipping extent and a zoom range.
#[derive(Debug, Clone)]
pub struct GridSubset {
    gridset: Arc<GridSet>,
    /// Coverage of level `zoom_start + i` at index `i`
    coverages: Vec<CoverageRect>,
    zoom_start: usize,
    extent: Option<BoundingBox>,
    full_coverage: bool,
    min_cached_level: Option<usize>,
    max_cached_level: Option<usize>,
}

impl GridSubset {
    /// Restrict `gridset` to `extent` and `[zoom_start, zoom_stop]`.
    ///
    /// Missing zoom bounds default to the first and last level. A `zoom_stop`
    /// past the last level is clamped to it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGridSet`] when the zoom range is empty,
    /// or when the extent is not sane or does not overlap the gridset.
    pub fn new(
        gridset: Arc<GridSet>,
        extent: Option<BoundingBox>,
        zoom_start: Option<usize>,
        zoom_stop: Option<usize>,
        min_cached_level: Option<usize>,
        max_cached_level: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidGridSet {
            name: gridset.name().to_string(),
            reason,
        };

        let last = gridset.num_levels().saturating_sub(1);
        let zoom_start = zoom_start.unwrap_or(0);
        let mut zoom_stop = zoom_stop.unwrap_or(last);

        if zoom_stop > last {
            warn!(
                gridset = %gridset.name(),
                requested = zoom_stop,
                max = last,
                "Zoom stop beyond the last level of the gridset, clamping"
            );
            zoom_stop = last;
        }
        if zoom_start > zoom_stop {
            return Err(invalid(format!(
                "zoom start {} is after zoom stop {}",
                zoom_start, zoom_stop
            )));
        }

        let bounds = gridset.bounds();
        if let Some(extent) = &extent {
            if !extent.is_sane() {
                return Err(invalid(format!("subset extent {} is not sane", extent)));
            }
            if !extent.intersects(&bounds) {
                return Err(invalid(format!(
                    "subset extent {} does not overlap gridset bounds {}",
                    extent, bounds
                )));
            }
        }

        let mut coverages = Vec::with_capacity(zoom_stop - zoom_start + 1);
        for level in zoom_start..=zoom_stop {
            let full = gridset
                .full_rectangle(level)
                .ok_or_else(|| invalid(format!("level {} does not exist", level)))?;

            let coverage = match &extent {
                None => full,
                Some(extent) => gridset
                    .closest_rectangle_at_level(level, extent)
                    .intersection(&full)
                    .ok_or_else(|| {
                        invalid(format!(
                            "subset extent {} covers no tile at level {}",
                            extent, level
                        ))
                    })?,
            };
            coverages.push(coverage);
        }

        let full_coverage = match &extent {
            None => true,
            Some(extent) => extent.contains(&bounds),
        };

        Ok(Self {
            gridset,
            coverages,
            zoom_start,
            extent,
            full_coverage,
            min_cached_level,
            max_cached_level,
        })
    }

    /// The whole gridset at every level.
    pub fn full(gridset: Arc<GridSet>) -> Result<Self, ConfigError> {
        Self::new(gridset, None, None, None, None, None)
    }

    pub fn gridset(&self) -> &Arc<GridSet> {
        &self.gridset
    }

    pub fn name(&self) -> &str {
        self.gridset.name()
    }

    pub fn srs(&self) -> &Srs {
        self.gridset.srs()
    }

    pub fn tile_width(&self) -> u32 {
        self.gridset.tile_width()
    }

    pub fn tile_height(&self) -> u32 {
        self.gridset.tile_height()
    }

    pub fn scale_warning(&self) -> bool {
        self.gridset.scale_warning()
    }

    pub fn gridset_bounds(&self) -> BoundingBox {
        self.gridset.bounds()
    }

    pub fn zoom_start(&self) -> usize {
        self.zoom_start
    }

    pub fn zoom_stop(&self) -> usize {
        self.zoom_start + self.coverages.len() - 1
    }

    /// Lowest level tiles are cached at.
    pub fn min_cached_level(&self) -> usize {
        self.min_cached_level.unwrap_or(self.zoom_start)
    }

    /// Highest level tiles are cached at.
    pub fn max_cached_level(&self) -> usize {
        self.max_cached_level.unwrap_or_else(|| self.zoom_stop())
    }

    /// Whether tiles rendered at `level` go to the store.
    pub fn should_cache_at_zoom(&self, level: usize) -> bool {
        level >= self.min_cached_level() && level <= self.max_cached_level()
    }

    /// Whether the subset extent spans the whole gridset.
    pub fn is_full_coverage(&self) -> bool {
        self.full_coverage
    }

    /// The clipping extent, or the configured gridset extent without one.
    pub fn original_extent(&self) -> BoundingBox {
        self.extent.unwrap_or_else(|| self.gridset.original_extent())
    }

    pub fn dots_per_inch(&self) -> f64 {
        self.gridset.dots_per_inch()
    }

    // -------------------------------------------------------------------------
    // Coverage
    // -------------------------------------------------------------------------

    fn slot(&self, level: i64) -> Option<usize> {
        let level = usize::try_from(level).ok()?;
        let slot = level.checked_sub(self.zoom_start)?;
        (slot < self.coverages.len()).then_some(slot)
    }

    fn level_out_of_range(&self, level: i64) -> GridError {
        GridError::LevelOutOfRange {
            level,
            zoom_start: self.zoom_start,
            zoom_stop: self.zoom_stop(),
        }
    }

    pub fn coverage(&self, level: usize) -> Option<CoverageRect> {
        self.slot(level as i64).map(|slot| self.coverages[slot])
    }

    /// One rectangle per level, `zoom_start` first.
    pub fn coverages(&self) -> &[CoverageRect] {
        &self.coverages
    }

    pub fn coverage_bounds(&self, level: usize) -> Option<BoundingBox> {
        self.coverage(level)
            .and_then(|rect| self.gridset.bounds_from_rectangle(&rect).ok())
    }

    pub fn covers(&self, index: TileIndex) -> bool {
        self.slot(index.z as i64)
            .is_some_and(|slot| self.coverages[slot].contains(index.x, index.y))
    }

    /// Ensure `index` lies inside the coverage.
    ///
    /// # Errors
    ///
    /// [`GridError::LevelOutOfRange`] for a level outside the zoom range,
    /// [`GridError::OutsideCoverage`] for a column or row outside the level's
    /// coverage.
    pub fn check_coverage(&self, index: TileIndex) -> Result<(), GridError> {
        let slot = self
            .slot(index.z as i64)
            .ok_or_else(|| self.level_out_of_range(index.z as i64))?;
        let coverage = self.coverages[slot];
        if coverage.contains(index.x, index.y) {
            Ok(())
        } else {
            Err(GridError::OutsideCoverage {
                x: index.x,
                y: index.y,
                level: coverage.level,
                coverage,
            })
        }
    }

    pub fn check_tile_dimensions(&self, width: u32, height: u32) -> Result<(), GridError> {
        if width != self.tile_width() || height != self.tile_height() {
            return Err(GridError::TileSizeMismatch {
                width,
                height,
                expected_width: self.tile_width(),
                expected_height: self.tile_height(),
            });
        }
        Ok(())
    }

    /// Tightest coverage of the subset.
    ///
    /// Scans from the deepest level towards the top and returns the first
    /// coverage made of a single tile. When no level collapses to one tile,
    /// the coverage with the fewest tiles wins.
    pub fn coverage_best_fit(&self) -> CoverageRect {
        let mut best = self.coverages[0];
        for rect in self.coverages.iter().rev() {
            if rect.tile_count() == 1 {
                return *rect;
            }
            if rect.tile_count() < best.tile_count() {
                best = *rect;
            }
        }
        best
    }

    pub fn coverage_best_fit_bounds(&self) -> Result<BoundingBox, GridError> {
        self.gridset.bounds_from_rectangle(&self.coverage_best_fit())
    }

    /// Coverage of `level` clipped to the tiles `bounds` touches.
    pub fn coverage_intersection(&self, level: usize, bounds: &BoundingBox) -> Option<CoverageRect> {
        let coverage = self.coverage(level)?;
        self.gridset
            .closest_rectangle_at_level(level, bounds)
            .intersection(&coverage)
    }

    /// Coverage of every level clipped to `bounds`; disjoint levels are absent.
    pub fn coverage_intersections(&self, bounds: &BoundingBox) -> BTreeMap<usize, CoverageRect> {
        self.levels()
            .filter_map(|level| {
                self.coverage_intersection(level, bounds)
                    .map(|rect| (level, rect))
            })
            .collect()
    }

    /// Coverages with rows counted from the top of each level's matrix.
    pub fn wmts_coverages(&self) -> Vec<CoverageRect> {
        self.coverages
            .iter()
            .map(|rect| {
                let high = self.num_tiles_high(rect.level).unwrap_or(0) as i64;
                CoverageRect::new(
                    rect.min_x,
                    high - 1 - rect.max_y,
                    rect.max_x,
                    high - 1 - rect.min_y,
                    rect.level,
                )
            })
            .collect()
    }

    /// Grow each rectangle to whole meta-tiles, staying inside the level's matrix.
    pub fn expand_to_meta_factors(
        &self,
        coverages: &[CoverageRect],
        meta: [u32; 2],
    ) -> Vec<CoverageRect> {
        let meta_x = meta[0].max(1) as i64;
        let meta_y = meta[1].max(1) as i64;

        coverages
            .iter()
            .map(|rect| {
                let wide = self.num_tiles_wide(rect.level).unwrap_or(0) as i64;
                let high = self.num_tiles_high(rect.level).unwrap_or(0) as i64;

                CoverageRect::new(
                    rect.min_x - rect.min_x.rem_euclid(meta_x),
                    rect.min_y - rect.min_y.rem_euclid(meta_y),
                    (rect.max_x - rect.max_x.rem_euclid(meta_x) + meta_x - 1).min(wide - 1),
                    (rect.max_y - rect.max_y.rem_euclid(meta_y) + meta_y - 1).min(high - 1),
                    rect.level,
                )
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Levels
    // -------------------------------------------------------------------------

    pub fn levels(&self) -> std::ops::RangeInclusive<usize> {
        self.zoom_start..=self.zoom_stop()
    }

    /// Level whose grid is named `name`.
    pub fn grid_index(&self, name: &str) -> Option<usize> {
        self.levels().find(|level| {
            self.gridset
                .grid(*level)
                .is_some_and(|grid| grid.name == name)
        })
    }

    pub fn grid_names(&self) -> Vec<String> {
        self.levels()
            .filter_map(|level| self.gridset.grid(level).map(|g| g.name.clone()))
            .collect()
    }

    /// Resolutions of the levels in the zoom range.
    pub fn resolutions(&self) -> Vec<f64> {
        self.levels()
            .filter_map(|level| self.gridset.grid(level).map(|g| g.resolution))
            .collect()
    }

    pub fn num_tiles_wide(&self, level: usize) -> Option<u64> {
        self.gridset.grid(level).map(|g| g.tiles_wide)
    }

    pub fn num_tiles_high(&self, level: usize) -> Option<u64> {
        self.gridset.grid(level).map(|g| g.tiles_high)
    }

    /// Level within the zoom range whose resolution best matches `resolution`.
    pub fn level_for_resolution(&self, resolution: f64) -> Option<usize> {
        self.gridset
            .level_for_resolution_in(resolution, self.zoom_start, self.zoom_stop())
    }

    // -------------------------------------------------------------------------
    // Conversions
    // -------------------------------------------------------------------------

    pub fn bounds_from_index(&self, index: TileIndex) -> Result<BoundingBox, GridError> {
        self.gridset.bounds_from_index(index)
    }

    pub fn bounds_from_rectangle(&self, rect: &CoverageRect) -> Result<BoundingBox, GridError> {
        self.gridset.bounds_from_rectangle(rect)
    }

    pub fn closest_index(&self, bounds: &BoundingBox) -> Result<TileIndex, GridError> {
        self.gridset.closest_index(bounds)
    }

    pub fn closest_index_at_level(
        &self,
        level: usize,
        bounds: &BoundingBox,
    ) -> Result<TileIndex, GridError> {
        self.gridset.closest_index_at_level(level, bounds)
    }

    pub fn closest_rectangle(&self, bounds: &BoundingBox) -> CoverageRect {
        self.gridset.closest_rectangle(bounds)
    }

    /// The four tiles one level down that quarter `index`.
    ///
    /// Children come in the order (2x,2y), (2x+1,2y), (2x,2y+1), (2x+1,2y+1).
    /// A child outside the next level's coverage is [`TileIndex::OUTSIDE`].
    /// When `index` is already at the deepest level of the subset, every
    /// child carries level [`TileIndex::NO_LINK`].
    ///
    /// # Errors
    ///
    /// [`GridError::LevelOutOfRange`] when `index` is outside the zoom range,
    /// [`GridError::NotDoubling`] when the next level does not halve the
    /// resolution.
    pub fn sub_grid(&self, index: TileIndex) -> Result<[TileIndex; 4], GridError> {
        let level = index
            .level()
            .filter(|level| self.slot(*level as i64).is_some())
            .ok_or_else(|| self.level_out_of_range(index.z as i64))?;

        let base_x = index.x * 2;
        let base_y = index.y * 2;
        let offsets = [(0, 0), (1, 0), (0, 1), (1, 1)];

        if level >= self.zoom_stop() {
            return Ok(offsets.map(|(dx, dy)| {
                TileIndex::new(base_x + dx, base_y + dy, TileIndex::NO_LINK)
            }));
        }

        let (Some(current), Some(next)) = (self.gridset.grid(level), self.gridset.grid(level + 1))
        else {
            return Err(self.level_out_of_range(level as i64 + 1));
        };
        if (current.resolution / 2.0 - next.resolution).abs() > next.resolution * DOUBLING_TOLERANCE
        {
            return Err(GridError::NotDoubling {
                gridset: self.name().to_string(),
                level,
            });
        }

        let coverage = self.coverages[level + 1 - self.zoom_start];
        Ok(offsets.map(|(dx, dy)| {
            let (x, y) = (base_x + dx, base_y + dy);
            if coverage.contains(x, y) {
                TileIndex::new(x, y, (level + 1) as i32)
            } else {
                TileIndex::OUTSIDE
            }
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
