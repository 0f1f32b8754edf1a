//! Gridset construction.
//!
//! Every pyramid goes through [`GridSetFactory::create`]. The caller picks
//! exactly one way of describing the levels with [`ResolutionSpec`]; the
//! factory derives the missing half (resolutions or scale denominators),
//! sizes every tile matrix and grows the reference extent until the level-0
//! matrix tiles it exactly.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

use super::bbox::BoundingBox;
use super::gridset::{Grid, GridSet, TileOrigin};
use super::srs::Srs;

/// Default pixel size in meters (about 90.7 DPI).
pub const DEFAULT_PIXEL_SIZE_METER: f64 = 0.00028;

/// Level count used when a gridset is defined by its extent alone.
pub const DEFAULT_LEVELS: usize = 22;

/// Meters per degree on the WGS84 equator.
pub const EPSG4326_TO_METERS: f64 = 6378137.0 * 2.0 * std::f64::consts::PI / 360.0;

pub const EPSG3857_TO_METERS: f64 = 1.0;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Fraction of a tile an extent may overhang before another column or row is added.
const TILE_OVERHANG: f64 = 0.01;

/// Slack on the width/height ratio when picking the level-0 matrix shape.
const RATIO_SLACK: f64 = 0.025;

// =============================================================================
// Resolution Spec
// =============================================================================

/// How the levels of a pyramid are described.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionSpec {
    /// Map units per pixel, coarsest first, used verbatim
    #[serde(rename = "resolutions")]
    ByResolutions(Vec<f64>),

    /// Scale denominators, coarsest first
    #[serde(rename = "scale_denominators")]
    ByScales(Vec<f64>),

    /// Number of levels; level 0 is fitted to the extent and each level halves
    /// the resolution of the previous one
    #[serde(rename = "levels")]
    ByLevelCount(usize),
}

impl Default for ResolutionSpec {
    fn default() -> Self {
        ResolutionSpec::ByLevelCount(DEFAULT_LEVELS)
    }
}

// =============================================================================
// GridSet Spec
// =============================================================================

/// Everything needed to build a [`GridSet`].
#[derive(Debug, Clone)]
pub struct GridSetSpec {
    pub name: String,
    pub srs: Srs,
    pub extent: BoundingBox,
    pub origin: TileOrigin,
    pub resolutions: ResolutionSpec,
    /// Falls back to the SRS default when `None`
    pub meters_per_unit: Option<f64>,
    pub pixel_size: f64,
    /// Explicit level names, one per level
    pub scale_names: Option<Vec<String>>,
    pub tile_width: u32,
    pub tile_height: u32,
    pub y_coordinate_first: bool,
    pub description: Option<String>,
}

impl GridSetSpec {
    pub fn new(
        name: impl Into<String>,
        srs: Srs,
        extent: BoundingBox,
        resolutions: ResolutionSpec,
    ) -> Self {
        Self {
            name: name.into(),
            srs,
            extent,
            origin: TileOrigin::BottomLeft,
            resolutions,
            meters_per_unit: None,
            pixel_size: DEFAULT_PIXEL_SIZE_METER,
            scale_names: None,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            y_coordinate_first: false,
            description: None,
        }
    }

    pub fn with_origin(mut self, origin: TileOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_meters_per_unit(mut self, meters_per_unit: f64) -> Self {
        self.meters_per_unit = Some(meters_per_unit);
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: f64) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_scale_names(mut self, names: Vec<String>) -> Self {
        self.scale_names = Some(names);
        self
    }

    pub fn with_y_coordinate_first(mut self, y_coordinate_first: bool) -> Self {
        self.y_coordinate_first = y_coordinate_first;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidGridSet {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds validated gridsets.
pub struct GridSetFactory;

impl GridSetFactory {
    /// Build a gridset from `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGridSet`] for a zero tile size, a
    /// non-sane extent, an empty or non-descending level list, or a scale
    /// name count that differs from the level count.
    pub fn create(spec: GridSetSpec) -> Result<GridSet, ConfigError> {
        if spec.tile_width == 0 || spec.tile_height == 0 {
            return Err(spec.invalid("tile size must be positive"));
        }
        if !spec.extent.is_sane() || spec.extent.width() <= 0.0 || spec.extent.height() <= 0.0 {
            return Err(spec.invalid(format!("extent {} is not a valid area", spec.extent)));
        }
        if spec.pixel_size.is_nan() || spec.pixel_size <= 0.0 {
            return Err(spec.invalid("pixel size must be positive"));
        }
        if let Some(mpu) = spec.meters_per_unit {
            if mpu.is_nan() || mpu <= 0.0 {
                return Err(spec.invalid("meters per unit must be positive"));
            }
        }

        let mut extent = spec.extent;
        let (values, scales_given, preserved) = match &spec.resolutions {
            ResolutionSpec::ByResolutions(resolutions) => (resolutions.clone(), false, true),
            ResolutionSpec::ByScales(scales) => (scales.clone(), true, false),
            ResolutionSpec::ByLevelCount(levels) => {
                if *levels == 0 {
                    return Err(spec.invalid("level count must be positive"));
                }
                let resolutions = Self::fit_level_count(&spec, &mut extent, *levels);
                (resolutions, false, false)
            }
        };

        validate_descending(&spec, &values)?;
        if let Some(names) = &spec.scale_names {
            if names.len() != values.len() {
                return Err(spec.invalid(format!(
                    "{} scale names for {} levels",
                    names.len(),
                    values.len()
                )));
            }
        }

        let (meters_per_unit, scale_warning) = match spec.meters_per_unit {
            Some(mpu) => (mpu, false),
            None => Self::default_meters_per_unit(&spec),
        };

        let mut grids = Vec::with_capacity(values.len());
        for (level, value) in values.iter().copied().enumerate() {
            let (resolution, scale_denominator) = if scales_given {
                (value * spec.pixel_size / meters_per_unit, value)
            } else {
                (value, value * meters_per_unit / spec.pixel_size)
            };

            let name = match &spec.scale_names {
                Some(names) => names[level].clone(),
                None => format!("{}:{}", spec.name, level),
            };

            grids.push(Grid {
                resolution,
                scale_denominator,
                tiles_wide: tile_count(extent.width(), resolution * spec.tile_width as f64),
                tiles_high: tile_count(extent.height(), resolution * spec.tile_height as f64),
                name,
            });
        }

        let tile_origin = match spec.origin {
            TileOrigin::BottomLeft => [extent.min_x, extent.min_y],
            TileOrigin::TopLeft => [extent.min_x, extent.max_y],
        };
        let expanded = expand_to_matrix(&spec, extent, &grids[0]);

        Ok(GridSet {
            name: spec.name,
            description: spec.description,
            srs: spec.srs,
            tile_width: spec.tile_width,
            tile_height: spec.tile_height,
            origin: spec.origin,
            tile_origin,
            extent: expanded,
            original_extent: spec.extent,
            grids,
            meters_per_unit,
            pixel_size: spec.pixel_size,
            resolutions_preserved: preserved,
            y_coordinate_first: spec.y_coordinate_first,
            scale_warning,
        })
    }

    /// Meters per unit implied by the SRS and whether it is a guess.
    fn default_meters_per_unit(spec: &GridSetSpec) -> (f64, bool) {
        if spec.srs == Srs::EPSG_4326 {
            (EPSG4326_TO_METERS, false)
        } else if spec.srs == Srs::EPSG_3857 {
            (EPSG3857_TO_METERS, false)
        } else {
            let preserved = matches!(spec.resolutions, ResolutionSpec::ByResolutions(_));
            if preserved {
                warn!(
                    gridset = %spec.name,
                    srs = %spec.srs,
                    "Gridset defined without meters per unit, assuming 1m per SRS unit for scale output"
                );
            } else {
                warn!(
                    gridset = %spec.name,
                    srs = %spec.srs,
                    "Gridset defined without meters per unit, assuming 1m per unit; scales are wrong if this is incorrect"
                );
            }
            (1.0, preserved)
        }
    }

    /// Level-0 resolution for a level-count pyramid, halved per level.
    ///
    /// Level 0 is the smallest near-square matrix: the tile-relative aspect
    /// ratio is rounded to a whole number of columns per row. When it is more
    /// than 2.5% off, the extent is grown along one axis, away from the
    /// origin corner, to reach that ratio.
    fn fit_level_count(spec: &GridSetSpec, extent: &mut BoundingBox, levels: usize) -> Vec<f64> {
        let tile_width = spec.tile_width as f64;
        let tile_height = spec.tile_height as f64;

        let mut rel_width = extent.width() / tile_width;
        let mut rel_height = extent.height() / tile_height;

        let ratio = rel_width / rel_height;
        // Tall extents still get at least one column
        let rounded = ratio.round().max(1.0);
        let diff = ratio - rounded;

        let first = if diff.abs() < RATIO_SLACK {
            rel_width / rounded
        } else if ratio < rounded {
            // widen
            rel_width = rounded * rel_height;
            extent.max_x = extent.min_x + rel_width * tile_width;
            (extent.width() / rounded) / tile_width
        } else {
            // heighten
            rel_height = rel_width / rounded;
            match spec.origin {
                TileOrigin::TopLeft => extent.min_y = extent.max_y - rel_height * tile_height,
                TileOrigin::BottomLeft => extent.max_y = extent.min_y + rel_height * tile_height,
            }
            (extent.width() / rounded) / tile_width
        };

        let mut resolutions = Vec::with_capacity(levels);
        resolutions.push(first);
        for level in 1..levels {
            resolutions.push(resolutions[level - 1] / 2.0);
        }
        resolutions
    }
}

fn validate_descending(spec: &GridSetSpec, values: &[f64]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(spec.invalid("at least one level is required"));
    }
    if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(spec.invalid("resolutions and scales must be positive"));
    }
    if let Some(pair) = values.windows(2).find(|pair| pair[1] >= pair[0]) {
        return Err(spec.invalid(format!(
            "levels must be ordered coarsest first, found {} before {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Tiles needed to span `span`, tolerating a 1% overhang.
fn tile_count(span: f64, tile_span: f64) -> u64 {
    let count = ((span - tile_span * TILE_OVERHANG) / tile_span).ceil();
    if count < 1.0 {
        1
    } else {
        count as u64
    }
}

/// Grow `extent` away from the origin corner to the level-0 matrix.
fn expand_to_matrix(spec: &GridSetSpec, extent: BoundingBox, level0: &Grid) -> BoundingBox {
    let width = level0.resolution * spec.tile_width as f64 * level0.tiles_wide as f64;
    let height = level0.resolution * spec.tile_height as f64 * level0.tiles_high as f64;

    let mut expanded = extent;
    if width > extent.width() {
        expanded.max_x = extent.min_x + width;
    }
    if height > extent.height() {
        match spec.origin {
            TileOrigin::BottomLeft => expanded.max_y = extent.min_y + height,
            TileOrigin::TopLeft => expanded.min_y = extent.max_y - height,
        }
    }
    expanded
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::index::TileIndex;

    const MERCATOR_HALF: f64 = 20037508.34;

    // -------------------------------------------------------------------------
    // Explicit resolutions
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolutions_epsg4326() {
        let resolutions = vec![180.0 / 256.0, 180.0 / 512.0, 180.0 / 1024.0, 180.0 / 2048.0];
        let gridset = GridSetFactory::create(GridSetSpec::new(
            "test",
            Srs::EPSG_4326,
            BoundingBox::WORLD_4326,
            ResolutionSpec::ByResolutions(resolutions.clone()),
        ))
        .unwrap();

        assert_eq!(gridset.name(), "test");
        assert_eq!(gridset.tile_origin(), [-180.0, -90.0]);
        assert_eq!(gridset.num_levels(), 4);
        assert!(gridset.resolutions_preserved());

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, 180.0 / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 1));

        let grid3 = gridset.grid(3).unwrap();
        assert_eq!(grid3.resolution, 180.0 / 2048.0);
        assert_eq!((grid3.tiles_wide, grid3.tiles_high), (16, 8));
        assert_eq!(grid3.name, "test:3");
    }

    #[test]
    fn test_resolutions_epsg3857() {
        let span = MERCATOR_HALF * 2.0;
        let gridset = GridSetFactory::create(GridSetSpec::new(
            "test",
            Srs::EPSG_3857,
            BoundingBox::new(-MERCATOR_HALF, -MERCATOR_HALF, MERCATOR_HALF, MERCATOR_HALF),
            ResolutionSpec::ByResolutions(vec![
                span / 256.0,
                span / 512.0,
                span / 1024.0,
                span / 2048.0,
            ]),
        ))
        .unwrap();

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, span / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (1, 1));

        let grid3 = gridset.grid(3).unwrap();
        assert_eq!((grid3.tiles_wide, grid3.tiles_high), (8, 8));
    }

    #[test]
    fn test_resolutions_uneven_extent() {
        let gridset = GridSetFactory::create(
            GridSetSpec::new(
                "test",
                Srs::EPSG_4326,
                BoundingBox::new(-173.0, -90.0, 180.0, 96.0),
                ResolutionSpec::ByResolutions(vec![180.0 / 200.0, 180.0 / 400.0, 180.0 / 800.0]),
            )
            .with_tile_size(200, 200),
        )
        .unwrap();

        assert_eq!(gridset.tile_origin(), [-173.0, -90.0]);

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 2));

        let grid2 = gridset.grid(2).unwrap();
        assert_eq!(grid2.resolution, 180.0 / 800.0);
        assert_eq!((grid2.tiles_wide, grid2.tiles_high), (8, 5));

        // Grown away from the origin to two 180 degree tiles each way
        assert!(gridset
            .bounds()
            .equals_within(&BoundingBox::new(-173.0, -90.0, 187.0, 270.0), 1e-9));
        assert_eq!(
            gridset.original_extent(),
            BoundingBox::new(-173.0, -90.0, 180.0, 96.0)
        );
    }

    // -------------------------------------------------------------------------
    // Level counts
    // -------------------------------------------------------------------------

    fn by_levels(extent: BoundingBox, levels: usize) -> GridSet {
        GridSetFactory::create(GridSetSpec::new(
            "test",
            Srs::EPSG_4326,
            extent,
            ResolutionSpec::ByLevelCount(levels),
        ))
        .unwrap()
    }

    #[test]
    fn test_level_count_epsg4326() {
        let gridset = by_levels(BoundingBox::WORLD_4326, 4);

        assert_eq!(gridset.tile_origin(), [-180.0, -90.0]);
        assert_eq!(gridset.num_levels(), 4);
        assert!(!gridset.resolutions_preserved());

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, 180.0 / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 1));

        let grid3 = gridset.grid(3).unwrap();
        assert_eq!(grid3.resolution, 180.0 / 2048.0);
        assert_eq!((grid3.tiles_wide, grid3.tiles_high), (16, 8));
    }

    #[test]
    fn test_level_count_epsg3857() {
        let gridset = GridSetFactory::create(GridSetSpec::new(
            "test",
            Srs::EPSG_3857,
            BoundingBox::new(-MERCATOR_HALF, -MERCATOR_HALF, MERCATOR_HALF, MERCATOR_HALF),
            ResolutionSpec::ByLevelCount(6),
        ))
        .unwrap();

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, (MERCATOR_HALF * 2.0) / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (1, 1));

        let grid3 = gridset.grid(3).unwrap();
        assert_eq!((grid3.tiles_wide, grid3.tiles_high), (8, 8));
    }

    #[test]
    fn test_level_count_widens_narrow_extent() {
        let gridset = by_levels(BoundingBox::new(-180.0, -90.0, 172.0, 90.0), 4);

        assert_eq!(gridset.tile_origin(), [-180.0, -90.0]);
        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, 180.0 / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 1));
        assert_eq!(gridset.bounds(), BoundingBox::WORLD_4326);
    }

    #[test]
    fn test_level_count_heightens_short_extent() {
        let gridset = by_levels(BoundingBox::new(-180.0, -90.0, 180.0, 82.0), 4);

        assert_eq!(gridset.tile_origin(), [-180.0, -90.0]);
        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, 180.0 / 256.0);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 1));
        assert_eq!(gridset.bounds(), BoundingBox::WORLD_4326);
    }

    #[test]
    fn test_level_count_grows_extent_to_tile_multiple() {
        let gridset = GridSetFactory::create(
            GridSetSpec::new(
                "test",
                Srs::new(3005),
                BoundingBox::new(0.0, 0.0, 100.0, 45.0),
                ResolutionSpec::ByLevelCount(4),
            )
            .with_tile_size(10, 20)
            .with_meters_per_unit(1.0),
        )
        .unwrap();

        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.resolution, 2.5);
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (4, 1));
        assert_eq!(gridset.bounds(), BoundingBox::new(0.0, 0.0, 100.0, 50.0));

        let tile = gridset.bounds_from_index(TileIndex::new(0, 0, 0)).unwrap();
        assert_eq!(tile, BoundingBox::new(0.0, 0.0, 25.0, 50.0));
    }

    #[test]
    fn test_level_count_top_left_grows_downwards() {
        let gridset = GridSetFactory::create(
            GridSetSpec::new(
                "test",
                Srs::new(3005),
                BoundingBox::new(0.0, 0.0, 100.0, 45.0),
                ResolutionSpec::ByLevelCount(2),
            )
            .with_tile_size(10, 20)
            .with_meters_per_unit(1.0)
            .with_origin(TileOrigin::TopLeft),
        )
        .unwrap();

        assert_eq!(gridset.tile_origin(), [0.0, 45.0]);
        assert_eq!(gridset.bounds(), BoundingBox::new(0.0, -5.0, 100.0, 45.0));
        let tile = gridset.bounds_from_index(TileIndex::new(0, 0, 0)).unwrap();
        assert_eq!(tile, BoundingBox::new(0.0, -5.0, 25.0, 45.0));
    }

    #[test]
    fn test_level_count_tall_extent() {
        let gridset = by_levels(BoundingBox::new(0.0, 0.0, 10.0, 90.0), 3);
        let grid0 = gridset.grid(0).unwrap();
        assert_eq!(grid0.tiles_wide, 1);
        assert!(grid0.tiles_high >= 1);
        let resolutions = gridset.resolutions();
        assert!(resolutions.windows(2).all(|w| w[1] < w[0]));
    }

    // -------------------------------------------------------------------------
    // Scales and units
    // -------------------------------------------------------------------------

    #[test]
    fn test_scales_derive_resolutions() {
        let gridset = GridSetFactory::create(GridSetSpec::new(
            "scales",
            Srs::EPSG_3857,
            BoundingBox::WORLD_3857,
            ResolutionSpec::ByScales(vec![1_000_000.0, 500_000.0]),
        ))
        .unwrap();

        assert_eq!(gridset.grid(0).unwrap().resolution, 1_000_000.0 * 0.00028);
        assert_eq!(gridset.grid(1).unwrap().scale_denominator, 500_000.0);
        assert!(!gridset.resolutions_preserved());
    }

    #[test]
    fn test_meters_per_unit_defaults() {
        let gridset = by_levels(BoundingBox::WORLD_4326, 2);
        assert_eq!(gridset.meters_per_unit(), EPSG4326_TO_METERS);
        assert!(!gridset.scale_warning());

        let unknown = GridSetFactory::create(GridSetSpec::new(
            "spearfish",
            Srs::new(26713),
            BoundingBox::new(589425.0, 4913959.0, 609518.0, 4928082.0),
            ResolutionSpec::ByResolutions(vec![100.0, 50.0]),
        ))
        .unwrap();
        assert_eq!(unknown.meters_per_unit(), 1.0);
        assert!(unknown.scale_warning());
        assert_eq!(unknown.guess_map_units(), "meters");
    }

    #[test]
    fn test_scale_names() {
        let gridset = GridSetFactory::create(
            GridSetSpec::new(
                "named",
                Srs::EPSG_4326,
                BoundingBox::WORLD_4326,
                ResolutionSpec::ByLevelCount(2),
            )
            .with_scale_names(vec!["top".to_string(), "bottom".to_string()]),
        )
        .unwrap();
        assert_eq!(gridset.grid(1).unwrap().name, "bottom");
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    #[test]
    fn test_rejects_invalid_definitions() {
        let base = || {
            GridSetSpec::new(
                "bad",
                Srs::EPSG_4326,
                BoundingBox::WORLD_4326,
                ResolutionSpec::ByLevelCount(3),
            )
        };

        let cases = [
            base().with_tile_size(0, 256),
            GridSetSpec {
                resolutions: ResolutionSpec::ByResolutions(vec![]),
                ..base()
            },
            GridSetSpec {
                resolutions: ResolutionSpec::ByResolutions(vec![1.0, 2.0]),
                ..base()
            },
            GridSetSpec {
                resolutions: ResolutionSpec::ByLevelCount(0),
                ..base()
            },
            GridSetSpec {
                extent: BoundingBox::NULL,
                ..base()
            },
            base().with_scale_names(vec!["only-one".to_string()]),
        ];

        for spec in cases {
            let err = GridSetFactory::create(spec).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidGridSet { .. }), "{}", err);
        }
    }

    #[test]
    fn test_resolution_spec_json() {
        let spec: ResolutionSpec = serde_json::from_str(r#"{"levels": 12}"#).unwrap();
        assert_eq!(spec, ResolutionSpec::ByLevelCount(12));

        let spec: ResolutionSpec =
            serde_json::from_str(r#"{"scale_denominators": [1000.0, 500.0]}"#).unwrap();
        assert_eq!(spec, ResolutionSpec::ByScales(vec![1000.0, 500.0]));
    }
}
