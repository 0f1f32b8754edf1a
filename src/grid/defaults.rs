//! Built-in gridsets.
//!
//! Every broker starts out with the well-known world pyramids below. Their
//! names depend on [`DefaultGridsets`]: the legacy scheme names them after the
//! SRS (`EPSG:4326`, `EPSG:3857`), the OGC scheme after the WMTS well-known
//! scale sets (`GlobalCRS84Geometric`, `GoogleMapsCompatible`).

use crate::error::ConfigError;

use super::bbox::BoundingBox;
use super::factory::{GridSetFactory, GridSetSpec, ResolutionSpec, DEFAULT_LEVELS};
use super::gridset::{GridSet, TileOrigin};
use super::srs::Srs;

/// Resolutions of the commonly used spherical mercator pyramid.
pub const COMMON_PRACTICE_3857_RESOLUTIONS: [f64; 31] = [
    156543.03390625,
    78271.516953125,
    39135.7584765625,
    19567.87923828125,
    9783.939619140625,
    4891.9698095703125,
    2445.9849047851562,
    1222.9924523925781,
    611.4962261962891,
    305.74811309814453,
    152.87405654907226,
    76.43702827453613,
    38.218514137268066,
    19.109257068634033,
    9.554628534317017,
    4.777314267158508,
    2.388657133579254,
    1.194328566789627,
    0.5971642833948135,
    0.29858214169740677,
    0.14929107084870338,
    0.07464553542435169,
    0.037322767712175846,
    0.018661383856087923,
    0.009330691928043961,
    0.004665345964021981,
    0.0023326729820109904,
    0.0011663364910054952,
    5.831682455027476E-4,
    2.915841227513738E-4,
    1.457920613756869E-4,
];

const CRS84_SCALE_DENOMINATORS: [f64; 21] = [
    500E6, 250E6, 100E6, 50E6, 25E6, 10E6, 5E6, 2.5E6, 1E6, 500E3, 250E3, 100E3, 50E3, 25E3,
    10E3, 5E3, 2.5E3, 1000.0, 500.0, 250.0, 100.0,
];

const CRS84_QUAD_SCALE_DENOMINATORS: [f64; 19] = [
    559082264.0287178,
    279541132.0143589,
    139770566.0071794,
    69885283.00358972,
    34942641.50179486,
    17471320.75089743,
    8735660.375448715,
    4367830.187724357,
    2183915.093862179,
    1091957.546931089,
    545978.7734655447,
    272989.3867327723,
    136494.6933663862,
    68247.34668319309,
    34123.67334159654,
    17061.83667079827,
    8530.918335399136,
    4265.459167699568,
    2132.729583849784,
];

const EPSG4326_DESCRIPTION: &str = "A default WGS84 tile matrix set where the first zoom level \
    covers the world with two tiles on the horizontal axis and one tile over the vertical axis \
    and each subsequent zoom level is calculated by half the resolution of its previous one.";

const EPSG4326X2_DESCRIPTION: &str = "A default WGS84 tile matrix set with 512 pixel tiles, \
    the first zoom level covering the world with two tiles on the horizontal axis and one tile \
    over the vertical axis.";

const EPSG3857_DESCRIPTION: &str = "This well-known scale set has been defined to be compatible \
    with Google Maps and Microsoft Live Map projections and zoom levels. Level 0 allows \
    representing the whole world in a single 256x256 pixels. The next level represents the \
    whole world in 2x2 tiles of 256x256 pixels and so on in powers of 2. Scale denominator is \
    only accurate near the equator.";

const EPSG3857X2_DESCRIPTION: &str = "Spherical mercator scale set with 512 pixel tiles at the \
    same ground resolutions as the 256 pixel set, for high density displays.";

const CRS84_PIXEL_DESCRIPTION: &str = "This well-known scale set has been defined for global \
    cartographic products. Rounded pixel sizes have been chosen for intuitive cartographic \
    representation of raster data. Some values have been chosen to coincide with original \
    pixel size of commonly used global products like STRM (1\" and 3\"), GTOPO (30\") or \
    ETOPO (2' and 5'). Scale denominator and approximated pixel size in meters are only \
    accurate near the equator.";

const CRS84_SCALE_DESCRIPTION: &str = "This well-known scale set has been defined for global \
    cartographic products. Rounded scales have been chosen for intuitive cartographic \
    representation of vector data. Scale denominator is only accurate near the equator.";

const CRS84_QUAD_DESCRIPTION: &str = "This well-known scale set has been defined to allow \
    quadtree pyramids in CRS84. Level 0 allows representing the whole world in a single \
    256x256 pixels (where the first 64 and last 64 lines of the tile are left blank). The next \
    level represents the whole world in 2x2 tiles of 256x256 pixels and so on in powers of 2. \
    Scale denominator is only accurate near the equator.";

/// Naming scheme for the built-in gridsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultGridsets {
    /// Publish spherical mercator as `EPSG:900913` instead of `EPSG:3857`
    pub use_epsg900913: bool,

    /// Name the world pyramids after their SRS
    pub use_legacy_names: bool,
}

impl Default for DefaultGridsets {
    fn default() -> Self {
        Self {
            use_epsg900913: false,
            use_legacy_names: true,
        }
    }
}

impl DefaultGridsets {
    pub fn epsg4326_name(&self) -> &'static str {
        if self.use_legacy_names {
            "EPSG:4326"
        } else {
            "GlobalCRS84Geometric"
        }
    }

    pub fn epsg3857_name(&self) -> &'static str {
        match (self.use_legacy_names, self.use_epsg900913) {
            (false, _) => "GoogleMapsCompatible",
            (true, true) => "EPSG:900913",
            (true, false) => "EPSG:3857",
        }
    }

    fn mercator_srs(&self) -> Srs {
        if self.use_epsg900913 {
            Srs::EPSG_900913
        } else {
            Srs::EPSG_3857
        }
    }

    /// The world pyramid in geographic coordinates.
    pub fn world_epsg4326(&self) -> Result<GridSet, ConfigError> {
        Self::geographic(self.epsg4326_name(), 256, EPSG4326_DESCRIPTION)
    }

    /// The world pyramid in spherical mercator.
    pub fn world_epsg3857(&self) -> Result<GridSet, ConfigError> {
        GridSetFactory::create(
            GridSetSpec::new(
                self.epsg3857_name(),
                self.mercator_srs(),
                BoundingBox::WORLD_3857,
                ResolutionSpec::ByResolutions(COMMON_PRACTICE_3857_RESOLUTIONS.to_vec()),
            )
            .with_meters_per_unit(1.0)
            .with_description(EPSG3857_DESCRIPTION),
        )
    }

    /// Build every built-in gridset, world pyramids first.
    pub fn build(&self) -> Result<Vec<GridSet>, ConfigError> {
        let mut gridsets = vec![self.world_epsg4326()?, self.world_epsg3857()?];

        gridsets.push(Self::geographic(
            &format!("{}x2", self.epsg4326_name()),
            512,
            EPSG4326X2_DESCRIPTION,
        )?);

        let halved = COMMON_PRACTICE_3857_RESOLUTIONS
            .iter()
            .map(|r| r / 2.0)
            .collect();
        gridsets.push(GridSetFactory::create(
            GridSetSpec::new(
                format!("{}x2", self.epsg3857_name()),
                self.mercator_srs(),
                BoundingBox::WORLD_3857,
                ResolutionSpec::ByResolutions(halved),
            )
            .with_tile_size(512, 512)
            .with_meters_per_unit(1.0)
            .with_description(EPSG3857X2_DESCRIPTION),
        )?);

        gridsets.push(Self::crs84(
            "GlobalCRS84Pixel",
            ResolutionSpec::ByResolutions(crs84_pixel_resolutions().to_vec()),
            CRS84_PIXEL_DESCRIPTION,
        )?);
        gridsets.push(Self::crs84(
            "GlobalCRS84Scale",
            ResolutionSpec::ByScales(CRS84_SCALE_DENOMINATORS.to_vec()),
            CRS84_SCALE_DESCRIPTION,
        )?);
        gridsets.push(Self::crs84(
            "GoogleCRS84Quad",
            ResolutionSpec::ByScales(CRS84_QUAD_SCALE_DENOMINATORS.to_vec()),
            CRS84_QUAD_DESCRIPTION,
        )?);

        Ok(gridsets)
    }

    fn geographic(name: &str, tile_size: u32, description: &str) -> Result<GridSet, ConfigError> {
        GridSetFactory::create(
            GridSetSpec::new(
                name,
                Srs::EPSG_4326,
                BoundingBox::WORLD_4326,
                ResolutionSpec::ByLevelCount(DEFAULT_LEVELS),
            )
            .with_tile_size(tile_size, tile_size)
            .with_y_coordinate_first(true)
            .with_description(description),
        )
    }

    fn crs84(name: &str, levels: ResolutionSpec, description: &str) -> Result<GridSet, ConfigError> {
        GridSetFactory::create(
            GridSetSpec::new(name, Srs::EPSG_4326, BoundingBox::WORLD_4326, levels)
                .with_origin(TileOrigin::TopLeft)
                .with_y_coordinate_first(true)
                .with_description(description),
        )
    }
}

/// Rounded pixel sizes in degrees, from 2 degrees down to 0.01 arc seconds.
fn crs84_pixel_resolutions() -> [f64; 18] {
    let mut r = [0.0; 18];
    r[0] = 2.0;
    r[1] = 1.0;
    r[2] = 0.5; // 30'
    r[3] = r[2] * (2.0 / 3.0); // 20'
    r[4] = r[2] / 3.0; // 10'
    r[5] = r[4] / 2.0; // 5'
    r[6] = r[4] / 5.0; // 2'
    r[7] = r[4] / 10.0; // 1'
    r[8] = (5.0 / 6.0) * 1E-2; // 30''
    r[9] = r[8] / 2.0; // 15''
    r[10] = r[9] / 3.0; // 5''
    r[11] = r[9] / 5.0; // 3''
    r[12] = r[11] / 3.0; // 1''
    r[13] = r[12] / 2.0; // 0.5''
    r[14] = r[13] * (3.0 / 5.0); // 0.3''
    r[15] = r[14] / 3.0; // 0.1''
    r[16] = r[15] * (3.0 / 10.0); // 0.03''
    r[17] = r[16] / 3.0; // 0.01''
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_follow_scheme() {
        let legacy = DefaultGridsets::default();
        assert_eq!(legacy.epsg4326_name(), "EPSG:4326");
        assert_eq!(legacy.epsg3857_name(), "EPSG:3857");

        let google = DefaultGridsets {
            use_epsg900913: true,
            use_legacy_names: true,
        };
        assert_eq!(google.epsg3857_name(), "EPSG:900913");
        assert_eq!(google.world_epsg3857().unwrap().srs().number(), 900913);

        let ogc = DefaultGridsets {
            use_epsg900913: false,
            use_legacy_names: false,
        };
        assert_eq!(ogc.epsg4326_name(), "GlobalCRS84Geometric");
        assert_eq!(ogc.epsg3857_name(), "GoogleMapsCompatible");
    }

    #[test]
    fn test_builds_all_defaults() {
        let names: Vec<String> = DefaultGridsets::default()
            .build()
            .unwrap()
            .iter()
            .map(|g| g.name().to_string())
            .collect();

        assert_eq!(
            names,
            [
                "EPSG:4326",
                "EPSG:3857",
                "EPSG:4326x2",
                "EPSG:3857x2",
                "GlobalCRS84Pixel",
                "GlobalCRS84Scale",
                "GoogleCRS84Quad"
            ]
        );
    }

    #[test]
    fn test_world_epsg4326_shape() {
        let gridset = DefaultGridsets::default().world_epsg4326().unwrap();
        assert_eq!(gridset.num_levels(), DEFAULT_LEVELS);
        assert!(gridset.y_coordinate_first());
        let grid0 = gridset.grid(0).unwrap();
        assert_eq!((grid0.tiles_wide, grid0.tiles_high), (2, 1));
        assert_eq!(grid0.resolution, 180.0 / 256.0);
    }

    #[test]
    fn test_world_epsg3857_shape() {
        let gridset = DefaultGridsets::default().world_epsg3857().unwrap();
        assert_eq!(gridset.num_levels(), 31);
        for (level, grid) in gridset.grids().iter().enumerate().take(10) {
            assert_eq!(grid.tiles_wide, 1 << level);
            assert_eq!(grid.tiles_high, 1 << level);
        }
        assert_eq!(gridset.guess_map_units(), "meters");
    }

    #[test]
    fn test_crs84_sets_are_top_left() {
        for gridset in DefaultGridsets::default().build().unwrap() {
            if gridset.name().starts_with("GlobalCRS84") || gridset.name() == "GoogleCRS84Quad" {
                assert!(gridset.is_top_left_aligned(), "{}", gridset.name());
                assert_eq!(gridset.tile_origin(), [-180.0, 90.0]);
            }
        }
    }

    #[test]
    fn test_crs84_pixel_resolutions_descend() {
        let resolutions = crs84_pixel_resolutions();
        assert!(resolutions.windows(2).all(|w| w[1] < w[0]));
        assert!((resolutions[17] - 2.777_777_777_777_778e-6).abs() < 1e-12);
    }
}
