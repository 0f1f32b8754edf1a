//! Tile-pyramid addressing.
//!
//! This module turns a coordinate reference system and an extent into a
//! discrete, multi-resolution grid of tiles, and converts between map
//! coordinates and tile indices at every level.
//!
//! - [`BoundingBox`] and [`Srs`] are the geometric primitives
//! - [`GridSet`] is a named pyramid of [`Grid`] levels, built by [`GridSetFactory`]
//! - [`GridSetBroker`] is the name-keyed registry of gridsets
//! - [`GridSubset`] restricts a gridset to an extent and zoom range

mod bbox;
mod broker;
mod defaults;
mod factory;
mod gridset;
mod index;
mod srs;
mod subset;

pub use bbox::{BoundingBox, EQUALITY_THRESHOLD};
pub use broker::GridSetBroker;
pub use defaults::{DefaultGridsets, COMMON_PRACTICE_3857_RESOLUTIONS};
pub use factory::{
    GridSetFactory, GridSetSpec, ResolutionSpec, DEFAULT_LEVELS, DEFAULT_PIXEL_SIZE_METER,
    DEFAULT_TILE_SIZE, EPSG3857_TO_METERS, EPSG4326_TO_METERS,
};
pub use gridset::{Grid, GridSet, TileOrigin};
pub use index::{CoverageRect, TileIndex};
pub use srs::Srs;
pub use subset::GridSubset;
