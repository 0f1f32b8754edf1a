//! Discrete tile addresses.

use std::fmt;

use serde::Serialize;

/// Address of a single tile: column, row (counted from the bottom) and level.
///
/// A level of `-1` marks a quad-tree child that must not be linked any
/// further (see [`GridSubset::sub_grid`](super::GridSubset::sub_grid)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileIndex {
    pub x: i64,
    pub y: i64,
    pub z: i32,
}

impl TileIndex {
    /// Level value of children that are not linked further.
    pub const NO_LINK: i32 = -1;

    /// Child slot outside the coverage of the next level.
    pub const OUTSIDE: TileIndex = TileIndex::new(-1, -1, -1);

    pub const fn new(x: i64, y: i64, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The level as an index, or `None` for the sentinel level.
    pub fn level(&self) -> Option<usize> {
        usize::try_from(self.z).ok()
    }

    /// Whether this index can be followed (it carries a real level).
    pub fn is_linkable(&self) -> bool {
        self.z >= 0
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}y{}z{}", self.x, self.y, self.z)
    }
}

/// Inclusive rectangle of tile indices at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CoverageRect {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
    pub level: usize,
}

impl CoverageRect {
    pub const fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64, level: usize) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            level,
        }
    }

    /// Whether the rectangle holds no tile.
    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// Number of columns.
    pub fn width(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.max_x - self.min_x + 1) as u64
        }
    }

    /// Number of rows.
    pub fn height(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.max_y - self.min_y + 1) as u64
        }
    }

    pub fn tile_count(&self) -> u64 {
        self.width() * self.height()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Overlap of two rectangles on the same level, `None` when disjoint.
    pub fn intersection(&self, other: &CoverageRect) -> Option<CoverageRect> {
        let rect = CoverageRect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
            self.level,
        );
        (!rect.is_empty()).then_some(rect)
    }

    /// `[min_x, min_y, max_x, max_y, level]`
    pub fn to_array(&self) -> [i64; 5] {
        [
            self.min_x,
            self.min_y,
            self.max_x,
            self.max_y,
            self.level as i64,
        ]
    }
}

impl fmt::Display for CoverageRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y, self.level
        )
    }
}
