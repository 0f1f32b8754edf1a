//! Walking a [`TileRange`] in meta-tile steps.
//!
//! [`TileRangeIterator`] is one cursor shared by any number of workers:
//! every call hands out a different meta-tile. [`PartitionedWalk`] splits
//! the same walk into disjoint slices, one per worker, with no shared state.
//!
//! Both visit meta-tiles in raster order: columns first, then rows, then
//! levels. Meta-tile origins are aligned to multiples of the meta factors, so
//! a meta-tile never straddles two meta cells of the grid. The tiles a
//! location stands for are the ones of its meta cell that fall inside the
//! level's rectangle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::grid::{CoverageRect, TileIndex};

use super::range::TileRange;

/// Meta-tile walk over a range shared between workers.
#[derive(Debug)]
pub struct TileRangeIterator {
    range: TileRange,
    meta_x: i64,
    meta_y: i64,
    cursor: Mutex<Cursor>,
    tiles_skipped: AtomicU64,
    tiles_rendered: AtomicU64,
}

/// Next location to examine.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    slot: usize,
    x: i64,
    y: i64,
}

impl TileRangeIterator {
    /// Walk `range` in steps of `meta` (columns, rows). Zero factors count as one.
    pub fn new(range: TileRange, meta: [u32; 2]) -> Self {
        let meta_x = meta[0].max(1) as i64;
        let meta_y = meta[1].max(1) as i64;
        let first = range.rects()[0];
        let cursor = Cursor {
            slot: 0,
            x: align(first.min_x, meta_x),
            y: align(first.min_y, meta_y),
        };

        Self {
            range,
            meta_x,
            meta_y,
            cursor: Mutex::new(cursor),
            tiles_skipped: AtomicU64::new(0),
            tiles_rendered: AtomicU64::new(0),
        }
    }

    pub fn range(&self) -> &TileRange {
        &self.range
    }

    pub fn meta(&self) -> [u32; 2] {
        [self.meta_x as u32, self.meta_y as u32]
    }

    /// Claim the next meta-tile location, `None` once the range is exhausted.
    ///
    /// Locations whose tiles are all rejected by the range filter are skipped
    /// and their tiles counted in [`tiles_skipped`](Self::tiles_skipped).
    /// Every returned location adds its tile count to
    /// [`tiles_rendered`](Self::tiles_rendered).
    pub fn next_meta_grid_location(&self) -> Option<TileIndex> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let rects = self.range.rects();

        while let Some(rect) = rects.get(cursor.slot) {
            if cursor.y > rect.max_y {
                cursor.slot += 1;
                if let Some(next) = rects.get(cursor.slot) {
                    cursor.x = align(next.min_x, self.meta_x);
                    cursor.y = align(next.min_y, self.meta_y);
                }
                continue;
            }
            if cursor.x > rect.max_x {
                cursor.x = align(rect.min_x, self.meta_x);
                cursor.y += self.meta_y;
                continue;
            }

            let (x, y) = (cursor.x, cursor.y);
            cursor.x += self.meta_x;

            let count = clipped_tile_count(rect, x, y, self.meta_x, self.meta_y);
            if accepts_meta_tile(&self.range, rect, x, y, self.meta_x, self.meta_y) {
                self.tiles_rendered.fetch_add(count, Ordering::Relaxed);
                return Some(TileIndex::new(x, y, rect.level as i32));
            }
            self.tiles_skipped.fetch_add(count, Ordering::Relaxed);
        }
        None
    }

    /// Tiles of the meta-tile at `location` that lie in the range rectangle.
    ///
    /// The range filter is not applied; a meta-tile is worked on as a whole.
    pub fn tiles_at(&self, location: TileIndex) -> Vec<TileIndex> {
        meta_tiles(&self.range, location, self.meta_x, self.meta_y)
    }

    pub fn tiles_skipped(&self) -> u64 {
        self.tiles_skipped.load(Ordering::Relaxed)
    }

    pub fn tiles_rendered(&self) -> u64 {
        self.tiles_rendered.load(Ordering::Relaxed)
    }
}

/// One worker's share of a meta-tile walk.
///
/// On every row of every level, meta-columns are numbered from zero and the
/// walk for `thread_index` owns those with `column % thread_count ==
/// thread_index`. The walks of all indices together visit exactly the
/// locations a [`TileRangeIterator`] over the same range would, and no
/// location twice.
#[derive(Debug)]
pub struct PartitionedWalk<'a> {
    range: &'a TileRange,
    meta_x: i64,
    meta_y: i64,
    stride: i64,
    start_column: i64,
    cursor: Cursor,
    tiles_skipped: u64,
    tiles_rendered: u64,
}

impl<'a> PartitionedWalk<'a> {
    /// Partition `thread_index` out of `thread_count`.
    ///
    /// `thread_count` is at least one and `thread_index` is taken modulo it.
    pub fn new(range: &'a TileRange, meta: [u32; 2], thread_index: usize, thread_count: usize) -> Self {
        let meta_x = meta[0].max(1) as i64;
        let meta_y = meta[1].max(1) as i64;
        let thread_count = thread_count.max(1) as i64;
        let start_column = thread_index as i64 % thread_count;
        let first = range.rects()[0];

        Self {
            range,
            meta_x,
            meta_y,
            stride: thread_count * meta_x,
            start_column,
            cursor: Cursor {
                slot: 0,
                x: align(first.min_x, meta_x) + start_column * meta_x,
                y: align(first.min_y, meta_y),
            },
            tiles_skipped: 0,
            tiles_rendered: 0,
        }
    }

    /// Tiles of the meta-tile at `location` that lie in the range rectangle.
    pub fn tiles_at(&self, location: TileIndex) -> Vec<TileIndex> {
        meta_tiles(self.range, location, self.meta_x, self.meta_y)
    }

    pub fn tiles_skipped(&self) -> u64 {
        self.tiles_skipped
    }

    pub fn tiles_rendered(&self) -> u64 {
        self.tiles_rendered
    }

    fn row_start(&self, rect: &CoverageRect) -> i64 {
        align(rect.min_x, self.meta_x) + self.start_column * self.meta_x
    }
}

impl Iterator for PartitionedWalk<'_> {
    type Item = TileIndex;

    fn next(&mut self) -> Option<TileIndex> {
        let range = self.range;
        let rects = range.rects();

        while let Some(rect) = rects.get(self.cursor.slot) {
            if self.cursor.y > rect.max_y {
                self.cursor.slot += 1;
                if let Some(next) = rects.get(self.cursor.slot) {
                    self.cursor.x = self.row_start(next);
                    self.cursor.y = align(next.min_y, self.meta_y);
                }
                continue;
            }
            if self.cursor.x > rect.max_x {
                self.cursor.x = self.row_start(rect);
                self.cursor.y += self.meta_y;
                continue;
            }

            let (x, y) = (self.cursor.x, self.cursor.y);
            self.cursor.x += self.stride;

            let count = clipped_tile_count(rect, x, y, self.meta_x, self.meta_y);
            if accepts_meta_tile(range, rect, x, y, self.meta_x, self.meta_y) {
                self.tiles_rendered += count;
                return Some(TileIndex::new(x, y, rect.level as i32));
            }
            self.tiles_skipped += count;
        }
        None
    }
}

/// Number of meta-tile locations a walk of `range` yields without a filter.
pub fn meta_tile_count(range: &TileRange, meta: [u32; 2]) -> u64 {
    let meta_x = meta[0].max(1) as i64;
    let meta_y = meta[1].max(1) as i64;
    range
        .rects()
        .iter()
        .map(|rect| {
            let columns = (rect.max_x - align(rect.min_x, meta_x)) / meta_x + 1;
            let rows = (rect.max_y - align(rect.min_y, meta_y)) / meta_y + 1;
            (columns * rows) as u64
        })
        .sum()
}

/// Round `value` down to a multiple of `step`.
fn align(value: i64, step: i64) -> i64 {
    value - value.rem_euclid(step)
}

/// Tiles of the meta cell at (`x`, `y`) inside `rect`.
fn clipped_tile_count(rect: &CoverageRect, x: i64, y: i64, meta_x: i64, meta_y: i64) -> u64 {
    let columns = (x + meta_x - 1).min(rect.max_x) - x.max(rect.min_x) + 1;
    let rows = (y + meta_y - 1).min(rect.max_y) - y.max(rect.min_y) + 1;
    (columns.max(0) * rows.max(0)) as u64
}

fn accepts_meta_tile(
    range: &TileRange,
    rect: &CoverageRect,
    x: i64,
    y: i64,
    meta_x: i64,
    meta_y: i64,
) -> bool {
    if range.filter().is_none() {
        return true;
    }
    (y.max(rect.min_y)..=(y + meta_y - 1).min(rect.max_y)).any(|ty| {
        (x.max(rect.min_x)..=(x + meta_x - 1).min(rect.max_x))
            .any(|tx| range.accepts(tx, ty, rect.level))
    })
}

fn meta_tiles(range: &TileRange, location: TileIndex, meta_x: i64, meta_y: i64) -> Vec<TileIndex> {
    let Some(rect) = location.level().and_then(|level| range.rect(level)) else {
        return Vec::new();
    };
    let mut tiles = Vec::new();
    for y in location.y.max(rect.min_y)..=(location.y + meta_y - 1).min(rect.max_y) {
        for x in location.x.max(rect.min_x)..=(location.x + meta_x - 1).min(rect.max_x) {
            tiles.push(TileIndex::new(x, y, location.z));
        }
    }
    tiles
}
