//! Tile ranges and inclusion filters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SeedError;
use crate::grid::{BoundingBox, CoverageRect, GridSubset, TileIndex};

/// Per-tile inclusion predicate attached to a [`TileRange`].
pub trait TileFilter: Send + Sync + fmt::Debug {
    /// Whether the tile at (`x`, `y`) on `level` belongs to the range.
    fn contains(&self, x: i64, y: i64, level: usize) -> bool;

    /// Number of tiles of `rect` the filter accepts.
    ///
    /// The default walks every tile of the rectangle.
    fn accepted_count(&self, rect: &CoverageRect) -> u64 {
        let mut count = 0;
        for y in rect.min_y..=rect.max_y {
            for x in rect.min_x..=rect.max_x {
                if self.contains(x, y, rect.level) {
                    count += 1;
                }
            }
        }
        count
    }
}

/// A region of a pyramid across a span of levels.
///
/// Holds one rectangle per level in ascending level order. Levels may be
/// skipped, and a level with no tile is simply absent. An optional
/// [`TileFilter`] narrows the rectangles to an irregular shape.
#[derive(Debug, Clone)]
pub struct TileRange {
    layer: String,
    gridset: String,
    format: String,
    parameters_id: Option<String>,
    rects: Vec<CoverageRect>,
    filter: Option<Arc<dyn TileFilter>>,
}

impl TileRange {
    /// Build a range from per-level rectangles.
    ///
    /// Empty rectangles are dropped and the rest sorted by level.
    ///
    /// # Errors
    ///
    /// [`SeedError::InvalidRange`] when no tile remains or a level appears twice.
    pub fn new(
        layer: impl Into<String>,
        gridset: impl Into<String>,
        format: impl Into<String>,
        rects: impl IntoIterator<Item = CoverageRect>,
    ) -> Result<Self, SeedError> {
        let mut rects: Vec<CoverageRect> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        rects.sort_by_key(|r| r.level);

        if rects.is_empty() {
            return Err(SeedError::InvalidRange {
                reason: "range covers no tile".to_string(),
            });
        }
        if let Some(pair) = rects.windows(2).find(|w| w[0].level == w[1].level) {
            return Err(SeedError::InvalidRange {
                reason: format!("level {} appears more than once", pair[0].level),
            });
        }

        Ok(Self {
            layer: layer.into(),
            gridset: gridset.into(),
            format: format.into(),
            parameters_id: None,
            rects,
            filter: None,
        })
    }

    pub fn with_parameters_id(mut self, parameters_id: Option<String>) -> Self {
        self.parameters_id = parameters_id;
        self
    }

    /// Restrict the range to tiles accepted by `filter`.
    pub fn with_filter(mut self, filter: Arc<dyn TileFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn gridset(&self) -> &str {
        &self.gridset
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn parameters_id(&self) -> Option<&str> {
        self.parameters_id.as_deref()
    }

    pub fn filter(&self) -> Option<&Arc<dyn TileFilter>> {
        self.filter.as_ref()
    }

    pub fn zoom_start(&self) -> usize {
        self.rects[0].level
    }

    pub fn zoom_stop(&self) -> usize {
        self.rects[self.rects.len() - 1].level
    }

    /// Rectangles in ascending level order.
    pub fn rects(&self) -> &[CoverageRect] {
        &self.rects
    }

    pub fn rect(&self, level: usize) -> Option<&CoverageRect> {
        self.rects.iter().find(|r| r.level == level)
    }

    /// Whether `index` is inside the rectangles and accepted by the filter.
    pub fn contains(&self, index: TileIndex) -> bool {
        let Some(level) = index.level() else {
            return false;
        };
        self.rect(level).is_some_and(|r| r.contains(index.x, index.y))
            && self.accepts(index.x, index.y, level)
    }

    /// Filter check alone; always true for an unfiltered range.
    pub(crate) fn accepts(&self, x: i64, y: i64, level: usize) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.contains(x, y, level))
    }

    /// Number of tiles in the rectangles, ignoring the filter.
    pub fn tile_count(&self) -> u64 {
        self.rects.iter().map(CoverageRect::tile_count).sum()
    }

    /// Number of tiles in the rectangles that the filter accepts.
    pub fn accepted_tile_count(&self) -> u64 {
        match &self.filter {
            Some(filter) => self.rects.iter().map(|rect| filter.accepted_count(rect)).sum(),
            None => self.tile_count(),
        }
    }
}

/// Deepest level rasterised by a mask unless configured otherwise.
pub const DEFAULT_MAX_MASK_LEVEL: usize = 10;

/// Largest bitmap a mask allocates for one level, in tiles.
const MAX_MASK_TILES: u64 = 1 << 24;

/// Tile filter rasterised from a set of bounding boxes.
///
/// Keeps one bitmap per level of the range up to a maximum mask level, each
/// sized to the masked area of that level. Deeper levels are answered by
/// mapping the tile back onto the mask level's bitmap, which is coarser but
/// never misses a covered area.
#[derive(Debug)]
pub struct RasterMask {
    mask_level: Option<usize>,
    full: BTreeMap<usize, CoverageRect>,
    covered: BTreeMap<usize, CoverageRect>,
    bitmaps: BTreeMap<usize, Bitmap>,
}

#[derive(Debug)]
struct Bitmap {
    rect: CoverageRect,
    words: Vec<u64>,
}

impl Bitmap {
    fn new(rect: CoverageRect) -> Self {
        let bits = rect.tile_count() as usize;
        Self {
            rect,
            words: vec![0; bits.div_ceil(64)],
        }
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if !self.rect.contains(x, y) {
            return None;
        }
        let col = (x - self.rect.min_x) as usize;
        let row = (y - self.rect.min_y) as usize;
        Some(row * self.rect.width() as usize + col)
    }

    fn fill(&mut self, area: &CoverageRect) {
        for y in area.min_y..=area.max_y {
            for x in area.min_x..=area.max_x {
                if let Some(bit) = self.offset(x, y) {
                    self.words[bit / 64] |= 1 << (bit % 64);
                }
            }
        }
    }

    fn get(&self, x: i64, y: i64) -> bool {
        self.offset(x, y)
            .is_some_and(|bit| self.words[bit / 64] & (1 << (bit % 64)) != 0)
    }

    fn count_within(&self, area: &CoverageRect) -> u64 {
        let mut count = 0;
        for y in area.min_y..=area.max_y {
            for x in area.min_x..=area.max_x {
                if self.get(x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    fn set_tiles(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let width = self.rect.width() as usize;
        self.words.iter().enumerate().flat_map(move |(word, bits)| {
            (0..64usize)
                .filter(move |bit| bits & (1 << bit) != 0)
                .map(move |bit| {
                    let offset = word * 64 + bit;
                    (
                        self.rect.min_x + (offset % width) as i64,
                        self.rect.min_y + (offset / width) as i64,
                    )
                })
        })
    }
}

/// Smallest rectangle holding every rectangle of `rects`.
fn enclosing_rect(rects: &[CoverageRect]) -> Option<CoverageRect> {
    rects.iter().copied().reduce(|a, b| {
        CoverageRect::new(
            a.min_x.min(b.min_x),
            a.min_y.min(b.min_y),
            a.max_x.max(b.max_x),
            a.max_y.max(b.max_y),
            a.level,
        )
    })
}

/// Number of fine cells in `lo..=hi` that map onto coarse cell `cell`.
///
/// A fine offset `o` maps onto `o * coarse / fine`, rounded down.
fn preimage_len(cell: i64, coarse: u64, fine: u64, fine_min: i64, lo: i64, hi: i64) -> u64 {
    let (cell, coarse, fine) = (cell as u128, coarse as u128, fine as u128);
    let first = fine_min + (cell * fine).div_ceil(coarse) as i64;
    let last = fine_min + ((cell + 1) * fine).div_ceil(coarse) as i64 - 1;
    let (first, last) = (first.max(lo), last.min(hi));
    if last < first {
        0
    } else {
        (last - first + 1) as u64
    }
}

impl RasterMask {
    /// Rasterise `bounds` over the rectangles of a range.
    ///
    /// Each level of `rects` is masked within its own rectangle, so a range
    /// clipped by zoom levels or bounds only pays for the area it covers.
    /// Bitmaps are kept up to `max_mask_level`, stopping earlier at the
    /// first level whose masked area would not fit a bitmap.
    pub fn new(
        subset: &GridSubset,
        rects: &[CoverageRect],
        bounds: &[BoundingBox],
        max_mask_level: usize,
    ) -> Self {
        let hits_at = |level: usize| -> Vec<CoverageRect> {
            bounds
                .iter()
                .filter_map(|bbox| subset.coverage_intersection(level, bbox))
                .collect()
        };

        let mut mask_level = None;
        if let Some(deepest) = rects.iter().map(|r| r.level).max() {
            for level in subset.zoom_start()..=deepest.min(max_mask_level) {
                let fits = enclosing_rect(&hits_at(level))
                    .map_or(true, |area| area.tile_count() <= MAX_MASK_TILES);
                if !fits {
                    break;
                }
                mask_level = Some(level);
            }
        }

        let mut full = BTreeMap::new();
        let mut covered = BTreeMap::new();
        let mut bitmaps = BTreeMap::new();

        for rect in rects {
            let (level, Some(coverage)) = (rect.level, subset.coverage(rect.level)) else {
                continue;
            };
            let hits: Vec<CoverageRect> = hits_at(level)
                .iter()
                .filter_map(|hit| hit.intersection(rect))
                .collect();
            let Some(area) = enclosing_rect(&hits) else {
                continue;
            };

            if mask_level.is_some_and(|mask| level <= mask) {
                let mut bitmap = Bitmap::new(area);
                for hit in &hits {
                    bitmap.fill(hit);
                }
                bitmaps.insert(level, bitmap);
            }
            full.insert(level, coverage);
            covered.insert(level, area);
        }

        // Levels past the mask level need a bitmap to map onto, even when
        // the mask level itself is outside the range.
        if let Some(mask) = mask_level {
            let deeper = covered.keys().next_back().is_some_and(|&level| level > mask);
            if deeper && !bitmaps.contains_key(&mask) {
                let hits = hits_at(mask);
                let area = enclosing_rect(&hits);
                if let (Some(area), Some(coverage)) = (area, subset.coverage(mask)) {
                    let mut bitmap = Bitmap::new(area);
                    for hit in &hits {
                        bitmap.fill(hit);
                    }
                    bitmaps.insert(mask, bitmap);
                    full.insert(mask, coverage);
                }
            }
        }

        Self {
            mask_level,
            full,
            covered,
            bitmaps,
        }
    }

    /// Rasterise `bounds` over every level of `subset`.
    pub fn from_bounds(subset: &GridSubset, bounds: &[BoundingBox], max_mask_level: usize) -> Self {
        Self::new(subset, subset.coverages(), bounds, max_mask_level)
    }

    /// Tight rectangles around the masked area, one per level that has any.
    pub fn covered_rects(&self) -> Vec<CoverageRect> {
        self.covered.values().copied().collect()
    }

    /// Deepest level backed by its own bitmap.
    pub fn mask_level(&self) -> Option<usize> {
        self.mask_level
    }

    /// Bitmap, full coverage of `level` and full coverage of the bitmap's
    /// level, for a level answered by downsampling.
    fn downsampled(&self, level: usize) -> Option<(&Bitmap, CoverageRect, CoverageRect)> {
        let mask = self.mask_level?;
        Some((
            self.bitmaps.get(&mask)?,
            *self.full.get(&level)?,
            *self.full.get(&mask)?,
        ))
    }
}

impl TileFilter for RasterMask {
    fn contains(&self, x: i64, y: i64, level: usize) -> bool {
        if !self.covered.get(&level).is_some_and(|rect| rect.contains(x, y)) {
            return false;
        }
        if let Some(bitmap) = self.bitmaps.get(&level) {
            return bitmap.get(x, y);
        }
        if self.mask_level.is_none() {
            // Even the first level was too large to rasterise
            return true;
        }

        // Map onto the mask level by relative position in the coverage
        let Some((bitmap, requested, available)) = self.downsampled(level) else {
            return false;
        };
        let mx = available.min_x
            + ((x - requested.min_x) as u128 * available.width() as u128
                / requested.width() as u128) as i64;
        let my = available.min_y
            + ((y - requested.min_y) as u128 * available.height() as u128
                / requested.height() as u128) as i64;
        bitmap.get(mx, my)
    }

    fn accepted_count(&self, rect: &CoverageRect) -> u64 {
        let Some(area) = self
            .covered
            .get(&rect.level)
            .and_then(|covered| covered.intersection(rect))
        else {
            return 0;
        };
        if let Some(bitmap) = self.bitmaps.get(&rect.level) {
            return bitmap.count_within(&area);
        }
        if self.mask_level.is_none() {
            return area.tile_count();
        }

        let Some((bitmap, requested, available)) = self.downsampled(rect.level) else {
            return 0;
        };
        bitmap
            .set_tiles()
            .map(|(mx, my)| {
                let cols = preimage_len(
                    mx - available.min_x,
                    available.width(),
                    requested.width(),
                    requested.min_x,
                    area.min_x,
                    area.max_x,
                );
                let rows = preimage_len(
                    my - available.min_y,
                    available.height(),
                    requested.height(),
                    requested.min_y,
                    area.min_y,
                    area.max_y,
                );
                cols * rows
            })
            .sum()
    }
}
