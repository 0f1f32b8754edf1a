//! Seeding and truncation.
//!
//! - [`TileRange`] describes the tiles of a job, optionally narrowed by a
//!   [`TileFilter`] such as a [`RasterMask`]
//! - [`TileRangeIterator`] hands out meta-tile locations to any number of
//!   concurrent workers
//! - [`PartitionedWalk`] splits a range into disjoint column slices, one per
//!   worker, without shared state
//! - [`TileBreeder`] runs jobs over the tile service and tracks their progress

mod breeder;
mod iterator;
mod range;

pub use breeder::{
    BreederConfig, JobInfo, JobStatus, SeedRequest, SeedType, TileBreeder, DEFAULT_MAX_FAILURES,
    DEFAULT_MAX_THREADS, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_WAIT,
};
pub use iterator::{meta_tile_count, PartitionedWalk, TileRangeIterator};
pub use range::{RasterMask, TileFilter, TileRange, DEFAULT_MAX_MASK_LEVEL};
