//! Tile service layer.
//!
//! This module serves tiles of the configured layers over the blob store:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        HTTP Handlers / Seeder           │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  BlobStore   │  │  RuntimeStats   │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ on a miss
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        TileLayer → TileSource           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: cache-then-render pipeline, also used by the seeder
//! - [`TileRequest`] / [`TileResponse`]: one tile in, one tile out
//! - [`RuntimeStats`]: request, hit and byte counters

mod service;
mod stats;

pub use service::{ResolvedTile, SeedOutcome, TileRequest, TileResponse, TileService};
pub use stats::{CacheResult, LayerStats, RuntimeStats, StatsSnapshot};
