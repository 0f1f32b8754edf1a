//! # geotile-cache
//!
//! A tile cache for map data.
//!
//! Layers are rendered by an upstream WMS, cut into tiles on a multi-resolution
//! grid, stored, and served again through the common tiling protocols. Whole
//! regions can be seeded ahead of time or truncated after the data changed.
//!
//! ## Features
//!
//! - **Tile pyramids**: gridsets from resolutions, scale denominators or a
//!   level count, with the world EPSG:4326 and EPSG:3857 sets built in
//! - **Protocols**: TMS, WMTS (KVP), tiled WMS and KML super-overlays
//! - **Meta-tiling**: neighbouring tiles are rendered in one upstream request
//! - **Two-tier storage**: an LRU memory store in front of a file store
//! - **Seeding**: multi-threaded seed, reseed and truncate jobs with masks,
//!   retries and cancellation
//!
//! ## Architecture
//!
//! - [`grid`] - Gridsets, subsets and tile addressing
//! - [`seed`] - Tile ranges, their iteration and the job scheduler
//! - [`storage`] - Blob stores for encoded tiles
//! - [`layer`] - Layers, formats and upstream sources
//! - [`tile`] - The tile service tying layers to storage
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and catalog types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geotile_cache::{
//!     config::Configuration, create_router, AppState, BreederConfig, DefaultGridsets,
//!     MemoryBlobStore, RouterConfig, TileBreeder, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Configuration::load("catalog.json".as_ref())?
//!         .build(DefaultGridsets::default())?;
//!
//!     let service = Arc::new(TileService::new(
//!         catalog.dispatcher,
//!         Arc::new(MemoryBlobStore::new()),
//!     ));
//!     let breeder = Arc::new(TileBreeder::new(service.clone(), BreederConfig::default()));
//!     let router = create_router(AppState::new(service, breeder), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod layer;
pub mod seed;
pub mod server;
pub mod storage;
pub mod tile;

// Re-export commonly used types
pub use config::{Catalog, CheckConfig, Cli, Command, Configuration, SeedConfig, ServeConfig};
pub use error::{ConfigError, GridError, SeedError, SourceError, StorageError, TileError};
pub use grid::{
    BoundingBox, CoverageRect, DefaultGridsets, Grid, GridSet, GridSetBroker, GridSetFactory,
    GridSetSpec, GridSubset, ResolutionSpec, Srs, TileIndex, TileOrigin,
};
pub use layer::{
    MimeType, ParameterFilter, RenderRequest, TileLayer, TileLayerDispatcher, TileSource,
    WmsSource,
};
pub use seed::{
    BreederConfig, JobInfo, JobStatus, RasterMask, SeedRequest, SeedType, TileBreeder, TileRange,
    TileRangeIterator,
};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore, TieredBlobStore, TileKey};
pub use tile::{CacheResult, TileRequest, TileResponse, TileService};
