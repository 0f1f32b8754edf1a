//! Tile Service for serving and seeding cached tiles.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Request validation (layer, gridset, format, coverage, parameters)
//! - Store lookups
//! - Rendering through the layer's source on a miss
//! - Writing rendered tiles back to the store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Resolve layer       4. Render through the source    │    │
//! │  │  2. Check coverage      5. Store if the level is cached │    │
//! │  │  3. Read the store      6. Count & return               │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │  ┌──────────────────┐   ┌────────────┐     ┌──────────────┐     │
//! │  │TileLayerDispatcher│  │ BlobStore  │     │ RuntimeStats │     │
//! │  └──────────────────┘   └────────────┘     └──────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::TileError;
use crate::grid::{GridSubset, TileIndex};
use crate::layer::{MimeType, TileLayer, TileLayerDispatcher};
use crate::storage::{BlobStore, TileKey};

use super::stats::{CacheResult, RuntimeStats};

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one tile of a layer.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub layer: String,
    pub gridset: String,
    pub format: MimeType,
    pub index: TileIndex,

    /// Raw request parameters; only the layer's filtered keys are used
    pub parameters: BTreeMap<String, String>,
}

impl TileRequest {
    pub fn new(
        layer: impl Into<String>,
        gridset: impl Into<String>,
        format: MimeType,
        index: TileIndex,
    ) -> Self {
        Self {
            layer: layer.into(),
            gridset: gridset.into(),
            format,
            index,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// A served tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,
    pub format: MimeType,
    pub cache_result: CacheResult,

    /// Client cache lifetime configured on the layer
    pub max_age: Option<u64>,
}

impl TileResponse {
    pub fn cache_hit(&self) -> bool {
        self.cache_result == CacheResult::Hit
    }
}

/// What seeding a tile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Already stored, left alone
    Present,
    /// Rendered and stored
    Rendered,
}

/// A tile resolved against its layer and subset, ready to be rendered or stored.
#[derive(Debug, Clone)]
pub struct ResolvedTile {
    pub layer: Arc<TileLayer>,
    pub subset: Arc<GridSubset>,
    pub format: MimeType,
    pub index: TileIndex,
    pub parameters: BTreeMap<String, String>,
    pub key: TileKey,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Cache-then-render pipeline over the configured layers.
pub struct TileService {
    dispatcher: Arc<TileLayerDispatcher>,
    store: Arc<dyn BlobStore>,
    stats: Arc<RuntimeStats>,
}

impl TileService {
    pub fn new(dispatcher: Arc<TileLayerDispatcher>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            dispatcher,
            store,
            stats: Arc::new(RuntimeStats::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<TileLayerDispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<RuntimeStats> {
        &self.stats
    }

    /// Validate a request and compute its storage key.
    ///
    /// # Errors
    ///
    /// - [`TileError::LayerNotFound`] for an unknown layer
    /// - [`TileError::GridSetNotSupported`] when the layer is not in the gridset
    /// - [`TileError::FormatNotSupported`] for a format the layer does not offer
    /// - [`TileError::Grid`] when the index is outside the coverage
    /// - [`TileError::InvalidRequest`] for a rejected parameter value
    pub fn resolve(&self, request: &TileRequest) -> Result<ResolvedTile, TileError> {
        let layer = self.dispatcher.layer(&request.layer)?;
        let subset = layer
            .grid_subset(&request.gridset)
            .cloned()
            .ok_or_else(|| TileError::GridSetNotSupported {
                layer: request.layer.clone(),
                gridset: request.gridset.clone(),
            })?;
        if !layer.supports_format(request.format) {
            return Err(TileError::FormatNotSupported {
                layer: request.layer.clone(),
                format: request.format.to_string(),
            });
        }
        subset.check_coverage(request.index)?;

        let parameters = layer.filter_parameters(&request.parameters)?;
        let key = TileKey::new(
            layer.name(),
            subset.name(),
            request.format.extension(),
            request.index,
        )
        .with_parameters_id(layer.parameters_id(&parameters));

        Ok(ResolvedTile {
            layer,
            subset,
            format: request.format,
            index: request.index,
            parameters,
            key,
        })
    }

    /// Serve a tile from the store, rendering and storing it on a miss.
    ///
    /// Levels outside the subset's cached range are rendered on every request
    /// and never stored.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let result = self.get_tile_inner(&request).await;
        match &result {
            Ok(response) => {
                self.stats
                    .record(&request.layer, response.cache_result, response.data.len())
            }
            Err(_) => self.stats.record_error(),
        }
        result
    }

    async fn get_tile_inner(&self, request: &TileRequest) -> Result<TileResponse, TileError> {
        let tile = self.resolve(request)?;
        let max_age = tile.layer.max_age();
        let cacheable = tile
            .index
            .level()
            .is_some_and(|level| tile.subset.should_cache_at_zoom(level));

        if cacheable {
            if let Some(data) = self.store.get(&tile.key).await? {
                return Ok(TileResponse {
                    data,
                    format: tile.format,
                    cache_result: CacheResult::Hit,
                    max_age,
                });
            }
        }

        let data = self.render(&tile).await?;
        let cache_result = if cacheable {
            self.store.put(&tile.key, data.clone()).await?;
            CacheResult::Miss
        } else {
            CacheResult::Uncached
        };

        Ok(TileResponse {
            data,
            format: tile.format,
            cache_result,
            max_age,
        })
    }

    /// Render a resolved tile through its layer's source.
    pub async fn render(&self, tile: &ResolvedTile) -> Result<Bytes, TileError> {
        let request = tile.layer.render_request(
            &tile.subset,
            tile.index,
            tile.format,
            tile.parameters.clone(),
        )?;
        debug!(tile = %tile.key, "Rendering tile");
        Ok(tile.layer.source().render(&request).await?)
    }

    /// Make sure a tile is stored.
    ///
    /// With `try_cache` an already stored tile is left alone; without it the
    /// tile is always rendered again.
    pub async fn seed_tile(
        &self,
        tile: &ResolvedTile,
        try_cache: bool,
    ) -> Result<SeedOutcome, TileError> {
        if try_cache && self.store.exists(&tile.key).await? {
            return Ok(SeedOutcome::Present);
        }
        let data = self.render(tile).await?;
        self.store.put(&tile.key, data).await?;
        Ok(SeedOutcome::Rendered)
    }

    /// Remove a tile from the store; returns whether it was stored.
    pub async fn truncate_tile(&self, key: &TileKey) -> Result<bool, TileError> {
        Ok(self.store.delete(key).await?)
    }
}

// =============================================================================
// Tests
// =============================================================================
