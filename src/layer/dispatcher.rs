//! Layer registry.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{ConfigError, TileError};

use super::tile_layer::TileLayer;

/// Name-keyed registry of the configured layers.
#[derive(Debug, Default)]
pub struct TileLayerDispatcher {
    layers: RwLock<BTreeMap<String, Arc<TileLayer>>>,
}

impl TileLayerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidLayer`] when the name is taken or the layer has
    /// no gridset or no format.
    pub fn add(&self, layer: TileLayer) -> Result<Arc<TileLayer>, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLayer {
            name: layer.name().to_string(),
            reason: reason.to_string(),
        };
        if layer.gridset_names().is_empty() {
            return Err(invalid("layer has no gridset"));
        }
        if layer.formats().is_empty() {
            return Err(invalid("layer has no format"));
        }

        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        if layers.contains_key(layer.name()) {
            return Err(invalid("a layer with this name already exists"));
        }

        debug!(layer = %layer.name(), gridsets = ?layer.gridset_names(), "Adding layer");
        let layer = Arc::new(layer);
        layers.insert(layer.name().to_string(), layer.clone());
        Ok(layer)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TileLayer>> {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Like [`get`](Self::get), failing with [`TileError::LayerNotFound`].
    pub fn layer(&self, name: &str) -> Result<Arc<TileLayer>, TileError> {
        self.get(name).ok_or_else(|| TileError::LayerNotFound {
            layer: name.to_string(),
        })
    }

    pub fn remove(&self, name: &str) -> Option<Arc<TileLayer>> {
        self.layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Layer names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn layers(&self) -> Vec<Arc<TileLayer>> {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
