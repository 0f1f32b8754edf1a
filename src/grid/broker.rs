//! Gridset registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::ConfigError;

use super::defaults::DefaultGridsets;
use super::gridset::GridSet;

/// Name-keyed registry of gridsets.
///
/// One broker exists per running cache and is handed to the configuration
/// loader, the layers and the seeder explicitly. Lookups take a read lock,
/// registration a write lock.
#[derive(Debug)]
pub struct GridSetBroker {
    gridsets: RwLock<HashMap<String, Arc<GridSet>>>,
    embedded: BTreeSet<String>,
    world_epsg4326: Arc<GridSet>,
    world_epsg3857: Arc<GridSet>,
}

impl GridSetBroker {
    /// Create a broker holding the built-in gridsets.
    pub fn new(defaults: DefaultGridsets) -> Result<Self, ConfigError> {
        let mut gridsets = HashMap::new();
        let mut built = defaults.build()?.into_iter().map(Arc::new);

        let world_epsg4326 = built
            .next()
            .ok_or_else(|| ConfigError::UnknownGridSet(defaults.epsg4326_name().to_string()))?;
        let world_epsg3857 = built
            .next()
            .ok_or_else(|| ConfigError::UnknownGridSet(defaults.epsg3857_name().to_string()))?;

        for gridset in [world_epsg4326.clone(), world_epsg3857.clone()]
            .into_iter()
            .chain(built)
        {
            debug!(gridset = %gridset.name(), "Adding built-in gridset");
            gridsets.insert(gridset.name().to_string(), gridset);
        }

        let embedded = gridsets.keys().cloned().collect();

        Ok(Self {
            gridsets: RwLock::new(gridsets),
            embedded,
            world_epsg4326,
            world_epsg3857,
        })
    }

    /// Register a new gridset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateGridSet`] when the name is taken.
    pub fn add(&self, gridset: GridSet) -> Result<Arc<GridSet>, ConfigError> {
        let mut gridsets = self.gridsets.write().unwrap_or_else(PoisonError::into_inner);
        if gridsets.contains_key(gridset.name()) {
            return Err(ConfigError::DuplicateGridSet(gridset.name().to_string()));
        }

        debug!(gridset = %gridset.name(), "Adding gridset");
        let gridset = Arc::new(gridset);
        gridsets.insert(gridset.name().to_string(), gridset.clone());
        Ok(gridset)
    }

    /// Register a gridset, replacing any previous one with the same name.
    ///
    /// Layers built against the replaced instance keep their reference to it.
    pub fn put(&self, gridset: GridSet) -> Arc<GridSet> {
        let mut gridsets = self.gridsets.write().unwrap_or_else(PoisonError::into_inner);
        let gridset = Arc::new(gridset);
        if gridsets
            .insert(gridset.name().to_string(), gridset.clone())
            .is_some()
        {
            warn!(
                gridset = %gridset.name(),
                "Duplicate gridset replaced, layers may still reference the previous instance"
            );
        }
        gridset
    }

    pub fn get(&self, name: &str) -> Option<Arc<GridSet>> {
        self.gridsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Remove a gridset without checking whether layers still use it.
    pub fn remove(&self, name: &str) -> Option<Arc<GridSet>> {
        self.gridsets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let gridsets = self.gridsets.read().unwrap_or_else(PoisonError::into_inner);
        let names: BTreeSet<&String> = gridsets.keys().collect();
        names.into_iter().cloned().collect()
    }

    /// Names of the built-in gridsets.
    pub fn embedded_names(&self) -> &BTreeSet<String> {
        &self.embedded
    }

    pub fn gridsets(&self) -> Vec<Arc<GridSet>> {
        self.gridsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn world_epsg4326(&self) -> Arc<GridSet> {
        self.world_epsg4326.clone()
    }

    pub fn world_epsg3857(&self) -> Arc<GridSet> {
        self.world_epsg3857.clone()
    }
}
