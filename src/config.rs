//! Configuration management for geotile-cache.
//!
//! Two layers of configuration:
//! - Command-line arguments via clap, every flag also readable from an
//!   environment variable with the `GEOTILE_` prefix
//! - A JSON catalog of gridsets and layers, loaded and validated once at
//!   startup by [`Configuration::build`]
//!
//! # Environment Variables
//!
//! - `GEOTILE_HOST` - Server bind address (default: 0.0.0.0)
//! - `GEOTILE_PORT` - Server port (default: 8080)
//! - `GEOTILE_CONFIG` - Path of the JSON catalog (required)
//! - `GEOTILE_CACHE_DIR` - Tile directory; tiles stay in memory only without it
//! - `GEOTILE_MEMORY_CACHE` - In-memory tile cache size in bytes (default: 100MB)
//! - `GEOTILE_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `GEOTILE_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `GEOTILE_SEED_THREADS` - Cap on workers per seed job (default: 16)
//! - `GEOTILE_LEGACY_GRIDSET_NAMES` - Name world gridsets after their SRS (default: true)
//! - `GEOTILE_EPSG_900913_NAME` - Publish spherical mercator as EPSG:900913
//!
//! # Catalog
//!
//! ```json
//! {
//!   "gridsets": [{
//!     "name": "EPSG:2163", "srs": "EPSG:2163",
//!     "extent": [-2495667.977678598, -2223677.196231552, 3291070.6104286816, 959189.3312465074],
//!     "levels": 12
//!   }],
//!   "layers": [{
//!     "name": "states",
//!     "formats": ["png", "jpeg"],
//!     "subsets": [{ "gridset": "EPSG:4326", "zoom_stop": 10 }],
//!     "source": { "type": "wms", "url": "http://localhost:8080/geoserver/wms", "layers": "topp:states" }
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::grid::{
    BoundingBox, DefaultGridsets, GridSetBroker, GridSetFactory, GridSetSpec, GridSubset,
    ResolutionSpec, Srs, TileOrigin, DEFAULT_PIXEL_SIZE_METER, DEFAULT_TILE_SIZE,
};
use crate::layer::{
    MimeType, ParameterFilter, TileLayer, TileLayerDispatcher, WmsSource, DEFAULT_META_FACTORS,
};
use crate::seed::{SeedType, DEFAULT_MAX_THREADS};
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::storage::DEFAULT_MEMORY_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

// =============================================================================
// CLI Arguments
// =============================================================================

/// geotile-cache - A tile cache server for map data.
///
/// Serves tiles of WMS layers over TMS, WMTS, tiled WMS and KML, caching them
/// in memory and on disk, and seeds or truncates the cache in bulk.
#[derive(Parser, Debug, Clone)]
#[command(name = "geotile-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the tile server
    Serve(ServeConfig),

    /// Seed, reseed or truncate a layer and exit
    Seed(SeedConfig),

    /// Load the catalog and print its gridsets and layers
    Check(CheckConfig),
}

/// Where the catalog comes from and how built-in gridsets are named.
#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    /// Path of the JSON gridset and layer catalog.
    #[arg(short, long, env = "GEOTILE_CONFIG")]
    pub config: PathBuf,

    /// Name the world gridsets EPSG:4326 and EPSG:3857 instead of their
    /// OGC well-known names.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        env = "GEOTILE_LEGACY_GRIDSET_NAMES"
    )]
    pub legacy_gridset_names: bool,

    /// Publish spherical mercator as EPSG:900913 (legacy names only).
    #[arg(long, default_value_t = false, env = "GEOTILE_EPSG_900913_NAME")]
    pub epsg_900913_name: bool,
}

impl CatalogArgs {
    pub fn naming(&self) -> DefaultGridsets {
        DefaultGridsets {
            use_epsg900913: self.epsg_900913_name,
            use_legacy_names: self.legacy_gridset_names,
        }
    }

    /// Load and validate the catalog.
    pub fn load(&self) -> Result<Catalog, ConfigError> {
        Configuration::load(&self.config)?.build(self.naming())
    }
}

/// Arguments of `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "GEOTILE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "GEOTILE_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Directory for stored tiles. Without it tiles are only kept in memory.
    #[arg(long, env = "GEOTILE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// In-memory tile cache size in bytes.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "GEOTILE_MEMORY_CACHE")]
    pub memory_cache: usize,

    /// HTTP Cache-Control max-age in seconds for layers without their own.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "GEOTILE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Cap on the number of workers of one seed job.
    #[arg(long, default_value_t = DEFAULT_MAX_THREADS, env = "GEOTILE_SEED_THREADS")]
    pub seed_threads: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "GEOTILE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.memory_cache == 0 {
            return Err("memory_cache must be greater than 0".to_string());
        }
        if self.seed_threads == 0 {
            return Err("seed_threads must be greater than 0".to_string());
        }
        if self.catalog.epsg_900913_name && !self.catalog.legacy_gridset_names {
            return Err("--epsg-900913-name requires legacy gridset names".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Arguments of `seed`.
#[derive(Args, Debug, Clone)]
pub struct SeedConfig {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Directory for stored tiles.
    #[arg(long, env = "GEOTILE_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Layer to work on.
    #[arg(long)]
    pub layer: String,

    /// Gridset name (default: the layer's first).
    #[arg(long)]
    pub gridset: Option<String>,

    /// Format as MIME type or extension (default: the layer's first).
    #[arg(long)]
    pub format: Option<MimeType>,

    #[arg(long)]
    pub zoom_start: Option<usize>,

    #[arg(long)]
    pub zoom_stop: Option<usize>,

    /// Area as minx,miny,maxx,maxy in the gridset's SRS.
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<BoundingBox>,

    /// Number of workers.
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Meta factors as x,y, overriding the layer's.
    #[arg(long, value_delimiter = ',')]
    pub meta_factors: Option<Vec<u32>>,

    /// seed, reseed or truncate.
    #[arg(long = "type", default_value = "seed")]
    pub seed_type: SeedType,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SeedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("threads must be greater than 0".to_string());
        }
        if let (Some(start), Some(stop)) = (self.zoom_start, self.zoom_stop) {
            if start > stop {
                return Err(format!("zoom_start {} is after zoom_stop {}", start, stop));
            }
        }
        if let Some(meta) = &self.meta_factors {
            if meta.len() != 2 || meta.contains(&0) {
                return Err("meta_factors must be two positive numbers".to_string());
            }
        }
        Ok(())
    }

    pub fn meta_factors(&self) -> Option<[u32; 2]> {
        match self.meta_factors.as_deref() {
            Some([x, y]) => Some([*x, *y]),
            _ => None,
        }
    }
}

/// Arguments of `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Catalog
// =============================================================================

/// The JSON catalog of gridsets and layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub gridsets: Vec<GridSetConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

fn default_pixel_size() -> f64 {
    DEFAULT_PIXEL_SIZE_METER
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_true() -> bool {
    true
}

/// A custom gridset.
///
/// Exactly one of `resolutions`, `scale_denominators` or `levels` describes
/// the levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSetConfig {
    pub name: String,
    /// `EPSG:nnnn` or an OGC URN
    pub srs: String,
    pub extent: BoundingBox,
    #[serde(default)]
    pub origin: TileOrigin,
    #[serde(flatten)]
    pub resolutions: ResolutionSpec,
    #[serde(default)]
    pub meters_per_unit: Option<f64>,
    #[serde(default = "default_pixel_size")]
    pub pixel_size: f64,
    #[serde(default)]
    pub scale_names: Option<Vec<String>>,
    #[serde(default = "default_tile_size")]
    pub tile_width: u32,
    #[serde(default = "default_tile_size")]
    pub tile_height: u32,
    #[serde(default)]
    pub y_coordinate_first: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl GridSetConfig {
    pub fn to_spec(&self) -> Result<GridSetSpec, ConfigError> {
        let srs: Srs = self.srs.parse().map_err(|e: crate::error::GridError| {
            ConfigError::InvalidGridSet {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut spec = GridSetSpec::new(&self.name, srs, self.extent, self.resolutions.clone())
            .with_origin(self.origin)
            .with_pixel_size(self.pixel_size)
            .with_tile_size(self.tile_width, self.tile_height)
            .with_y_coordinate_first(self.y_coordinate_first);
        if let Some(meters_per_unit) = self.meters_per_unit {
            spec = spec.with_meters_per_unit(meters_per_unit);
        }
        if let Some(names) = &self.scale_names {
            spec = spec.with_scale_names(names.clone());
        }
        if let Some(description) = &self.description {
            spec = spec.with_description(description);
        }
        Ok(spec)
    }
}

/// A layer of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Defaults to PNG only
    #[serde(default)]
    pub formats: Vec<MimeType>,
    #[serde(default)]
    pub meta_factors: Option<[u32; 2]>,
    /// Client cache lifetime in seconds
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub parameter_filters: Vec<ParameterFilter>,
    /// Defaults to the full world gridsets
    #[serde(default)]
    pub subsets: Vec<SubsetConfig>,
    pub source: SourceConfig,
}

/// Where a layer is available within a gridset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetConfig {
    pub gridset: String,
    #[serde(default)]
    pub extent: Option<BoundingBox>,
    #[serde(default)]
    pub zoom_start: Option<usize>,
    #[serde(default)]
    pub zoom_stop: Option<usize>,
    #[serde(default)]
    pub min_cached_level: Option<usize>,
    #[serde(default)]
    pub max_cached_level: Option<usize>,
}

impl SubsetConfig {
    pub fn full(gridset: impl Into<String>) -> Self {
        Self {
            gridset: gridset.into(),
            extent: None,
            zoom_start: None,
            zoom_stop: None,
            min_cached_level: None,
            max_cached_level: None,
        }
    }
}

/// Upstream renderer of a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Wms {
        url: String,
        /// Upstream `LAYERS`, defaults to the layer name
        #[serde(default)]
        layers: Option<String>,
        #[serde(default)]
        styles: String,
        #[serde(default = "default_true")]
        transparent: bool,
        #[serde(default)]
        vendor_parameters: BTreeMap<String, String>,
    },
}

/// Validated gridsets and layers.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub broker: Arc<GridSetBroker>,
    pub dispatcher: Arc<TileLayerDispatcher>,
}

impl Configuration {
    /// Read a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override the meta factors of one layer.
    pub fn set_meta_factors(&mut self, layer: &str, meta_factors: [u32; 2]) -> Result<(), ConfigError> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.name == layer)
            .ok_or_else(|| ConfigError::InvalidLayer {
                name: layer.to_string(),
                reason: "not in the catalog".to_string(),
            })?;
        layer.meta_factors = Some(meta_factors);
        Ok(())
    }

    /// Build the gridset broker and the layer dispatcher.
    ///
    /// Custom gridsets are registered after the built-in ones; a custom
    /// gridset reusing a name replaces the earlier definition with a warning.
    ///
    /// # Errors
    ///
    /// Any invalid gridset or layer fails the whole catalog.
    pub fn build(&self, naming: DefaultGridsets) -> Result<Catalog, ConfigError> {
        let broker = Arc::new(GridSetBroker::new(naming)?);
        for config in &self.gridsets {
            let gridset = GridSetFactory::create(config.to_spec()?)?;
            if broker.get(gridset.name()).is_some() {
                broker.put(gridset);
            } else {
                broker.add(gridset)?;
            }
        }

        let dispatcher = Arc::new(TileLayerDispatcher::new());
        for config in &self.layers {
            let layer = build_layer(config, &broker, naming)?;
            dispatcher.add(layer)?;
        }

        info!(
            gridsets = broker.names().len(),
            layers = dispatcher.len(),
            "Catalog loaded"
        );
        Ok(Catalog { broker, dispatcher })
    }
}

fn build_layer(
    config: &LayerConfig,
    broker: &GridSetBroker,
    naming: DefaultGridsets,
) -> Result<TileLayer, ConfigError> {
    let source = match &config.source {
        SourceConfig::Wms {
            url,
            layers,
            styles,
            transparent,
            vendor_parameters,
        } => WmsSource::new(url, layers.as_deref().unwrap_or(&config.name))?
            .with_styles(styles.as_str())
            .with_transparent(*transparent)
            .with_vendor_parameters(vendor_parameters.clone()),
    };

    let subsets = if config.subsets.is_empty() {
        vec![
            SubsetConfig::full(naming.epsg4326_name()),
            SubsetConfig::full(naming.epsg3857_name()),
        ]
    } else {
        config.subsets.clone()
    };

    let mut layer = TileLayer::new(&config.name, Arc::new(source))
        .with_meta_factors(config.meta_factors.unwrap_or(DEFAULT_META_FACTORS))
        .with_parameter_filters(config.parameter_filters.clone())
        .with_max_age(config.max_age);
    if !config.formats.is_empty() {
        layer = layer.with_formats(config.formats.clone());
    }

    for subset in &subsets {
        let gridset = broker
            .get(&subset.gridset)
            .ok_or_else(|| ConfigError::UnknownGridSet(subset.gridset.clone()))?;
        if subset.extent.is_some_and(|extent| !extent.is_sane()) {
            warn!(
                layer = %config.name,
                gridset = %subset.gridset,
                "Subset extent is not sane"
            );
        }
        layer = layer.with_subset(GridSubset::new(
            gridset,
            subset.extent,
            subset.zoom_start,
            subset.zoom_stop,
            subset.min_cached_level,
            subset.max_cached_level,
        )?);
    }

    Ok(layer)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_config() -> ServeConfig {
        ServeConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            catalog: CatalogArgs {
                config: PathBuf::from("catalog.json"),
                legacy_gridset_names: true,
                epsg_900913_name: false,
            },
            cache_dir: None,
            memory_cache: 1024,
            cache_max_age: 7200,
            seed_threads: 4,
            cors_origins: None,
            verbose: false,
            no_tracing: false,
        }
    }

    const CATALOG: &str = r#"{
        "gridsets": [{
            "name": "EPSG:2163",
            "srs": "EPSG:2163",
            "extent": [-2495667.977678598, -2223677.196231552, 3291070.6104286816, 959189.3312465074],
            "levels": 12
        }, {
            "name": "fixed",
            "srs": "EPSG:3857",
            "extent": [-20037508.34, -20037508.34, 20037508.34, 20037508.34],
            "origin": "top_left",
            "resolutions": [156543.03390625, 78271.516953125, 39135.7584765625]
        }],
        "layers": [{
            "name": "states",
            "formats": ["png", "image/jpeg"],
            "meta_factors": [3, 3],
            "max_age": 600,
            "parameter_filters": [{ "key": "STYLES", "default": "", "values": ["", "pophatch"] }],
            "subsets": [
                { "gridset": "EPSG:4326", "extent": [-125, 24, -66, 50], "zoom_stop": 10 },
                { "gridset": "EPSG:2163" }
            ],
            "source": { "type": "wms", "url": "http://localhost:8080/geoserver/wms", "layers": "topp:states" }
        }, {
            "name": "world",
            "source": { "type": "wms", "url": "http://localhost:8080/geoserver/wms" }
        }]
    }"#;

    #[test]
    fn test_valid_serve_config() {
        let config = serve_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_serve_config() {
        let mut config = serve_config();
        config.memory_cache = 0;
        assert!(config.validate().is_err());

        let mut config = serve_config();
        config.seed_threads = 0;
        assert!(config.validate().is_err());

        let mut config = serve_config();
        config.catalog.legacy_gridset_names = false;
        config.catalog.epsg_900913_name = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "geotile-cache",
            "seed",
            "--config",
            "catalog.json",
            "--cache-dir",
            "/tmp/tiles",
            "--layer",
            "states",
            "--format",
            "image/png",
            "--bbox",
            "-10,-10,10,10",
            "--type",
            "truncate",
            "--meta-factors",
            "2,2",
        ])
        .unwrap();

        let Command::Seed(seed) = cli.into_command() else {
            panic!("expected the seed command");
        };
        assert_eq!(seed.layer, "states");
        assert_eq!(seed.format, Some(MimeType::Png));
        assert_eq!(seed.bbox, Some(BoundingBox::new(-10.0, -10.0, 10.0, 10.0)));
        assert_eq!(seed.seed_type, SeedType::Truncate);
        assert_eq!(seed.meta_factors(), Some([2, 2]));
        assert!(seed.catalog.legacy_gridset_names);
        assert!(seed.validate().is_ok());
    }

    #[test]
    fn test_cli_gridset_naming() {
        let cli = Cli::try_parse_from([
            "geotile-cache",
            "check",
            "--config",
            "catalog.json",
            "--legacy-gridset-names",
            "false",
        ])
        .unwrap();

        let Command::Check(check) = cli.into_command() else {
            panic!("expected the check command");
        };
        let naming = check.catalog.naming();
        assert!(!naming.use_legacy_names);
        assert_eq!(naming.epsg4326_name(), "GlobalCRS84Geometric");
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    #[test]
    fn test_catalog_build() {
        let catalog = Configuration::from_json(CATALOG)
            .unwrap()
            .build(DefaultGridsets::default())
            .unwrap();

        let custom = catalog.broker.get("EPSG:2163").unwrap();
        assert_eq!(custom.num_levels(), 12);
        let fixed = catalog.broker.get("fixed").unwrap();
        assert_eq!(fixed.num_levels(), 3);
        assert!(fixed.is_top_left_aligned());

        let states = catalog.dispatcher.get("states").unwrap();
        assert_eq!(states.formats(), &[MimeType::Png, MimeType::Jpeg]);
        assert_eq!(states.meta_factors(), [3, 3]);
        assert_eq!(states.max_age(), Some(600));
        assert_eq!(states.gridset_names(), vec!["EPSG:2163", "EPSG:4326"]);
        assert_eq!(states.grid_subset("EPSG:4326").unwrap().zoom_stop(), 10);

        let world = catalog.dispatcher.get("world").unwrap();
        assert_eq!(world.formats(), &[MimeType::Png]);
        assert_eq!(world.gridset_names(), vec!["EPSG:3857", "EPSG:4326"]);
        assert_eq!(world.meta_factors(), DEFAULT_META_FACTORS);
    }

    #[test]
    fn test_catalog_replaces_builtin_gridset() {
        let json = r#"{
            "gridsets": [{
                "name": "EPSG:4326",
                "srs": "EPSG:4326",
                "extent": [-180, -90, 180, 90],
                "levels": 3
            }]
        }"#;
        let catalog = Configuration::from_json(json)
            .unwrap()
            .build(DefaultGridsets::default())
            .unwrap();
        assert_eq!(catalog.broker.get("EPSG:4326").unwrap().num_levels(), 3);
    }

    #[test]
    fn test_catalog_errors() {
        assert!(matches!(
            Configuration::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Configuration::load(Path::new("/nonexistent/catalog.json")),
            Err(ConfigError::Io(_))
        ));

        let unknown_gridset = r#"{"layers": [{
            "name": "states",
            "subsets": [{ "gridset": "EPSG:2163" }],
            "source": { "type": "wms", "url": "http://localhost/wms" }
        }]}"#;
        assert!(matches!(
            Configuration::from_json(unknown_gridset)
                .unwrap()
                .build(DefaultGridsets::default()),
            Err(ConfigError::UnknownGridSet(_))
        ));

        let bad_srs = r#"{"gridsets": [{
            "name": "bad", "srs": "meters", "extent": [0, 0, 1, 1], "levels": 2
        }]}"#;
        assert!(matches!(
            Configuration::from_json(bad_srs)
                .unwrap()
                .build(DefaultGridsets::default()),
            Err(ConfigError::InvalidGridSet { .. })
        ));

        let duplicate_layer = r#"{"layers": [
            { "name": "a", "source": { "type": "wms", "url": "http://localhost/wms" } },
            { "name": "a", "source": { "type": "wms", "url": "http://localhost/wms" } }
        ]}"#;
        assert!(matches!(
            Configuration::from_json(duplicate_layer)
                .unwrap()
                .build(DefaultGridsets::default()),
            Err(ConfigError::InvalidLayer { .. })
        ));

        let bad_url = r#"{"layers": [
            { "name": "a", "source": { "type": "wms", "url": "not a url" } }
        ]}"#;
        assert!(matches!(
            Configuration::from_json(bad_url)
                .unwrap()
                .build(DefaultGridsets::default()),
            Err(ConfigError::InvalidLayer { .. })
        ));
    }

    #[test]
    fn test_set_meta_factors() {
        let mut config = Configuration::from_json(CATALOG).unwrap();
        config.set_meta_factors("world", [1, 1]).unwrap();
        assert_eq!(config.layers[1].meta_factors, Some([1, 1]));
        assert!(config.set_meta_factors("roads", [1, 1]).is_err());
    }
}
