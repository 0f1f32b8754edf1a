//! geotile-cache - A tile cache server for map data.
//!
//! This binary loads the catalog, builds the storage tiers and either serves
//! tiles over HTTP or runs a single seed job.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geotile_cache::{
    config::{CheckConfig, Cli, Command, Configuration, SeedConfig, ServeConfig},
    seed::{BreederConfig, SeedRequest, TileBreeder},
    server::{create_router, AppState, RouterConfig},
    storage::{BlobStore, FileBlobStore, MemoryBlobStore, TieredBlobStore},
    tile::TileService,
    JobStatus,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Seed(config) => run_seed(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let catalog = match config.catalog.load() {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load {}: {}", config.catalog.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Catalog: {}", config.catalog.config.display());
    info!("  Gridsets: {}", catalog.broker.names().join(", "));
    info!("  Layers: {}", catalog.dispatcher.names().join(", "));
    info!(
        "  Memory cache: {}MB",
        config.memory_cache / (1024 * 1024)
    );

    let memory = MemoryBlobStore::with_capacity(config.memory_cache);
    let store: Arc<dyn BlobStore> = match &config.cache_dir {
        Some(dir) => match FileBlobStore::open(dir).await {
            Ok(file) => {
                info!("  Tile directory: {}", dir.display());
                Arc::new(TieredBlobStore::new(memory, file))
            }
            Err(e) => {
                error!("Failed to open tile directory {}: {}", dir.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("  Tile directory: none, tiles are lost on restart");
            Arc::new(memory)
        }
    };

    let tile_service = Arc::new(TileService::new(catalog.dispatcher.clone(), store));
    let breeder = Arc::new(TileBreeder::new(
        tile_service.clone(),
        BreederConfig {
            max_threads: config.seed_threads,
            ..BreederConfig::default()
        },
    ));

    let router = create_router(
        AppState::new(tile_service, breeder),
        build_router_config(&config),
    );

    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/layers", addr);
    if let Some(layer) = catalog.dispatcher.names().first() {
        info!(
            "    curl http://{}/service/tms/1.0.0/{}@EPSG:4326@png/0/0/0.png",
            addr, layer
        );
        info!("    open http://{}/service/kml/{}.png.kml", addr, layer);
    }
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "geotile_cache=debug,tower_http=debug"
    } else {
        "geotile_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Seed Command
// =============================================================================

async fn run_seed(config: SeedConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut catalog = match Configuration::load(&config.catalog.config) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load {}: {}", config.catalog.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(meta_factors) = config.meta_factors() {
        if let Err(e) = catalog.set_meta_factors(&config.layer, meta_factors) {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }
    let catalog = match catalog.build(config.catalog.naming()) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Invalid catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let file = match FileBlobStore::open(&config.cache_dir).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open tile directory {}: {}", config.cache_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };
    // Seeded tiles go to disk; the memory tier only needs to hold a meta-tile batch
    let store = Arc::new(TieredBlobStore::new(
        MemoryBlobStore::with_capacity(16 * 1024 * 1024),
        file,
    ));
    let tile_service = Arc::new(TileService::new(catalog.dispatcher.clone(), store));
    let breeder = TileBreeder::new(tile_service, BreederConfig::default());

    let request = SeedRequest {
        gridset: config.gridset.clone(),
        format: config.format,
        zoom_start: config.zoom_start,
        zoom_stop: config.zoom_stop,
        bounds: config.bbox,
        thread_count: config.threads,
        ..SeedRequest::new(&config.layer, config.seed_type)
    };

    let job = match breeder.dispatch(request) {
        Ok(job) => job,
        Err(e) => {
            error!("Failed to start job: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        job = job.id,
        layer = %job.layer,
        gridset = %job.gridset,
        tiles = job.tiles_total,
        "Started {} job",
        job.seed_type.as_str()
    );

    let info = match breeder.wait(job.id).await {
        Ok(info) => info,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize job summary: {}", e),
    }

    if info.status == JobStatus::Done {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("geotile-cache Configuration Check");
    println!("═════════════════════════════════");
    println!();

    let catalog = match config.catalog.load() {
        Ok(catalog) => {
            println!("✓ Catalog: {}", config.catalog.config.display());
            catalog
        }
        Err(e) => {
            println!("✗ Catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("Gridsets:");
    println!("─────────");
    for gridset in catalog.broker.gridsets() {
        println!(
            "  {} ({}, {} levels, {}x{} px tiles)",
            gridset.name(),
            gridset.srs(),
            gridset.num_levels(),
            gridset.tile_width(),
            gridset.tile_height()
        );
        if gridset.scale_warning() {
            println!("    ! resolutions and scales disagree by more than 5%");
        }
        if config.verbose {
            for (level, grid) in gridset.grids().iter().enumerate() {
                println!(
                    "    {:>2}  {:<24} res {:<22} scale {:<22} {} x {}",
                    level,
                    grid.name,
                    grid.resolution,
                    grid.scale_denominator,
                    grid.tiles_wide,
                    grid.tiles_high
                );
            }
        }
    }

    println!();
    println!("Layers:");
    println!("───────");
    for name in catalog.dispatcher.names() {
        let Some(layer) = catalog.dispatcher.get(&name) else {
            continue;
        };
        let formats: Vec<String> = layer.formats().iter().map(|f| f.to_string()).collect();
        println!("  {} [{}]", layer.name(), formats.join(", "));
        for subset in layer.grid_subsets() {
            println!(
                "    {} levels {}-{} extent {}",
                subset.name(),
                subset.zoom_start(),
                subset.zoom_stop(),
                subset.original_extent()
            );
        }
    }

    println!();
    println!("═════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
