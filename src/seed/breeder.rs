//! Bulk seed, reseed and truncate jobs.
//!
//! A job turns a [`SeedRequest`] into a [`TileRange`] and runs a set of tokio
//! workers over it. Seeding workers share one [`TileRangeIterator`];
//! truncation workers each own a [`PartitionedWalk`] slice of the range.
//!
//! Workers check the job's cancel flag once per meta-tile, so cancelling a
//! job lets every worker finish the meta-tile it is on and then stop.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{SeedError, TileError};
use crate::grid::{BoundingBox, CoverageRect, GridSubset, TileIndex};
use crate::layer::{MimeType, TileLayer};
use crate::storage::TileKey;
use crate::tile::{ResolvedTile, TileService};

use super::iterator::{PartitionedWalk, TileRangeIterator};
use super::range::{RasterMask, TileRange, DEFAULT_MAX_MASK_LEVEL};

/// Default cap on workers per job.
pub const DEFAULT_MAX_THREADS: usize = 16;

/// Default number of retries for a failed tile.
pub const DEFAULT_RETRY_COUNT: u32 = 0;

/// Default pause between retries of a failed tile.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(100);

/// Default number of failed tiles tolerated before a job is aborted.
pub const DEFAULT_MAX_FAILURES: u64 = 1000;

// =============================================================================
// Requests
// =============================================================================

/// Kind of bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedType {
    /// Render tiles that are not stored yet
    #[default]
    Seed,
    /// Render every tile again
    Reseed,
    /// Remove tiles from the store
    Truncate,
}

impl SeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedType::Seed => "seed",
            SeedType::Reseed => "reseed",
            SeedType::Truncate => "truncate",
        }
    }
}

impl FromStr for SeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seed" => Ok(SeedType::Seed),
            "reseed" => Ok(SeedType::Reseed),
            "truncate" => Ok(SeedType::Truncate),
            other => Err(format!("unknown seed type: {}", other)),
        }
    }
}

fn default_thread_count() -> usize {
    1
}

/// Parameters of a bulk job.
///
/// Unset fields default to the whole subset: the layer's first gridset and
/// format, every level of the subset and its full coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRequest {
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub gridset: Option<String>,
    #[serde(default)]
    pub format: Option<MimeType>,
    #[serde(default)]
    pub zoom_start: Option<usize>,
    #[serde(default)]
    pub zoom_stop: Option<usize>,

    /// Area to work on, in the gridset's SRS
    #[serde(default)]
    pub bounds: Option<BoundingBox>,

    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    #[serde(default, rename = "type")]
    pub seed_type: SeedType,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Restrict the job to tiles touching any of these boxes
    #[serde(default)]
    pub mask_bounds: Vec<BoundingBox>,
}

impl SeedRequest {
    pub fn new(layer: impl Into<String>, seed_type: SeedType) -> Self {
        Self {
            layer: layer.into(),
            gridset: None,
            format: None,
            zoom_start: None,
            zoom_stop: None,
            bounds: None,
            thread_count: default_thread_count(),
            seed_type,
            parameters: BTreeMap::new(),
            mask_bounds: Vec::new(),
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// Snapshot of a job for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: u64,
    pub layer: String,
    pub gridset: String,
    pub format: MimeType,
    #[serde(rename = "type")]
    pub seed_type: SeedType,
    pub status: JobStatus,
    pub thread_count: usize,
    pub tiles_done: u64,
    pub tiles_total: u64,
    pub tiles_failed: u64,
    pub elapsed_secs: f64,
    /// Estimate from the rate so far, absent until a tile is done
    pub remaining_secs: Option<f64>,
}

#[derive(Debug)]
struct Job {
    id: u64,
    layer: String,
    gridset: String,
    format: MimeType,
    seed_type: SeedType,
    thread_count: usize,
    tiles_total: u64,
    started: Instant,
    cancel: AtomicBool,
    failed: AtomicBool,
    tiles_done: AtomicU64,
    tiles_failed: AtomicU64,
    status: watch::Sender<JobStatus>,
}

impl Job {
    fn info(&self) -> JobInfo {
        let elapsed = self.started.elapsed().as_secs_f64();
        let tiles_done = self.tiles_done.load(Ordering::Relaxed);
        let remaining_secs = (tiles_done > 0).then(|| {
            let left = self.tiles_total.saturating_sub(tiles_done) as f64;
            elapsed * left / tiles_done as f64
        });

        JobInfo {
            id: self.id,
            layer: self.layer.clone(),
            gridset: self.gridset.clone(),
            format: self.format,
            seed_type: self.seed_type,
            status: *self.status.borrow(),
            thread_count: self.thread_count,
            tiles_done,
            tiles_total: self.tiles_total,
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            elapsed_secs: elapsed,
            remaining_secs,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Breeder
// =============================================================================

/// Limits applied to every job.
#[derive(Debug, Clone)]
pub struct BreederConfig {
    pub max_threads: usize,
    pub retry_count: u32,
    pub retry_wait: Duration,
    pub max_failures: u64,
    /// Deepest level a request mask is rasterised at.
    pub max_mask_level: usize,
}

impl Default for BreederConfig {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_wait: DEFAULT_RETRY_WAIT,
            max_failures: DEFAULT_MAX_FAILURES,
            max_mask_level: DEFAULT_MAX_MASK_LEVEL,
        }
    }
}

/// Runs and tracks bulk jobs.
pub struct TileBreeder {
    service: Arc<TileService>,
    config: BreederConfig,
    jobs: Mutex<BTreeMap<u64, Arc<Job>>>,
    next_id: AtomicU64,
}

/// Everything a worker needs besides its share of the range.
struct WorkerContext {
    service: Arc<TileService>,
    job: Arc<Job>,
    layer: Arc<TileLayer>,
    subset: Arc<GridSubset>,
    format: MimeType,
    parameters: BTreeMap<String, String>,
    parameters_id: Option<String>,
    config: BreederConfig,
}

impl TileBreeder {
    pub fn new(service: Arc<TileService>, config: BreederConfig) -> Self {
        Self {
            service,
            config,
            jobs: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &BreederConfig {
        &self.config
    }

    /// Range a request would cover, without starting anything.
    pub fn tile_range(&self, request: &SeedRequest) -> Result<TileRange, SeedError> {
        Ok(self.plan(request)?.range)
    }

    /// Start a job and return immediately.
    ///
    /// # Errors
    ///
    /// Fails before any worker starts when the layer, gridset or format is
    /// unknown, or when the zoom range, bounds or parameters are invalid.
    pub fn dispatch(&self, request: SeedRequest) -> Result<JobInfo, SeedError> {
        let plan = self.plan(&request)?;
        let thread_count = request.thread_count.clamp(1, self.config.max_threads.max(1));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (status, _) = watch::channel(JobStatus::Pending);
        let job = Arc::new(Job {
            id,
            layer: plan.layer.name().to_string(),
            gridset: plan.subset.name().to_string(),
            format: plan.format,
            seed_type: request.seed_type,
            thread_count,
            tiles_total: plan.range.accepted_tile_count(),
            started: Instant::now(),
            cancel: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            tiles_done: AtomicU64::new(0),
            tiles_failed: AtomicU64::new(0),
            status,
        });

        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job.clone());

        info!(
            job = id,
            layer = %job.layer,
            gridset = %job.gridset,
            seed_type = request.seed_type.as_str(),
            zoom_start = plan.range.zoom_start(),
            zoom_stop = plan.range.zoom_stop(),
            tiles = job.tiles_total,
            threads = thread_count,
            "Starting job"
        );

        let context = Arc::new(WorkerContext {
            service: self.service.clone(),
            job: job.clone(),
            layer: plan.layer,
            subset: plan.subset,
            format: plan.format,
            parameters: plan.parameters,
            parameters_id: plan.range.parameters_id().map(str::to_string),
            config: self.config.clone(),
        });
        tokio::spawn(run_job(context, plan.range, plan.meta, request.seed_type));

        Ok(job.info())
    }

    pub fn job(&self, id: u64) -> Result<JobInfo, SeedError> {
        self.find(id).map(|job| job.info())
    }

    /// Every known job, oldest first.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|job| job.info())
            .collect()
    }

    /// Ask a job to stop after the meta-tiles in progress.
    pub fn cancel(&self, id: u64) -> Result<JobInfo, SeedError> {
        let job = self.find(id)?;
        if !job.status.borrow().is_finished() {
            info!(job = id, "Cancelling job");
            job.cancel.store(true, Ordering::Relaxed);
        }
        Ok(job.info())
    }

    /// Cancel every unfinished job; returns how many were asked to stop.
    pub fn terminate_all(&self) -> usize {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for job in jobs.values() {
            if !job.status.borrow().is_finished() {
                job.cancel.store(true, Ordering::Relaxed);
                count += 1;
            }
        }
        if count > 0 {
            warn!(count, "Terminating running jobs");
        }
        count
    }

    /// Forget finished jobs; returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.borrow().is_finished());
        before - jobs.len()
    }

    /// Wait until a job has finished and return its final state.
    pub async fn wait(&self, id: u64) -> Result<JobInfo, SeedError> {
        let job = self.find(id)?;
        let mut status = job.status.subscribe();
        // The sender lives in the job, so the channel cannot close while we hold it
        let _ = status.wait_for(JobStatus::is_finished).await;
        Ok(job.info())
    }

    fn find(&self, id: u64) -> Result<Arc<Job>, SeedError> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(SeedError::JobNotFound { id })
    }

    fn plan(&self, request: &SeedRequest) -> Result<Plan, SeedError> {
        let layer = self
            .service
            .dispatcher()
            .get(&request.layer)
            .ok_or_else(|| SeedError::LayerNotFound {
                layer: request.layer.clone(),
            })?;

        let gridset = match &request.gridset {
            Some(gridset) => gridset.clone(),
            None => layer
                .gridset_names()
                .first()
                .map(|name| name.to_string())
                .ok_or_else(|| SeedError::GridSetNotSupported {
                    layer: request.layer.clone(),
                    gridset: String::new(),
                })?,
        };
        let subset = layer.grid_subset(&gridset).cloned().ok_or_else(|| {
            SeedError::GridSetNotSupported {
                layer: request.layer.clone(),
                gridset: gridset.clone(),
            }
        })?;

        let format = request.format.unwrap_or_else(|| layer.default_format());
        if !layer.supports_format(format) {
            return Err(SeedError::FormatNotSupported {
                layer: request.layer.clone(),
                format: format.to_string(),
            });
        }

        let zoom_start = request.zoom_start.unwrap_or(subset.zoom_start());
        let zoom_stop = request.zoom_stop.unwrap_or(subset.zoom_stop());
        if zoom_start > zoom_stop
            || zoom_start < subset.zoom_start()
            || zoom_stop > subset.zoom_stop()
        {
            return Err(SeedError::InvalidRange {
                reason: format!(
                    "zoom levels {}-{} are not within {}-{}",
                    zoom_start,
                    zoom_stop,
                    subset.zoom_start(),
                    subset.zoom_stop()
                ),
            });
        }

        let mut rects: Vec<CoverageRect> = match &request.bounds {
            Some(bounds) => {
                if !bounds.is_sane() {
                    return Err(SeedError::InvalidRange {
                        reason: format!("bounds {} are not sane", bounds),
                    });
                }
                subset
                    .coverage_intersections(bounds)
                    .into_values()
                    .filter(|rect| (zoom_start..=zoom_stop).contains(&rect.level))
                    .collect()
            }
            None => subset
                .coverages()
                .iter()
                .filter(|rect| (zoom_start..=zoom_stop).contains(&rect.level))
                .copied()
                .collect(),
        };

        let mask = if request.mask_bounds.is_empty() {
            None
        } else {
            let mask = RasterMask::new(
                &subset,
                &rects,
                &request.mask_bounds,
                self.config.max_mask_level,
            );
            debug!(
                layer = %request.layer,
                mask_level = ?mask.mask_level(),
                "Rasterised mask"
            );
            rects = mask.covered_rects();
            Some(Arc::new(mask))
        };

        let parameters = layer
            .filter_parameters(&request.parameters)
            .map_err(|e| SeedError::InvalidRange {
                reason: e.to_string(),
            })?;
        let parameters_id = layer.parameters_id(&parameters);

        let mut range = TileRange::new(layer.name(), subset.name(), format.extension(), rects)?
            .with_parameters_id(parameters_id);
        if let Some(mask) = mask {
            range = range.with_filter(mask);
        }

        let meta = match request.seed_type {
            SeedType::Truncate => [1, 1],
            SeedType::Seed | SeedType::Reseed => layer.meta_factors(),
        };

        Ok(Plan {
            layer,
            subset,
            format,
            parameters,
            range,
            meta,
        })
    }
}

struct Plan {
    layer: Arc<TileLayer>,
    subset: Arc<GridSubset>,
    format: MimeType,
    parameters: BTreeMap<String, String>,
    range: TileRange,
    meta: [u32; 2],
}

// =============================================================================
// Workers
// =============================================================================

async fn run_job(
    context: Arc<WorkerContext>,
    range: TileRange,
    meta: [u32; 2],
    seed_type: SeedType,
) {
    let job = context.job.clone();
    job.status.send_replace(JobStatus::Running);

    let mut workers = JoinSet::new();
    match seed_type {
        SeedType::Seed | SeedType::Reseed => {
            let iter = Arc::new(TileRangeIterator::new(range, meta));
            let try_cache = seed_type == SeedType::Seed;
            for _ in 0..job.thread_count {
                workers.spawn(seed_worker(context.clone(), iter.clone(), try_cache));
            }
        }
        SeedType::Truncate => {
            let range = Arc::new(range);
            for thread_index in 0..job.thread_count {
                workers.spawn(truncate_worker(context.clone(), range.clone(), thread_index));
            }
        }
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(job = job.id, error = %e, "Worker task failed");
            job.failed.store(true, Ordering::Relaxed);
            job.cancel.store(true, Ordering::Relaxed);
        }
    }

    let status = if job.failed.load(Ordering::Relaxed) {
        JobStatus::Failed
    } else if job.is_cancelled() {
        JobStatus::Cancelled
    } else {
        JobStatus::Done
    };
    job.status.send_replace(status);

    let info = job.info();
    info!(
        job = info.id,
        layer = %info.layer,
        status = ?info.status,
        tiles_done = info.tiles_done,
        tiles_failed = info.tiles_failed,
        elapsed_secs = info.elapsed_secs,
        "Job finished"
    );
}

async fn seed_worker(context: Arc<WorkerContext>, iter: Arc<TileRangeIterator>, try_cache: bool) {
    while !context.job.is_cancelled() {
        let Some(location) = iter.next_meta_grid_location() else {
            break;
        };
        for index in iter.tiles_at(location) {
            // a meta-tile may straddle the edge of a mask
            if !iter.range().contains(index) {
                continue;
            }
            let tile = context.resolved(index);
            context
                .with_retries(index, || context.service.seed_tile(&tile, try_cache))
                .await;
        }
    }
    debug!(
        job = context.job.id,
        rendered = iter.tiles_rendered(),
        skipped = iter.tiles_skipped(),
        "Seed worker done"
    );
}

async fn truncate_worker(context: Arc<WorkerContext>, range: Arc<TileRange>, thread_index: usize) {
    let mut walk = PartitionedWalk::new(&range, [1, 1], thread_index, context.job.thread_count);
    while !context.job.is_cancelled() {
        let Some(location) = walk.next() else {
            break;
        };
        for index in walk.tiles_at(location) {
            let key = context.key(index);
            context
                .with_retries(index, || context.service.truncate_tile(&key))
                .await;
        }
    }
}

impl WorkerContext {
    fn key(&self, index: TileIndex) -> TileKey {
        TileKey::new(
            self.layer.name(),
            self.subset.name(),
            self.format.extension(),
            index,
        )
        .with_parameters_id(self.parameters_id.as_deref())
    }

    fn resolved(&self, index: TileIndex) -> ResolvedTile {
        ResolvedTile {
            layer: self.layer.clone(),
            subset: self.subset.clone(),
            format: self.format,
            index,
            parameters: self.parameters.clone(),
            key: self.key(index),
        }
    }

    /// Run `operation` on one tile, retrying on failure.
    ///
    /// A tile that still fails after the configured retries counts as
    /// failed; past the failure limit the whole job is aborted.
    async fn with_retries<F, Fut, T>(&self, index: TileIndex, operation: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, TileError>>,
    {
        let job = &self.job;
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(_) => {
                    job.tiles_done.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < self.config.retry_count => {
                    attempt += 1;
                    warn!(
                        job = job.id,
                        tile = %index,
                        attempt,
                        error = %e,
                        "Tile failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_wait).await;
                }
                Err(e) => {
                    let failed = job.tiles_failed.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(job = job.id, tile = %index, error = %e, "Tile failed");
                    if failed > self.config.max_failures {
                        error!(
                            job = job.id,
                            failed,
                            "Too many failed tiles, aborting job"
                        );
                        job.failed.store(true, Ordering::Relaxed);
                        job.cancel.store(true, Ordering::Relaxed);
                    }
                    return;
                }
            }
        }
    }
}
