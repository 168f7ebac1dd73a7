//! Job execution pipeline.
//!
//! Drives one message from receipt to a terminal queue operation:
//!
//! ```text
//!  receive ──> parse ──> STARTED ──> open source ──> partition
//!                │                                      │
//!                │ poison                               ▼
//!                ▼                            render tasks (bounded)
//!        log + acknowledge                              │
//!                                                merge canvases
//!                                                       │
//!                                          downsample max..=min zoom
//!                                                       │
//!                                              encode + publish
//!                                                       │
//!                              success ── acknowledge + FINISHED
//!                              retryable failure ────── release
//!                              exhausted / structural ─ acknowledge + FAILED
//! ```
//!
//! A heartbeat task extends the message's visibility window for as long as
//! the job is legitimately running, so slow jobs are not redelivered
//! mid-flight while crashed workers still time out and hand their message to
//! a peer. Every step is idempotent, which is what makes at-least-once
//! delivery safe: a duplicate execution re-renders the same deterministic
//! tiles and overwrites them with identical bytes.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{PartitionError, PipelineError, QueueError, StorageError};
use crate::geo::TileKey;
use crate::job::{GridBounds, JobDescriptor, JobManifest, JobOutcome};
use crate::partition::{partition_grid, RasterPartition};
use crate::pyramid::{
    downsample_level, render_partition, RenderParams, TileCanvas, TileEncoder,
};
use crate::queue::{JobMessage, JobQueue, StatusRecord, StatusReporter};
use crate::raster::{ImageObjectSource, RasterSource};
use crate::storage::{ObjectStore, TileWriter};

/// Pixels of extra context read around each partition window so that
/// bilinear and cubic kernels see their full neighborhoods across
/// partition seams.
const KERNEL_HALO: u32 = 2;

/// Pause after a failed receive before polling again.
const IDLE_BACKOFF: Duration = Duration::from_secs(5);

// =============================================================================
// Job Runner
// =============================================================================

/// Executes one job message end to end.
///
/// Holds only shared handles; cloning is cheap and executions are
/// independent.
pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn StatusReporter>,
    config: Config,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ObjectStore>,
        reporter: Arc<dyn StatusReporter>,
        config: Config,
    ) -> Self {
        Self {
            queue,
            store,
            reporter,
            config,
        }
    }

    /// Run one received message to a terminal outcome.
    ///
    /// Exactly one queue operation concludes the message: acknowledge on
    /// success, poison input, or an exhausted redelivery budget; release on
    /// a retryable failure.
    pub async fn run(&self, message: &JobMessage) -> JobOutcome {
        let job = match JobDescriptor::parse(&message.body, self.config.default_resampling) {
            Ok(job) => job,
            Err(e) => {
                // Poison: redelivery would fail identically, so drop it.
                warn!(error = %e, "Unparseable job message, acknowledging as poison");
                if let Some(job_id) = extract_job_id(&message.body) {
                    self.reporter
                        .report(StatusRecord::failed(job_id, e.to_string()))
                        .await;
                }
                self.acknowledge(message).await;
                return JobOutcome::Failed {
                    reason: e.to_string(),
                    retryable: false,
                };
            }
        };

        info!(
            job_id = %job.job_id,
            source = %job.source,
            layer = %job.layer_id,
            zooms = format!("{}..={}", job.min_zoom, job.max_zoom),
            resampling = %job.resampling,
            delivery = message.receive_count,
            "Starting tiling job"
        );
        self.reporter.report(StatusRecord::started(&job.job_id)).await;

        let heartbeat = self.spawn_heartbeat(message.handle.clone());
        let result = self.execute(&job).await;
        heartbeat.abort();

        match result {
            Ok(tile_count) => {
                self.acknowledge(message).await;
                self.reporter.report(StatusRecord::finished(&job.job_id)).await;
                info!(job_id = %job.job_id, tile_count, "Job finished");
                JobOutcome::Succeeded { tile_count }
            }
            Err(e) if e.retryable() && message.receive_count <= self.config.max_redeliveries => {
                warn!(
                    job_id = %job.job_id,
                    error = %e,
                    delivery = message.receive_count,
                    "Job failed, releasing for redelivery"
                );
                if let Err(release_err) = self.queue.release(&message.handle).await {
                    warn!(job_id = %job.job_id, error = %release_err, "Failed to release message");
                }
                JobOutcome::Failed {
                    reason: e.to_string(),
                    retryable: true,
                }
            }
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    error = %e,
                    delivery = message.receive_count,
                    "Job failed terminally"
                );
                self.acknowledge(message).await;
                self.reporter
                    .report(StatusRecord::failed(&job.job_id, e.to_string()))
                    .await;
                JobOutcome::Failed {
                    reason: e.to_string(),
                    retryable: false,
                }
            }
        }
    }

    /// Render and publish the full pyramid for one job.
    async fn execute(&self, job: &JobDescriptor) -> Result<usize, PipelineError> {
        let source: Arc<dyn RasterSource> = Arc::new(
            ImageObjectSource::open(
                Arc::clone(&self.store),
                &job.source,
                job.source_extent,
                job.nodata,
            )
            .await?,
        );
        let meta = source.metadata().clone();

        let partitions = partition_grid(&meta, &self.config.partition_config());
        info!(
            job_id = %job.job_id,
            width = meta.width,
            height = meta.height,
            bands = meta.bands,
            partitions = partitions.len(),
            "Partitioned source raster"
        );

        let params = RenderParams {
            layer: job.layer_id.clone(),
            zoom: job.max_zoom,
            resampling: job.resampling,
            tile_size: self.config.tile_size,
        };

        let base = self.render_base_level(&source, partitions, &params).await?;
        let grid_bounds = GridBounds::from_keys(base.keys());

        // Publish fine-to-coarse; each level is the 2x2 aggregation of the
        // one below, never a fresh pass over the source.
        let writer = TileWriter::new(Arc::clone(&self.store));
        let encoder = TileEncoder::new();
        let mut tile_count = 0;
        let mut level = base;
        let mut zoom = job.max_zoom;
        loop {
            debug!(job_id = %job.job_id, zoom, tiles = level.len(), "Publishing zoom level");
            for (key, canvas) in &level {
                let artifact = encoder.encode(key, canvas)?;
                writer
                    .publish(&job.destination, &artifact)
                    .await
                    .map_err(|e| PipelineError::Publish {
                        key: key.to_string(),
                        source: e,
                    })?;
                tile_count += 1;
            }
            if zoom == job.min_zoom {
                break;
            }
            level = downsample_level(&level, job.resampling);
            zoom -= 1;
        }

        // Completion manifest for the next pipeline stage, last so its
        // presence implies every tile above it landed.
        let manifest = JobManifest {
            job_id: job.job_id.clone(),
            layer_id: job.layer_id.clone(),
            min_zoom: job.min_zoom,
            max_zoom: job.max_zoom,
            tile_size: self.config.tile_size,
            tile_count,
            extent: [
                job.source_extent.min_x,
                job.source_extent.min_y,
                job.source_extent.max_x,
                job.source_extent.max_y,
            ],
            grid_bounds,
        };
        writer
            .publish_manifest(&job.destination, &manifest)
            .await
            .map_err(|e| PipelineError::Publish {
                key: JobManifest::object_key(&job.destination.key, &job.layer_id),
                source: e,
            })?;

        Ok(tile_count)
    }

    /// Render every partition at the base zoom and merge the canvases.
    ///
    /// Tasks run under a concurrency bound; one failed partition does not
    /// cancel its siblings, but any failure fails the level.
    async fn render_base_level(
        &self,
        source: &Arc<dyn RasterSource>,
        partitions: Vec<RasterPartition>,
        params: &RenderParams,
    ) -> Result<BTreeMap<TileKey, TileCanvas>, PipelineError> {
        let total = partitions.len();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism()));
        let mut tasks: JoinSet<Result<Vec<(TileKey, TileCanvas)>, PartitionError>> =
            JoinSet::new();

        for partition in partitions {
            let source = Arc::clone(source);
            let semaphore = Arc::clone(&semaphore);
            let params = params.clone();
            let meta = source.metadata().clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let window = partition.window.with_halo(KERNEL_HALO, meta.width, meta.height);
                let raster = source
                    .read_window(&window)
                    .await
                    .map_err(|e| PartitionError {
                        index: partition.index,
                        source: e,
                    })?;
                Ok(render_partition(&raster, &window, &partition, &meta, &params))
            });
        }

        let mut merged: BTreeMap<TileKey, TileCanvas> = BTreeMap::new();
        let mut failures: Vec<PartitionError> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(tiles)) => {
                    for (key, canvas) in tiles {
                        match merged.entry(key) {
                            Entry::Occupied(mut existing) => existing.get_mut().merge(&canvas),
                            Entry::Vacant(slot) => {
                                slot.insert(canvas);
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(partition = e.index, error = %e.source, "Partition render failed");
                    failures.push(e);
                }
                Err(join_err) => {
                    // A panicked render task; should not happen.
                    error!(error = %join_err, "Partition task aborted");
                    failures.push(PartitionError {
                        index: total,
                        source: StorageError::Transient {
                            uri: "<render task>".to_string(),
                            message: join_err.to_string(),
                        },
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(merged)
        } else {
            failures.sort_by_key(|e| e.index);
            let failed = failures.len();
            Err(PipelineError::Partitions {
                failed,
                total,
                first: failures.swap_remove(0),
            })
        }
    }

    /// Keep the message invisible while the job runs.
    ///
    /// Ticks at half the extension period so one missed tick never lets the
    /// window lapse. Aborted when the job completes; if this worker dies
    /// instead, the window lapses and the queue redelivers.
    fn spawn_heartbeat(&self, handle: String) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let extension_secs = self.config.visibility_extension_secs;
        let period = Duration::from_secs(u64::from((extension_secs / 2).max(1)));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = queue.extend_visibility(&handle, extension_secs).await {
                    warn!(error = %e, "Failed to extend message visibility");
                }
            }
        })
    }

    async fn acknowledge(&self, message: &JobMessage) {
        if let Err(e) = self.queue.acknowledge(&message.handle).await {
            warn!(error = %e, "Failed to acknowledge message");
        }
    }
}

/// Best-effort `jobId` extraction from a body that failed full validation,
/// so poison messages can still produce a FAILED status record.
fn extract_job_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("jobId")?.as_str().map(str::to_string)
}

// =============================================================================
// Worker
// =============================================================================

/// Long-running poll loop over a [`JobRunner`].
pub struct Worker {
    runner: JobRunner,
}

impl Worker {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }

    /// Receive at most one message and run it.
    ///
    /// Returns `Ok(None)` when the long poll came back empty.
    pub async fn poll_once(&self) -> Result<Option<JobOutcome>, QueueError> {
        let wait = self.runner.config.poll_wait_secs;
        let Some(message) = self.runner.queue.receive(wait).await? else {
            return Ok(None);
        };
        Ok(Some(self.runner.run(&message).await))
    }

    /// Poll forever. Queue outages are logged and retried after a pause.
    pub async fn run(&self) {
        info!("Worker started, polling for jobs");
        loop {
            match self.poll_once().await {
                Ok(Some(outcome)) => debug!(?outcome, "Job message processed"),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Queue receive failed");
                    tokio::time::sleep(IDLE_BACKOFF).await;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
