//! # Raster Tiler
//!
//! A queue-driven worker that builds Web Mercator tile pyramids from
//! georeferenced rasters in S3-compatible object storage.
//!
//! The worker polls a job queue, fetches each job's source raster, splits it
//! into a deterministic grid of bounded partitions, renders the finest
//! requested zoom level with the job's resampling method, aggregates coarser
//! levels 2x2 from the level below, and publishes every tile as a PNG object
//! under `{prefix}/{layer}/{z}/{x}/{y}.png`.
//!
//! ## Features
//!
//! - **At-least-once safe**: every step is idempotent, so duplicate
//!   deliveries and mid-job crashes converge to the same stored tiles
//! - **Bounded memory**: partition size caps how much of the source is in
//!   flight at once, independent of source dimensions
//! - **Deterministic output**: identical jobs produce byte-identical tiles
//! - **Nodata-aware**: invalid samples never leak into resampling or
//!   aggregation arithmetic; fully-empty tiles are skipped
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geo`] - Web Mercator tile grid, extents, and geotransforms
//! - [`raster`] - In-memory rasters with validity masks, source decoding
//! - [`partition`] - Deterministic partition grid over the source
//! - [`pyramid`] - Rendering, resampling, aggregation, and PNG encoding
//! - [`storage`] - Object store gateway and tile publishing
//! - [`queue`] - Job queue adapter and status reporting
//! - [`job`] - Job descriptor parsing and validation
//! - [`pipeline`] - End-to-end job execution and the poll loop
//! - [`config`] - CLI and configuration types

pub mod config;
pub mod error;
pub mod geo;
pub mod job;
pub mod partition;
pub mod pipeline;
pub mod pyramid;
pub mod queue;
pub mod raster;
pub mod retry;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    DescriptorError, PartitionError, PipelineError, QueueError, RasterError, StorageError,
};
pub use geo::{tiles_for_extent, Extent, GeoTransform, PixelWindow, TileKey};
pub use job::{GridBounds, JobDescriptor, JobManifest, JobOutcome};
pub use partition::{partition_grid, PartitionConfig, RasterPartition};
pub use pipeline::{JobRunner, Worker};
pub use pyramid::{
    downsample_level, render_partition, RenderParams, Resampling, TileArtifact, TileCanvas,
    TileEncoder,
};
pub use queue::{
    create_sqs_client, JobMessage, JobQueue, JobStatus, NullStatusReporter, SqsJobQueue,
    SqsStatusReporter, StatusRecord, StatusReporter,
};
pub use raster::{ImageObjectSource, Raster, RasterMetadata, RasterSource};
pub use storage::{create_s3_client, ObjectStore, ObjectUri, S3ObjectStore, TileWriter};
