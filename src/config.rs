//! Configuration management for the tiling worker.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `TILER_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use raster_tiler::config::Config;
//!
//! // Parse from command line and environment
//! let config = Config::parse();
//!
//! println!("Polling {}", config.queue_url);
//! ```
//!
//! # Environment Variables
//!
//! All configuration options can be set via environment variables with the `TILER_` prefix:
//!
//! - `TILER_QUEUE_URL` - Job queue URL (required)
//! - `TILER_STATUS_QUEUE_URL` - Status notification queue URL (optional)
//! - `TILER_AWS_REGION` - AWS region (default: us-east-1)
//! - `TILER_ENDPOINT_URL` - Custom endpoint for S3/SQS-compatible services
//! - `TILER_MAX_PIXELS_PER_PARTITION` - Partition size bound (default: 4194304)
//! - `TILER_MAX_REDELIVERIES` - Dead-letter threshold (default: 3)
//! - `TILER_VISIBILITY_EXTENSION_SECS` - Heartbeat extension (default: 60)
//! - `TILER_POLL_WAIT_SECS` - Long-poll wait per receive (default: 10)
//! - `TILER_PARTITION_PARALLELISM` - Concurrent partition tasks (default: CPU count)
//! - `TILER_DEFAULT_RESAMPLING` - Fallback resampling method (default: bilinear)
//! - `TILER_TILE_SIZE` - Tile edge length in pixels (default: 256)

use clap::Parser;

use crate::partition::PartitionConfig;
use crate::pyramid::Resampling;

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default upper bound on pixels per partition (4 megapixels).
pub const DEFAULT_MAX_PIXELS_PER_PARTITION: u64 = 4 * 1024 * 1024;

/// Default number of deliveries before a failing job is dead-lettered.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 3;

/// Default visibility extension applied by the heartbeat, in seconds.
pub const DEFAULT_VISIBILITY_EXTENSION_SECS: u32 = 60;

/// Default long-poll wait per receive, in seconds.
pub const DEFAULT_POLL_WAIT_SECS: u32 = 10;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Raster Tiler - a queue-driven Web Mercator tile pyramid builder.
///
/// Consumes tiling jobs from a queue, fetches source rasters from object
/// storage, renders the requested zoom range as PNG tiles, and publishes
/// them back to object storage.
#[derive(Parser, Debug, Clone)]
#[command(name = "raster-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Queue Configuration
    // =========================================================================
    /// URL of the job queue to poll.
    #[arg(long, env = "TILER_QUEUE_URL")]
    pub queue_url: String,

    /// URL of the status notification queue.
    ///
    /// If not specified, status records are dropped.
    #[arg(long, env = "TILER_STATUS_QUEUE_URL")]
    pub status_queue_url: Option<String>,

    /// How many deliveries a job gets before it is dead-lettered.
    #[arg(long, default_value_t = DEFAULT_MAX_REDELIVERIES, env = "TILER_MAX_REDELIVERIES")]
    pub max_redeliveries: u32,

    /// Seconds of visibility granted on each heartbeat tick.
    #[arg(long, default_value_t = DEFAULT_VISIBILITY_EXTENSION_SECS, env = "TILER_VISIBILITY_EXTENSION_SECS")]
    pub visibility_extension_secs: u32,

    /// Long-poll wait per receive call, in seconds.
    #[arg(long, default_value_t = DEFAULT_POLL_WAIT_SECS, env = "TILER_POLL_WAIT_SECS")]
    pub poll_wait_secs: u32,

    // =========================================================================
    // AWS Configuration
    // =========================================================================
    /// AWS region for S3 and SQS.
    #[arg(long, default_value = DEFAULT_REGION, env = "TILER_AWS_REGION")]
    pub aws_region: String,

    /// Custom endpoint URL for S3/SQS-compatible services (MinIO, ElasticMQ,
    /// LocalStack).
    ///
    /// If not specified, uses the default AWS endpoints.
    #[arg(long, env = "TILER_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    // =========================================================================
    // Rendering Configuration
    // =========================================================================
    /// Upper bound on source pixels per partition.
    #[arg(long, default_value_t = DEFAULT_MAX_PIXELS_PER_PARTITION, env = "TILER_MAX_PIXELS_PER_PARTITION")]
    pub max_pixels_per_partition: u64,

    /// Maximum number of partitions rendered concurrently.
    ///
    /// Defaults to the number of available CPUs.
    #[arg(long, env = "TILER_PARTITION_PARALLELISM")]
    pub partition_parallelism: Option<usize>,

    /// Resampling method used when a job does not specify one.
    #[arg(long, default_value_t = Resampling::Bilinear, env = "TILER_DEFAULT_RESAMPLING")]
    pub default_resampling: Resampling,

    /// Tile edge length in pixels (power of two, 64-1024).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TILER_TILE_SIZE")]
    pub tile_size: u32,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_url.is_empty() {
            return Err("Queue URL is required. Set --queue-url or TILER_QUEUE_URL".to_string());
        }

        if !self.tile_size.is_power_of_two() || !(64..=1024).contains(&self.tile_size) {
            return Err("tile_size must be a power of two between 64 and 1024".to_string());
        }

        // A partition must hold at least one tile's worth of source pixels,
        // otherwise the grid degenerates into per-pixel partitions.
        if self.max_pixels_per_partition < (self.tile_size as u64).pow(2) {
            return Err(format!(
                "max_pixels_per_partition must be at least tile_size^2 ({})",
                (self.tile_size as u64).pow(2)
            ));
        }

        if self.visibility_extension_secs == 0 {
            return Err("visibility_extension_secs must be greater than 0".to_string());
        }

        if let Some(parallelism) = self.partition_parallelism {
            if parallelism == 0 {
                return Err("partition_parallelism must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// Effective partition task concurrency.
    pub fn parallelism(&self) -> usize {
        self.partition_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Partitioning parameters derived from this configuration.
    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            max_pixels_per_partition: self.max_pixels_per_partition,
            ..PartitionConfig::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
