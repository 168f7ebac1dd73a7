//! Raster partitioner.
//!
//! Splits a source raster's pixel space into a regular grid of work
//! partitions sized for distributed processing. The grid is a pure function
//! of the source metadata and the partition configuration: identical inputs
//! always yield the identical grid, which is what makes re-execution after a
//! failed delivery safe.
//!
//! # Grid construction
//!
//! The partition side length starts at `floor(sqrt(max_pixels))` so no
//! partition exceeds the per-task pixel bound, is clamped to the raster
//! dimensions, and is aligned down to a source block multiple when there is
//! room, so partition reads line up with the source's internal tiling.
//! Partitions exactly tile the pixel space with no gaps or overlaps; edge
//! partitions may be smaller.

use crate::geo::{Extent, PixelWindow};
use crate::raster::RasterMetadata;

/// Source rasters are commonly tiled internally in 256-pixel blocks;
/// aligning partition edges to this avoids straddled block reads.
pub const SOURCE_BLOCK_SIZE: u32 = 256;

/// Tuning for the partition grid.
#[derive(Debug, Clone, Copy)]
pub struct PartitionConfig {
    /// Upper bound on pixels per partition (caps per-task memory)
    pub max_pixels_per_partition: u64,

    /// Block size to align partition edges to where possible
    pub block_size: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_pixels_per_partition: 4 * 1024 * 1024,
            block_size: SOURCE_BLOCK_SIZE,
        }
    }
}

/// One rectangular work partition of a source raster.
///
/// Consumed exactly once per job execution by the pyramid builder; carries
/// everything a partition task needs by value.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPartition {
    /// Stable index within the job's partition grid (row-major)
    pub index: usize,

    /// Pixel region of the source raster
    pub window: PixelWindow,

    /// Mercator extent of the window
    pub extent: Extent,
}

/// Compute the partition grid for a source raster.
///
/// Deterministic and cheap; callers may re-enumerate freely (e.g. on job
/// retry) without side effects.
pub fn partition_grid(meta: &RasterMetadata, config: &PartitionConfig) -> Vec<RasterPartition> {
    let side = partition_side(meta, config);
    let transform = meta.geo_transform();

    let cols = meta.width.div_ceil(side);
    let rows = meta.height.div_ceil(side);

    let mut partitions = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let col_off = col * side;
            let row_off = row * side;
            let window = PixelWindow::new(
                col_off,
                row_off,
                side.min(meta.width - col_off),
                side.min(meta.height - row_off),
            );
            partitions.push(RasterPartition {
                index: partitions.len(),
                window,
                extent: transform.window_extent(&window),
            });
        }
    }
    partitions
}

/// Side length of a full (non-edge) partition.
fn partition_side(meta: &RasterMetadata, config: &PartitionConfig) -> u32 {
    let bound = (config.max_pixels_per_partition as f64).sqrt().floor() as u32;
    let side = bound.max(1).min(meta.width.max(meta.height));

    // Align down to the source block size when that leaves a usable side
    if side >= config.block_size {
        (side / config.block_size) * config.block_size
    } else {
        side
    }
}

// =============================================================================
// Tests
// =============================================================================
