//! Tile pyramid construction.
//!
//! Two operations build the pyramid:
//!
//! - [`render_partition`] reprojects one partition's pixels into the output
//!   tile grid at the job's base (maximum) zoom, producing one canvas per
//!   intersected tile key, cropped exactly to that key's bounds.
//! - [`downsample_level`] derives each coarser zoom by 2x2 block reduction
//!   of the four child tiles at the next finer zoom, with the job's
//!   resampling method. Parents are aggregated from children, never
//!   recomputed from source, so adjacent zoom levels cannot disagree at
//!   their seams.

use std::collections::BTreeMap;

use tracing::trace;

use crate::geo::{tiles_for_extent, GeoTransform, PixelWindow, TileKey};
use crate::partition::RasterPartition;
use crate::raster::{Raster, RasterMetadata};

use super::canvas::TileCanvas;
use super::resample::Resampling;

/// Everything a partition render task needs besides the pixels.
///
/// Passed by value into partition tasks: rendering is a pure function of
/// `(partition, parameters)` with no shared mutable state, so the compute
/// framework is free to reorder or re-execute tasks.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Output layer identifier
    pub layer: String,

    /// Base zoom level (the job's maxZoom)
    pub zoom: u8,

    /// Resampling method
    pub resampling: Resampling,

    /// Output tile edge length in pixels
    pub tile_size: u32,
}

/// Render one partition into base-zoom tile canvases.
///
/// `raster` holds the partition's pixels read with a kernel halo;
/// `raster_window` locates it within the source raster. Output pixels are
/// claimed by half-open containment in the partition extent, so canvases
/// from different partitions never disagree. Tiles with no valid pixels are
/// omitted (a partition of pure nodata produces nothing).
pub fn render_partition(
    raster: &Raster,
    raster_window: &PixelWindow,
    partition: &RasterPartition,
    meta: &RasterMetadata,
    params: &RenderParams,
) -> Vec<(TileKey, TileCanvas)> {
    let source_transform = meta.geo_transform();

    // Transform for the halo window: same pixel size, shifted origin
    let local_transform = GeoTransform {
        origin_x: source_transform.origin_x
            + raster_window.col_off as f64 * source_transform.pixel_width,
        origin_y: source_transform.origin_y
            - raster_window.row_off as f64 * source_transform.pixel_height,
        ..source_transform
    };

    let bands = raster.bands();
    let mut out = Vec::new();

    for key in tiles_for_extent(&params.layer, &partition.extent, params.zoom) {
        let tile_transform = GeoTransform::from_extent(&key.bounds(), params.tile_size, params.tile_size);
        let mut canvas = TileCanvas::new(params.tile_size, bands);
        let mut values = vec![0.0f32; bands];

        for row in 0..params.tile_size {
            for col in 0..params.tile_size {
                let (mx, my) = tile_transform.pixel_center(col, row);
                if !partition.extent.contains_half_open(mx, my) {
                    continue;
                }

                let (sx, sy) = local_transform.to_pixel(mx, my);
                let Some(first) = params.resampling.sample(raster, sx, sy, 0) else {
                    continue;
                };
                values[0] = first;
                for (band, v) in values.iter_mut().enumerate().skip(1) {
                    *v = params
                        .resampling
                        .sample(raster, sx, sy, band)
                        .unwrap_or(0.0);
                }
                canvas.set_pixel(col, row, &values);
            }
        }

        if !canvas.is_empty() {
            trace!(tile = %key, partition = partition.index, "Rendered partition tile");
            out.push((key, canvas));
        }
    }

    out
}

/// Derive the next coarser zoom level from `tiles`.
///
/// Every canvas in `tiles` must share one zoom level; the result holds the
/// parent tiles one level up, each parent pixel the 2x2 reduction of its
/// four child pixels. Empty parents are omitted.
pub fn downsample_level(
    tiles: &BTreeMap<TileKey, TileCanvas>,
    resampling: Resampling,
) -> BTreeMap<TileKey, TileCanvas> {
    let mut parents: BTreeMap<TileKey, TileCanvas> = BTreeMap::new();

    for (key, canvas) in tiles {
        let Some(parent_key) = key.parent() else {
            continue;
        };
        let size = canvas.size();
        let half = size / 2;
        let bands = canvas.bands();

        let parent = parents
            .entry(parent_key)
            .or_insert_with(|| TileCanvas::new(size, bands));

        // Which quadrant of the parent this child fills
        let col_base = (key.x % 2) * half;
        let row_base = (key.y % 2) * half;

        let mut values = vec![0.0f32; bands];
        for row in 0..half {
            for col in 0..half {
                let c0 = col * 2;
                let r0 = row * 2;

                let mut any = false;
                for (band, v) in values.iter_mut().enumerate() {
                    let block = [
                        canvas.sample(c0, r0, band),
                        canvas.sample(c0 + 1, r0, band),
                        canvas.sample(c0, r0 + 1, band),
                        canvas.sample(c0 + 1, r0 + 1, band),
                    ];
                    match resampling.reduce_block(block) {
                        Some(reduced) => {
                            *v = reduced;
                            any = true;
                        }
                        None => *v = 0.0,
                    }
                }
                if any {
                    parent.set_pixel(col_base + col, row_base + row, &values);
                }
            }
        }
    }

    parents.retain(|_, canvas| !canvas.is_empty());
    parents
}

// =============================================================================
// Tests
// =============================================================================
