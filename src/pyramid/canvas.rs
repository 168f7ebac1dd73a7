//! Per-tile accumulation canvas.
//!
//! Partitions of one job render independently and may each contribute pixels
//! to the same output tile at partition seams. A [`TileCanvas`] collects
//! those contributions; [`TileCanvas::merge`] combines canvases from
//! different partitions.
//!
//! # Merge invariant
//!
//! Partitions tile the source with no overlap and output pixels are assigned
//! by half-open containment, so two canvases for the same tile key are valid
//! on disjoint pixel sets. Merging fills holes and is therefore commutative
//! and associative: the final tile content is independent of partition
//! completion order.

use crate::raster::Raster;

/// Accumulation buffer for one output tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCanvas {
    raster: Raster,
}

impl TileCanvas {
    /// Create an empty (all-nodata) canvas of `size x size` pixels.
    pub fn new(size: u32, bands: usize) -> Self {
        Self {
            raster: Raster::filled_nodata(size, size, bands),
        }
    }

    pub fn size(&self) -> u32 {
        self.raster.width()
    }

    pub fn bands(&self) -> usize {
        self.raster.bands()
    }

    /// Write one pixel and mark it valid.
    pub fn set_pixel(&mut self, col: u32, row: u32, values: &[f32]) {
        self.raster.set_pixel(col, row, values);
    }

    /// Sample one band of one pixel; `None` for nodata.
    pub fn sample(&self, col: u32, row: u32, band: usize) -> Option<f32> {
        self.raster.sample(col as i64, row as i64, band)
    }

    /// Whether the canvas holds no valid pixels.
    pub fn is_empty(&self) -> bool {
        !self.raster.has_data()
    }

    /// The canvas pixels as a raster.
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Fold another canvas for the same tile key into this one.
    ///
    /// Valid pixels from `other` fill this canvas's nodata holes. Where both
    /// sides are valid the values are identical by construction
    /// (non-overlapping partitions), and the existing value is kept.
    pub fn merge(&mut self, other: &TileCanvas) {
        debug_assert_eq!(self.size(), other.size());
        debug_assert_eq!(self.bands(), other.bands());

        let bands = self.bands();
        let mut values = vec![0.0f32; bands];
        for row in 0..self.size() {
            for col in 0..self.size() {
                if self.raster.is_valid(col, row) || !other.raster.is_valid(col, row) {
                    continue;
                }
                for (band, v) in values.iter_mut().enumerate() {
                    *v = other
                        .raster
                        .sample(col as i64, row as i64, band)
                        .unwrap_or(0.0);
                }
                self.raster.set_pixel(col, row, &values);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
