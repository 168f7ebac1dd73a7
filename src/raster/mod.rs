//! In-memory raster model.
//!
//! The pipeline processes imagery as masked `f32` grids: every pixel carries
//! one sample per band plus a validity flag. Pixels outside the source's
//! valid-data mask are nodata and never participate in resampling or
//! aggregation arithmetic.
//!
//! # Components
//!
//! - [`Raster`]: pixel-interleaved sample buffer with a validity mask
//! - [`RasterMetadata`]: dimensions, band count, georeferencing, nodata value
//! - [`RasterSource`]: async capability seam for reading source imagery

mod source;

pub use source::{ImageObjectSource, RasterSource};

use crate::error::RasterError;
use crate::geo::{Extent, GeoTransform, PixelWindow};

// =============================================================================
// Raster Metadata
// =============================================================================

/// Shape and georeferencing of a source raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Number of bands (1 for grayscale, 3 for RGB)
    pub bands: usize,

    /// Mercator extent covered by the raster
    pub extent: Extent,

    /// Sample value to treat as nodata, if any
    pub nodata: Option<f32>,
}

impl RasterMetadata {
    /// Pixel-to-mercator transform for this raster.
    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::from_extent(&self.extent, self.width, self.height)
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// =============================================================================
// Raster
// =============================================================================

/// A masked raster: pixel-interleaved `f32` samples plus a per-pixel
/// validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    bands: usize,
    samples: Vec<f32>,
    mask: Vec<bool>,
}

impl Raster {
    /// Create a raster with all pixels marked nodata.
    pub fn filled_nodata(width: u32, height: u32, bands: usize) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            bands,
            samples: vec![0.0; pixels * bands],
            mask: vec![false; pixels],
        }
    }

    /// Build a raster from decoded image pixels.
    ///
    /// Grayscale inputs become one band, color inputs three; an alpha
    /// channel, if present, seeds the validity mask. When `nodata` is set,
    /// pixels whose every band equals it are additionally masked out.
    pub fn from_image(img: &image::DynamicImage, nodata: Option<f32>) -> Result<Self, RasterError> {
        use image::DynamicImage;

        let (width, height) = (img.width(), img.height());
        let pixels = width as usize * height as usize;

        let (bands, samples, mask) = match img {
            DynamicImage::ImageLuma8(buf) => {
                let samples: Vec<f32> = buf.as_raw().iter().map(|&v| v as f32).collect();
                (1, samples, vec![true; pixels])
            }
            DynamicImage::ImageLumaA8(buf) => {
                let raw = buf.as_raw();
                let mut samples = Vec::with_capacity(pixels);
                let mut mask = Vec::with_capacity(pixels);
                for chunk in raw.chunks_exact(2) {
                    samples.push(chunk[0] as f32);
                    mask.push(chunk[1] > 0);
                }
                (1, samples, mask)
            }
            DynamicImage::ImageRgb8(buf) => {
                let samples: Vec<f32> = buf.as_raw().iter().map(|&v| v as f32).collect();
                (3, samples, vec![true; pixels])
            }
            DynamicImage::ImageRgba8(buf) => {
                let raw = buf.as_raw();
                let mut samples = Vec::with_capacity(pixels * 3);
                let mut mask = Vec::with_capacity(pixels);
                for chunk in raw.chunks_exact(4) {
                    samples.push(chunk[0] as f32);
                    samples.push(chunk[1] as f32);
                    samples.push(chunk[2] as f32);
                    mask.push(chunk[3] > 0);
                }
                (3, samples, mask)
            }
            other => {
                // Normalize less common layouts (16-bit, BGR, ...) through RGBA
                let buf = other.to_rgba8();
                let raw = buf.as_raw();
                let mut samples = Vec::with_capacity(pixels * 3);
                let mut mask = Vec::with_capacity(pixels);
                for chunk in raw.chunks_exact(4) {
                    samples.push(chunk[0] as f32);
                    samples.push(chunk[1] as f32);
                    samples.push(chunk[2] as f32);
                    mask.push(chunk[3] > 0);
                }
                (3, samples, mask)
            }
        };

        let mut raster = Self {
            width,
            height,
            bands,
            samples,
            mask,
        };

        if let Some(nd) = nodata {
            raster.mask_value(nd);
        }

        Ok(raster)
    }

    /// Mask out pixels whose every band equals `value`.
    fn mask_value(&mut self, value: f32) {
        let pixels = self.mask.len();
        for p in 0..pixels {
            let base = p * self.bands;
            if self.samples[base..base + self.bands]
                .iter()
                .all(|&s| s == value)
            {
                self.mask[p] = false;
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Sample one band of one pixel; `None` if out of bounds or nodata.
    pub fn sample(&self, col: i64, row: i64, band: usize) -> Option<f32> {
        if col < 0 || row < 0 || col >= self.width as i64 || row >= self.height as i64 {
            return None;
        }
        let p = row as usize * self.width as usize + col as usize;
        if !self.mask[p] {
            return None;
        }
        Some(self.samples[p * self.bands + band])
    }

    /// Whether the pixel at `(col, row)` carries valid data.
    pub fn is_valid(&self, col: u32, row: u32) -> bool {
        if col >= self.width || row >= self.height {
            return false;
        }
        self.mask[row as usize * self.width as usize + col as usize]
    }

    /// Write one pixel and mark it valid. Panics on band count mismatch.
    pub fn set_pixel(&mut self, col: u32, row: u32, values: &[f32]) {
        assert_eq!(values.len(), self.bands);
        let p = row as usize * self.width as usize + col as usize;
        self.samples[p * self.bands..(p + 1) * self.bands].copy_from_slice(values);
        self.mask[p] = true;
    }

    /// Whether any pixel carries valid data.
    pub fn has_data(&self) -> bool {
        self.mask.iter().any(|&m| m)
    }

    /// Copy out a rectangular window.
    pub fn window(&self, window: &PixelWindow) -> Result<Raster, RasterError> {
        if window.col_off + window.width > self.width
            || window.row_off + window.height > self.height
        {
            return Err(RasterError::WindowOutOfBounds {
                col_off: window.col_off,
                row_off: window.row_off,
                width: window.width,
                height: window.height,
                raster_width: self.width,
                raster_height: self.height,
            });
        }

        let mut out = Raster::filled_nodata(window.width, window.height, self.bands);
        for row in 0..window.height {
            let src_row = (window.row_off + row) as usize;
            let src_base = src_row * self.width as usize + window.col_off as usize;
            let dst_base = row as usize * window.width as usize;

            out.mask[dst_base..dst_base + window.width as usize]
                .copy_from_slice(&self.mask[src_base..src_base + window.width as usize]);

            let src_samples = src_base * self.bands;
            let dst_samples = dst_base * self.bands;
            let len = window.width as usize * self.bands;
            out.samples[dst_samples..dst_samples + len]
                .copy_from_slice(&self.samples[src_samples..src_samples + len]);
        }
        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
