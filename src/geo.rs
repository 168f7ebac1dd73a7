//! Web Mercator tile grid math.
//!
//! The output tile grid is the standard power-of-two pyramid over EPSG:3857:
//! at zoom `z` the world is a `2^z x 2^z` grid of square tiles, column 0 at
//! the west edge and row 0 at the north edge.
//!
//! This module provides the coordinate types shared across the pipeline:
//!
//! - [`Extent`] - an axis-aligned bounding box in mercator meters
//! - [`TileKey`] - the address of one output tile (layer, zoom, column, row)
//! - [`PixelWindow`] - a rectangular region of a raster in pixel space
//! - [`GeoTransform`] - the affine mapping between pixel and mercator space

use std::fmt;

/// Half the extent of the Web Mercator projection plane, in meters.
///
/// The valid mercator range per axis is `[-WEB_MERCATOR_MAX, WEB_MERCATOR_MAX]`.
pub const WEB_MERCATOR_MAX: f64 = 20_037_508.342_789_244;

/// Highest zoom level accepted in a job descriptor.
pub const MAX_ZOOM: u8 = 24;

// =============================================================================
// Extent
// =============================================================================

/// Axis-aligned bounding box in Web Mercator meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The full Web Mercator plane.
    pub fn world() -> Self {
        Self::new(
            -WEB_MERCATOR_MAX,
            -WEB_MERCATOR_MAX,
            WEB_MERCATOR_MAX,
            WEB_MERCATOR_MAX,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether all bounds are finite and the box has positive area.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    /// Whether this extent overlaps `other` with positive area.
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Point containment, half-open on the east and south edges.
    ///
    /// Adjacent partitions share edges; half-open containment assigns every
    /// point to at most one partition so their rendered outputs never claim
    /// the same output pixel.
    pub fn contains_half_open(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y > self.min_y && y <= self.max_y
    }
}

// =============================================================================
// Tile Key
// =============================================================================

/// Address of one output tile: `(layer, zoom, column, row)`.
///
/// Column and row follow the XYZ convention: `(0, 0)` is the northwest
/// corner and both range over `0..2^zoom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub layer: String,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(layer: impl Into<String>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            layer: layer.into(),
            zoom,
            x,
            y,
        }
    }

    /// Mercator bounds of this tile.
    pub fn bounds(&self) -> Extent {
        let n = (1u32 << self.zoom) as f64;
        let tile_size = (2.0 * WEB_MERCATOR_MAX) / n;

        let min_x = -WEB_MERCATOR_MAX + self.x as f64 * tile_size;
        let max_y = WEB_MERCATOR_MAX - self.y as f64 * tile_size;

        Extent::new(min_x, max_y - tile_size, min_x + tile_size, max_y)
    }

    /// The tile at the next coarser zoom that contains this tile.
    pub fn parent(&self) -> Option<TileKey> {
        if self.zoom == 0 {
            return None;
        }
        Some(TileKey {
            layer: self.layer.clone(),
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Object key for the published tile: `{prefix}/{layer}/{z}/{x}/{y}.png`.
    ///
    /// This path scheme is the public contract tile servers rely on.
    pub fn object_key(&self, prefix: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{}/{}/{}/{}.png", self.layer, self.zoom, self.x, self.y)
        } else {
            format!(
                "{}/{}/{}/{}/{}.png",
                prefix, self.layer, self.zoom, self.x, self.y
            )
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.layer, self.zoom, self.x, self.y)
    }
}

/// All tile keys at `zoom` whose bounds intersect `extent`.
///
/// Keys are produced in row-major order (north to south, west to east),
/// clamped to the `2^zoom` grid.
pub fn tiles_for_extent(layer: &str, extent: &Extent, zoom: u8) -> Vec<TileKey> {
    let n = 1u32 << zoom;
    let tile_size = (2.0 * WEB_MERCATOR_MAX) / n as f64;

    let col_min = ((extent.min_x + WEB_MERCATOR_MAX) / tile_size).floor();
    let col_max = ((extent.max_x + WEB_MERCATOR_MAX) / tile_size).ceil();
    let row_min = ((WEB_MERCATOR_MAX - extent.max_y) / tile_size).floor();
    let row_max = ((WEB_MERCATOR_MAX - extent.min_y) / tile_size).ceil();

    let col_min = col_min.max(0.0) as u32;
    let col_max = (col_max.max(0.0) as u32).min(n);
    let row_min = row_min.max(0.0) as u32;
    let row_max = (row_max.max(0.0) as u32).min(n);

    let mut keys = Vec::new();
    for y in row_min..row_max {
        for x in col_min..col_max {
            let key = TileKey::new(layer, zoom, x, y);
            if key.bounds().intersects(extent) {
                keys.push(key);
            }
        }
    }
    keys
}

// =============================================================================
// Pixel Window
// =============================================================================

/// Rectangular region of a raster in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelWindow {
    pub fn new(col_off: u32, row_off: u32, width: u32, height: u32) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Expand the window by `halo` pixels on every side, clamped to the
    /// raster bounds. Resampling kernels need neighbor context past the
    /// window edge; the halo provides it without changing what is rendered.
    pub fn with_halo(&self, halo: u32, raster_width: u32, raster_height: u32) -> PixelWindow {
        let col_off = self.col_off.saturating_sub(halo);
        let row_off = self.row_off.saturating_sub(halo);
        let right = (self.col_off + self.width + halo).min(raster_width);
        let bottom = (self.row_off + self.height + halo).min(raster_height);
        PixelWindow::new(col_off, row_off, right - col_off, bottom - row_off)
    }
}

// =============================================================================
// Geo Transform
// =============================================================================

/// Affine mapping between pixel space and mercator space for a
/// north-up raster. Pixel `(0, 0)` is the northwest corner; mercator y
/// decreases as the pixel row increases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Mercator x of the west edge of pixel column 0
    pub origin_x: f64,
    /// Mercator y of the north edge of pixel row 0
    pub origin_y: f64,
    /// Pixel width in meters (positive)
    pub pixel_width: f64,
    /// Pixel height in meters (positive)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform covering `extent` with a raster of `width x height` pixels.
    pub fn from_extent(extent: &Extent, width: u32, height: u32) -> Self {
        Self {
            origin_x: extent.min_x,
            origin_y: extent.max_y,
            pixel_width: extent.width() / width as f64,
            pixel_height: extent.height() / height as f64,
        }
    }

    /// Mercator coordinates of the center of pixel `(col, row)`.
    pub fn pixel_center(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates of a mercator point.
    ///
    /// Integer values land on pixel centers: `(0.0, 0.0)` is the center of
    /// the top-left pixel.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width - 0.5,
            (self.origin_y - y) / self.pixel_height - 0.5,
        )
    }

    /// Mercator extent of a pixel window under this transform.
    pub fn window_extent(&self, window: &PixelWindow) -> Extent {
        let min_x = self.origin_x + window.col_off as f64 * self.pixel_width;
        let max_y = self.origin_y - window.row_off as f64 * self.pixel_height;
        Extent::new(
            min_x,
            max_y - window.height as f64 * self.pixel_height,
            min_x + window.width as f64 * self.pixel_width,
            max_y,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
