//! Nodata-aware resampling kernels.
//!
//! All kernels operate on masked `f32` rasters in fractional pixel space
//! (integer coordinates are pixel centers). Nodata pixels never enter the
//! arithmetic: their weights are dropped and the remainder renormalized. An
//! output sample with no valid support is `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::raster::Raster;

/// Resampling method for base-zoom rendering and pyramid aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
}

impl Resampling {
    /// Sample `raster` at fractional pixel coordinates with this method.
    pub fn sample(&self, raster: &Raster, x: f64, y: f64, band: usize) -> Option<f32> {
        match self {
            Resampling::Nearest => sample_nearest(raster, x, y, band),
            Resampling::Bilinear => sample_bilinear(raster, x, y, band),
            Resampling::Cubic => sample_cubic(raster, x, y, band),
        }
    }

    /// Reduce a 2x2 block of child samples to one parent sample.
    ///
    /// Children are ordered top-left, top-right, bottom-left, bottom-right.
    /// Nearest keeps the first valid child (top-left when present); bilinear
    /// and cubic take the mean of the valid children, which is the exact
    /// kernel result at a 2x reduction.
    pub fn reduce_block(&self, children: [Option<f32>; 4]) -> Option<f32> {
        match self {
            Resampling::Nearest => children.into_iter().flatten().next(),
            Resampling::Bilinear | Resampling::Cubic => {
                let valid: Vec<f32> = children.into_iter().flatten().collect();
                if valid.is_empty() {
                    None
                } else {
                    Some(valid.iter().sum::<f32>() / valid.len() as f32)
                }
            }
        }
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" => Ok(Resampling::Cubic),
            other => Err(format!("unknown method `{other}`")),
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resampling::Nearest => write!(f, "nearest"),
            Resampling::Bilinear => write!(f, "bilinear"),
            Resampling::Cubic => write!(f, "cubic"),
        }
    }
}

// =============================================================================
// Kernels
// =============================================================================

fn sample_nearest(raster: &Raster, x: f64, y: f64, band: usize) -> Option<f32> {
    raster.sample(x.round() as i64, y.round() as i64, band)
}

fn sample_bilinear(raster: &Raster, x: f64, y: f64, band: usize) -> Option<f32> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];

    weighted_sum(raster, band, taps.iter().copied())
}

/// Catmull-Rom weight (cubic convolution, a = -0.5).
fn cubic_weight(d: f64) -> f64 {
    const A: f64 = -0.5;
    let d = d.abs();
    if d <= 1.0 {
        (A + 2.0) * d * d * d - (A + 3.0) * d * d + 1.0
    } else if d < 2.0 {
        A * d * d * d - 5.0 * A * d * d + 8.0 * A * d - 4.0 * A
    } else {
        0.0
    }
}

fn sample_cubic(raster: &Raster, x: f64, y: f64, band: usize) -> Option<f32> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;

    let taps = (-1..=2).flat_map(|dy| {
        (-1..=2).map(move |dx| {
            let col = x0 + dx;
            let row = y0 + dy;
            let w = cubic_weight(x - col as f64) * cubic_weight(y - row as f64);
            (col, row, w)
        })
    });

    weighted_sum(raster, band, taps)
}

/// Weighted sum over valid taps, renormalized by the valid weight mass.
fn weighted_sum(
    raster: &Raster,
    band: usize,
    taps: impl Iterator<Item = (i64, i64, f64)>,
) -> Option<f32> {
    let mut acc = 0.0f64;
    let mut weight = 0.0f64;

    for (col, row, w) in taps {
        if w == 0.0 {
            continue;
        }
        if let Some(v) = raster.sample(col, row, band) {
            acc += v as f64 * w;
            weight += w;
        }
    }

    if weight.abs() < 1e-9 {
        None
    } else {
        Some((acc / weight) as f32)
    }
}

// =============================================================================
// Tests
// =============================================================================
