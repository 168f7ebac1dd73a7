//! Tile artifact encoding.
//!
//! Canvases are encoded as PNG: lossless, so re-encoding the same canvas is
//! byte-identical, and the alpha channel carries the validity mask. That
//! determinism is what makes publishing overwrite-idempotent across job
//! re-executions.

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, LumaA, Rgba};
use sha2::{Digest, Sha256};

use crate::error::RasterError;
use crate::geo::TileKey;

use super::canvas::TileCanvas;

/// One encoded output tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileArtifact {
    pub key: TileKey,

    /// Encoded PNG bytes
    pub data: Bytes,

    /// SHA-256 of `data`, hex-encoded
    pub checksum: String,
}

impl TileArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// PNG tile encoder.
#[derive(Debug, Clone, Default)]
pub struct TileEncoder {}

impl TileEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a canvas into a PNG artifact.
    ///
    /// One-band canvases become gray+alpha, three-band canvases RGBA;
    /// nodata pixels get alpha zero. Samples are clamped to `[0, 255]` and
    /// rounded.
    pub fn encode(&self, key: &TileKey, canvas: &TileCanvas) -> Result<TileArtifact, RasterError> {
        let size = canvas.size();

        let img = match canvas.bands() {
            1 => {
                let buf = ImageBuffer::from_fn(size, size, |x, y| match canvas.sample(x, y, 0) {
                    Some(v) => LumaA([quantize(v), 255]),
                    None => LumaA([0, 0]),
                });
                DynamicImage::ImageLumaA8(buf)
            }
            3 => {
                let buf = ImageBuffer::from_fn(size, size, |x, y| {
                    match (
                        canvas.sample(x, y, 0),
                        canvas.sample(x, y, 1),
                        canvas.sample(x, y, 2),
                    ) {
                        (Some(r), Some(g), Some(b)) => {
                            Rgba([quantize(r), quantize(g), quantize(b), 255])
                        }
                        _ => Rgba([0, 0, 0, 0]),
                    }
                });
                DynamicImage::ImageRgba8(buf)
            }
            other => return Err(RasterError::UnsupportedBands(other)),
        };

        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .map_err(|e| RasterError::Encode(e.to_string()))?;

        let checksum = hex::encode(Sha256::digest(&data));

        Ok(TileArtifact {
            key: key.clone(),
            data: Bytes::from(data),
            checksum,
        })
    }
}

fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

// =============================================================================
// Tests
// =============================================================================
