//! Tile pyramid builder.
//!
//! Turns partitioned raster data into encoded tile artifacts:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     per partition                        │
//! │  render_partition: reproject/resample -> base canvases   │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ merge per TileKey
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  downsample_level: zoom z -> z-1 by 2x2 block reduction  │
//! │  (repeated down to the job's minZoom)                    │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │        TileEncoder: canvas -> PNG TileArtifact           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Resampling`]: nodata-aware nearest / bilinear / cubic kernels
//! - [`TileCanvas`]: per-tile accumulation buffer with commutative merge
//! - [`render_partition`] / [`downsample_level`]: the two pyramid operations
//! - [`TileEncoder`] / [`TileArtifact`]: deterministic PNG encoding

mod builder;
mod canvas;
mod encoder;
mod resample;

pub use builder::{downsample_level, render_partition, RenderParams};
pub use canvas::TileCanvas;
pub use encoder::{TileArtifact, TileEncoder};
pub use resample::Resampling;
