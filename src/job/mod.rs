//! Job descriptor parsing and validation.
//!
//! A job message body is a JSON document describing one tiling request:
//!
//! ```json
//! {
//!   "jobId": "a1b2c3",
//!   "sourceUri": "s3://imagery/scenes/a1b2c3.png",
//!   "sourceExtent": [-20037508.34, 0.0, 0.0, 20037508.34],
//!   "destinationPrefix": "s3://tiles/jobs/a1b2c3",
//!   "layerId": "scene",
//!   "minZoom": 0,
//!   "maxZoom": 2,
//!   "resampling": "bilinear",
//!   "crs": "EPSG:3857",
//!   "nodata": 0.0
//! }
//! ```
//!
//! `sourceExtent` georeferences the source in Web Mercator meters
//! (`[minX, minY, maxX, maxY]`); `crs` and `nodata` are optional. Parsing is
//! deterministic and any violation is non-retryable: the message is poison
//! and gets acknowledged after logging, never redelivered.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::geo::{Extent, TileKey, MAX_ZOOM};
use crate::pyramid::Resampling;
use crate::storage::ObjectUri;

/// Coordinate reference system of the output tile grid.
pub const OUTPUT_CRS: &str = "EPSG:3857";

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireJob {
    job_id: String,
    source_uri: String,
    source_extent: [f64; 4],
    destination_prefix: String,
    layer_id: String,
    min_zoom: u8,
    max_zoom: u8,
    #[serde(default)]
    resampling: Option<String>,
    #[serde(default)]
    crs: Option<String>,
    #[serde(default)]
    nodata: Option<f32>,
}

// =============================================================================
// Job Descriptor
// =============================================================================

/// Parsed, validated representation of one tiling request.
///
/// Immutable once parsed; partition tasks receive it by value (via clone)
/// so they stay pure functions of `(partition, descriptor)`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    /// Unique identifier carried by the queue message
    pub job_id: String,

    /// Source raster object
    pub source: ObjectUri,

    /// Mercator extent of the source raster
    pub source_extent: Extent,

    /// Destination bucket and tile prefix
    pub destination: ObjectUri,

    /// Output layer identifier (first path segment under the prefix)
    pub layer_id: String,

    /// Coarsest zoom to produce
    pub min_zoom: u8,

    /// Finest zoom to produce (the base rendering zoom)
    pub max_zoom: u8,

    /// Resampling method for rendering and aggregation
    pub resampling: Resampling,

    /// Sample value to treat as nodata, if any
    pub nodata: Option<f32>,
}

impl JobDescriptor {
    /// Parse and validate a job message body.
    ///
    /// `default_resampling` applies when the message omits the `resampling`
    /// field.
    pub fn parse(body: &str, default_resampling: Resampling) -> Result<Self, DescriptorError> {
        let wire: WireJob =
            serde_json::from_str(body).map_err(|e| DescriptorError::Parse(e.to_string()))?;

        let source = ObjectUri::parse(&wire.source_uri).map_err(|reason| {
            DescriptorError::InvalidField {
                field: "sourceUri",
                reason,
            }
        })?;

        let destination = ObjectUri::parse(&wire.destination_prefix).map_err(|reason| {
            DescriptorError::InvalidField {
                field: "destinationPrefix",
                reason,
            }
        })?;

        if wire.job_id.is_empty() {
            return Err(DescriptorError::InvalidField {
                field: "jobId",
                reason: "must not be empty".to_string(),
            });
        }

        if wire.layer_id.is_empty() || wire.layer_id.contains('/') {
            return Err(DescriptorError::InvalidField {
                field: "layerId",
                reason: "must be non-empty and must not contain `/`".to_string(),
            });
        }

        if wire.max_zoom > MAX_ZOOM {
            return Err(DescriptorError::InvalidField {
                field: "maxZoom",
                reason: format!("{} exceeds maximum {}", wire.max_zoom, MAX_ZOOM),
            });
        }

        if wire.min_zoom > wire.max_zoom {
            return Err(DescriptorError::InvalidField {
                field: "minZoom",
                reason: format!(
                    "minZoom {} exceeds maxZoom {}",
                    wire.min_zoom, wire.max_zoom
                ),
            });
        }

        let resampling = match &wire.resampling {
            Some(name) => name
                .parse()
                .map_err(|reason| DescriptorError::InvalidField {
                    field: "resampling",
                    reason,
                })?,
            None => default_resampling,
        };

        if let Some(crs) = &wire.crs {
            if crs != OUTPUT_CRS {
                return Err(DescriptorError::InvalidField {
                    field: "crs",
                    reason: format!("unsupported output CRS `{crs}` (expected {OUTPUT_CRS})"),
                });
            }
        }

        let [min_x, min_y, max_x, max_y] = wire.source_extent;
        let source_extent = Extent::new(min_x, min_y, max_x, max_y);
        if !source_extent.is_valid() {
            return Err(DescriptorError::InvalidField {
                field: "sourceExtent",
                reason: "bounds must be finite with minX < maxX and minY < maxY".to_string(),
            });
        }

        Ok(Self {
            job_id: wire.job_id,
            source,
            source_extent,
            destination,
            layer_id: wire.layer_id,
            min_zoom: wire.min_zoom,
            max_zoom: wire.max_zoom,
            resampling,
            nodata: wire.nodata,
        })
    }

    /// Number of zoom levels this job produces.
    pub fn zoom_count(&self) -> u8 {
        self.max_zoom - self.min_zoom + 1
    }
}

// =============================================================================
// Job Outcome
// =============================================================================

/// Terminal state of one job execution.
///
/// Exactly one outcome is recorded per execution; it drives the
/// acknowledge-vs-release decision and the status report.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// All tiles published and the message acknowledged
    Succeeded { tile_count: usize },

    /// Terminal failure; `retryable` tells whether the message was released
    /// for redelivery (true) or acknowledged as poison/dead-letter (false)
    Failed { reason: String, retryable: bool },
}

// =============================================================================
// Job Manifest
// =============================================================================

/// Inclusive column/row bounds of a set of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBounds {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl GridBounds {
    /// Bounding rectangle of `keys`; `None` when the set is empty.
    pub fn from_keys<'a>(keys: impl Iterator<Item = &'a TileKey>) -> Option<GridBounds> {
        let mut bounds: Option<GridBounds> = None;
        for key in keys {
            let b = bounds.get_or_insert(GridBounds {
                min_col: key.x,
                min_row: key.y,
                max_col: key.x,
                max_row: key.y,
            });
            b.min_col = b.min_col.min(key.x);
            b.min_row = b.min_row.min(key.y);
            b.max_col = b.max_col.max(key.x);
            b.max_row = b.max_row.max(key.y);
        }
        bounds
    }
}

/// Completion summary published beside the tiles once a job succeeds.
///
/// Written to `{prefix}/{layer}/manifest.json`, last, so its presence tells
/// downstream stages the tile tree above it is complete without listing it.
/// `gridBounds` is the bounding rectangle of the published base-zoom tiles;
/// it is omitted when the job produced none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    pub job_id: String,
    pub layer_id: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub tile_count: usize,

    /// Source mercator extent as `[minX, minY, maxX, maxY]`
    pub extent: [f64; 4],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_bounds: Option<GridBounds>,
}

impl JobManifest {
    /// Object key of the manifest under `prefix`.
    pub fn object_key(prefix: &str, layer: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{layer}/manifest.json")
        } else {
            format!("{prefix}/{layer}/manifest.json")
        }
    }

    /// Serialize to the stored JSON form.
    ///
    /// Field order is fixed by the struct, so the bytes are deterministic
    /// and manifest writes stay overwrite-idempotent like the tiles.
    pub fn to_json(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec_pretty(self).map(Bytes::from)
    }
}

// =============================================================================
// Tests
// =============================================================================
