//! Source raster access.
//!
//! [`RasterSource`] is the seam between the tiling pipeline and the raster
//! codec capability: the pipeline only ever asks for metadata and pixel
//! windows, so the codec behind it is swappable (and mockable in tests).
//!
//! [`ImageObjectSource`] is the production implementation: it fetches the
//! whole object through the storage gateway once, decodes it with the
//! `image` crate, and serves windows from the decoded raster. Georeferencing
//! comes from the job message, since plain image containers carry none.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PipelineError, RasterError, StorageError};
use crate::geo::{Extent, PixelWindow};
use crate::storage::{ObjectStore, ObjectUri};

use super::{Raster, RasterMetadata};

/// Read access to one source raster.
///
/// Implementations must be safe for concurrent use: many partition tasks of
/// the same job read windows in parallel.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Shape and georeferencing of the source.
    fn metadata(&self) -> &RasterMetadata;

    /// Read a pixel window. The window must lie within the raster bounds.
    async fn read_window(&self, window: &PixelWindow) -> Result<Raster, StorageError>;
}

/// [`RasterSource`] backed by a single image object in the object store.
///
/// The object is fetched and decoded once at open; windows are then served
/// from memory. Suits sources up to the size class this worker is partitioned
/// for; a block-based codec would slot in behind the same trait.
pub struct ImageObjectSource {
    metadata: RasterMetadata,
    raster: Raster,
}

impl ImageObjectSource {
    /// Fetch `uri` through the gateway and decode it.
    ///
    /// `extent` georeferences the raster in mercator space; `nodata` is the
    /// optional sentinel sample value from the job descriptor.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        uri: &ObjectUri,
        extent: Extent,
        nodata: Option<f32>,
    ) -> Result<Self, PipelineError> {
        let bytes = store.get(&uri.bucket, &uri.key).await?;
        debug!(uri = %uri, size = bytes.len(), "Fetched source raster");

        let img = image::load_from_memory(&bytes)
            .map_err(|e| RasterError::Decode(format!("{uri}: {e}")))?;

        let raster = Raster::from_image(&img, nodata)?;

        let metadata = RasterMetadata {
            width: raster.width(),
            height: raster.height(),
            bands: raster.bands(),
            extent,
            nodata,
        };

        Ok(Self { metadata, raster })
    }
}

#[async_trait]
impl RasterSource for ImageObjectSource {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    async fn read_window(&self, window: &PixelWindow) -> Result<Raster, StorageError> {
        // The partitioner only produces in-bounds windows, so a miss here is
        // a bug; surface it as a transient so the job is eligible for retry.
        self.raster.window(window).map_err(|e| StorageError::Transient {
            uri: "<decoded source>".to_string(),
            message: e.to_string(),
        })
    }
}
