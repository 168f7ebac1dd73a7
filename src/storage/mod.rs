//! Storage gateway.
//!
//! Uniform read/write of raster objects and tile objects against an object
//! store. The [`ObjectStore`] trait abstracts bucket/key addressing so the
//! pipeline and tests can run against an in-memory store; [`S3ObjectStore`]
//! is the production implementation with retry-on-transient-error baked in.
//!
//! Writes are overwrite-idempotent: publishing the same artifact twice
//! leaves the same stored bytes as publishing it once, which makes duplicate
//! job execution (at-least-once delivery, abandoned visibility timeouts)
//! safe.

mod s3;

pub use s3::{create_s3_client, S3ObjectStore};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::StorageError;
use crate::job::JobManifest;
use crate::pyramid::TileArtifact;

/// Content type for published tiles.
pub const TILE_CONTENT_TYPE: &str = "image/png";

/// Content type for published job manifests.
pub const MANIFEST_CONTENT_TYPE: &str = "application/json";

// =============================================================================
// Object URI
// =============================================================================

/// Parsed `s3://bucket/key` address.
///
/// For destination URIs the key part is the tile prefix under which the
/// `{layer}/{z}/{x}/{y}.png` hierarchy is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` URI.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let parsed = Url::parse(uri).map_err(|e| format!("malformed URI `{uri}`: {e}"))?;

        if parsed.scheme() != "s3" {
            return Err(format!(
                "unsupported scheme `{}` in `{uri}` (expected s3)",
                parsed.scheme()
            ));
        }

        let bucket = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("missing bucket in `{uri}`"))?;

        let key = parsed.path().trim_start_matches('/');

        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

// =============================================================================
// Object Store
// =============================================================================

/// Byte-level access to an object store.
///
/// Implementations absorb transient failures internally (bounded backoff)
/// and must be safe for concurrent use by many in-flight partition tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's full contents.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Write an object, overwriting any existing content under the key.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

// =============================================================================
// Tile Writer
// =============================================================================

/// Publishes tile artifacts under a destination prefix.
pub struct TileWriter {
    store: Arc<dyn ObjectStore>,
}

impl TileWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Write one artifact to `{destination}/{layer}/{z}/{x}/{y}.png`.
    ///
    /// Tile content is deterministic per key within a job execution, so a
    /// retried write changes nothing observable.
    pub async fn publish(
        &self,
        destination: &ObjectUri,
        artifact: &TileArtifact,
    ) -> Result<(), StorageError> {
        let key = artifact.key.object_key(&destination.key);
        debug!(
            tile = %artifact.key,
            uri = %ObjectUri::new(&destination.bucket, &key),
            bytes = artifact.len(),
            checksum = %artifact.checksum,
            "Publishing tile"
        );
        self.store
            .put(
                &destination.bucket,
                &key,
                artifact.data.clone(),
                TILE_CONTENT_TYPE,
            )
            .await
    }

    /// Write the completion manifest to `{destination}/{layer}/manifest.json`.
    pub async fn publish_manifest(
        &self,
        destination: &ObjectUri,
        manifest: &JobManifest,
    ) -> Result<(), StorageError> {
        let key = JobManifest::object_key(&destination.key, &manifest.layer_id);
        let data = manifest.to_json().map_err(|e| StorageError::Transient {
            uri: ObjectUri::new(&destination.bucket, &key).to_string(),
            message: format!("manifest encoding failed: {e}"),
        })?;
        debug!(
            uri = %ObjectUri::new(&destination.bucket, &key),
            tiles = manifest.tile_count,
            "Publishing job manifest"
        );
        self.store
            .put(&destination.bucket, &key, data, MANIFEST_CONTENT_TYPE)
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================
