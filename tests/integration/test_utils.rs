//! Test utilities for integration tests.
//!
//! Provides in-memory mock implementations of the queue and object store,
//! plus helpers for building deterministic source rasters and job messages.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};

use raster_tiler::config::Config;
use raster_tiler::error::{QueueError, StorageError};
use raster_tiler::geo::WEB_MERCATOR_MAX;
use raster_tiler::pyramid::Resampling;
use raster_tiler::queue::{JobMessage, JobQueue, StatusRecord, StatusReporter};
use raster_tiler::storage::ObjectStore;

// =============================================================================
// Mock Job Queue
// =============================================================================

/// In-memory queue with at-least-once semantics and full accounting.
///
/// Received messages move to an in-flight set; `release` puts them back at
/// the end of the pending queue with an incremented receive count, exactly
/// like a lapsed or zeroed visibility window would.
pub struct MockJobQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<JobMessage>,
    in_flight: HashMap<String, JobMessage>,
    acknowledged: Vec<String>,
    released: Vec<String>,
    extensions: Vec<(String, u32)>,
    next_handle: u32,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Enqueue a job body as a fresh (first-delivery) message.
    pub fn push_job(&self, body: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.next_handle += 1;
        let handle = format!("handle-{}", state.next_handle);
        state.pending.push_back(JobMessage {
            body: body.into(),
            handle,
            receive_count: 1,
        });
    }

    pub fn acknowledged_count(&self) -> usize {
        self.state.lock().unwrap().acknowledged.len()
    }

    pub fn released_count(&self) -> usize {
        self.state.lock().unwrap().released.len()
    }

    pub fn extension_count(&self) -> usize {
        self.state.lock().unwrap().extensions.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn receive(&self, _wait_secs: u32) -> Result<Option<JobMessage>, QueueError> {
        let mut state = self.state.lock().unwrap();
        let Some(message) = state.pending.pop_front() else {
            return Ok(None);
        };
        state
            .in_flight
            .insert(message.handle.clone(), message.clone());
        Ok(Some(message))
    }

    async fn extend_visibility(&self, handle: &str, secs: u32) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.extensions.push((handle.to_string(), secs));
        Ok(())
    }

    async fn acknowledge(&self, handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(handle);
        state.acknowledged.push(handle.to_string());
        Ok(())
    }

    async fn release(&self, handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.released.push(handle.to_string());
        if let Some(mut message) = state.in_flight.remove(handle) {
            message.receive_count += 1;
            state.pending.push_back(message);
        }
        Ok(())
    }
}

// =============================================================================
// Mock Object Store
// =============================================================================

/// In-memory object store with transient failure injection.
pub struct MockObjectStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
    get_failures: AtomicUsize,
    put_failures: AtomicUsize,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            get_failures: AtomicUsize::new(0),
            put_failures: AtomicUsize::new(0),
        }
    }

    pub fn with_object(self, bucket: &str, key: &str, data: Vec<u8>) -> Self {
        self.objects
            .write()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), Bytes::from(data));
        self
    }

    /// Fail the next `count` get calls with a transient error.
    pub fn fail_next_gets(&self, count: usize) {
        self.get_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` put calls with a transient error.
    pub fn fail_next_puts(&self, count: usize) {
        self.put_failures.store(count, Ordering::SeqCst);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.objects
            .read()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }

    /// All keys in `bucket` starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Claim one injected failure if any remain.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        if take_failure(&self.get_failures) {
            return Err(StorageError::Transient {
                uri: format!("s3://{bucket}/{key}"),
                message: "injected failure".to_string(),
            });
        }
        self.object(bucket, key)
            .ok_or_else(|| StorageError::NotFound(format!("s3://{bucket}/{key}")))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if take_failure(&self.put_failures) {
            return Err(StorageError::Transient {
                uri: format!("s3://{bucket}/{key}"),
                message: "injected failure".to_string(),
            });
        }
        self.objects
            .write()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }
}

// =============================================================================
// Recording Status Reporter
// =============================================================================

/// Captures every reported status record.
pub struct RecordingReporter {
    records: Mutex<Vec<StatusRecord>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<StatusRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, record: StatusRecord) {
        self.records.lock().unwrap().push(record);
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Deterministic RGB source: `r = col % 256`, `g = row % 256`, and `b`
/// constant per 256px block so tiles from different blocks are
/// distinguishable.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let block = ((x / 256) * 2 + y / 256) * 50 % 256;
        Rgb([(x % 256) as u8, (y % 256) as u8, block as u8])
    });
    encode_png(DynamicImage::ImageRgb8(img))
}

/// Single-band source filled with one value.
pub fn uniform_gray_png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    encode_png(DynamicImage::ImageLuma8(img))
}

fn encode_png(img: DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}

/// A valid job body over the northwest world quadrant.
///
/// With a 512x512 source and `maxZoom: 2`, the quadrant maps 1:1 onto four
/// 256px base tiles, so resampled values are exact.
pub fn job_body(job_id: &str) -> serde_json::Value {
    serde_json::json!({
        "jobId": job_id,
        "sourceUri": format!("s3://imagery/{job_id}.png"),
        "sourceExtent": [-WEB_MERCATOR_MAX, 0.0, 0.0, WEB_MERCATOR_MAX],
        "destinationPrefix": format!("s3://tiles/jobs/{job_id}"),
        "layerId": "scene",
        "minZoom": 0,
        "maxZoom": 2,
        "resampling": "bilinear"
    })
}

/// Worker configuration sized for a 512x512 source split into four
/// partitions.
pub fn test_config() -> Config {
    Config {
        queue_url: "mock://tiling-jobs".to_string(),
        status_queue_url: None,
        max_redeliveries: 2,
        visibility_extension_secs: 60,
        poll_wait_secs: 0,
        aws_region: "us-east-1".to_string(),
        endpoint_url: None,
        max_pixels_per_partition: 256 * 256,
        partition_parallelism: Some(2),
        default_resampling: Resampling::Bilinear,
        tile_size: 256,
        verbose: false,
    }
}
