//! Pyramid consistency tests over published tile bytes.
//!
//! The fixture geometry is exact: a 512x512 source over the northwest world
//! quadrant maps 1:1 onto four 256px tiles at zoom 2, so base-zoom samples
//! hit source pixel centers and expected values can be computed by hand.
//!
//! Tests verify:
//! - Base tiles reproduce source pixels exactly
//! - Each parent pixel is the 2x2 aggregation of its children
//! - Coverage shrinks correctly at coarser zooms (alpha marks nodata)
//! - Single-band sources publish grayscale+alpha tiles

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

use raster_tiler::job::JobOutcome;
use raster_tiler::pipeline::{JobRunner, Worker};
use raster_tiler::storage::ObjectStore;

use super::test_utils::{
    gradient_png, job_body, test_config, uniform_gray_png, MockJobQueue, MockObjectStore,
    RecordingReporter,
};

/// Run one gradient job to completion and return the store.
async fn run_gradient_job(resampling: &str) -> Arc<MockObjectStore> {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "px.png",
        gradient_png(512, 512),
    ));

    let mut body = job_body("px");
    body["resampling"] = resampling.into();
    queue.push_job(body.to_string());

    let worker = Worker::new(JobRunner::new(
        queue,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(RecordingReporter::new()),
        test_config(),
    ));
    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );
    store
}

fn decode_tile(store: &MockObjectStore, key: &str) -> DynamicImage {
    let bytes = store
        .object("tiles", key)
        .unwrap_or_else(|| panic!("missing tile {key}"));
    image::load_from_memory(&bytes).expect("published tile decodes")
}

// =============================================================================
// Base Zoom Fidelity
// =============================================================================

#[tokio::test]
async fn test_base_tiles_reproduce_source_pixels() {
    let store = run_gradient_job("bilinear").await;

    // Source and base tile grids align pixel-for-pixel
    let tile = decode_tile(&store, "jobs/px/scene/2/0/0.png");
    assert_eq!(tile.dimensions(), (256, 256));
    assert_eq!(tile.get_pixel(10, 20).0, [10, 20, 0, 255]);
    assert_eq!(tile.get_pixel(255, 255).0, [255, 255, 0, 255]);

    // Southeast base tile carries its own block value in the blue band
    let tile = decode_tile(&store, "jobs/px/scene/2/1/1.png");
    assert_eq!(tile.get_pixel(3, 5).0, [3, 5, 150, 255]);
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn test_parent_pixels_average_children() {
    let store = run_gradient_job("bilinear").await;

    // Zoom 1 pixel (c, r) averages the 2x2 source block at (2c, 2r):
    // red = mean(20, 21) = 20.5, quantized to 21
    let tile = decode_tile(&store, "jobs/px/scene/1/0/0.png");
    assert_eq!(tile.get_pixel(10, 10).0, [21, 21, 0, 255]);

    // Pixel (200, 200) falls in the southeast child (block value 150):
    // red = mean(400 % 256, 401 % 256) = 144.5, quantized to 145
    assert_eq!(tile.get_pixel(200, 200).0, [145, 145, 150, 255]);

    // Zoom 0 aggregates the unquantized zoom 1 canvas once more:
    // red = mean(40.5, 42.5, 40.5, 42.5) = 41.5, quantized to 42
    let tile = decode_tile(&store, "jobs/px/scene/0/0/0.png");
    assert_eq!(tile.get_pixel(10, 10).0, [42, 42, 0, 255]);
}

#[tokio::test]
async fn test_nearest_aggregation_takes_top_left_child() {
    let store = run_gradient_job("nearest").await;

    // Nearest keeps the top-left sample of each 2x2 block instead of the mean
    let tile = decode_tile(&store, "jobs/px/scene/1/0/0.png");
    assert_eq!(tile.get_pixel(10, 10).0, [20, 20, 0, 255]);
}

#[tokio::test]
async fn test_coverage_shrinks_at_coarse_zooms() {
    let store = run_gradient_job("bilinear").await;

    // The source covers one world quadrant, so the zoom 0 tile is valid only
    // in its northwest quarter; everything else is transparent nodata.
    let tile = decode_tile(&store, "jobs/px/scene/0/0/0.png");
    assert_eq!(tile.get_pixel(127, 127).0[3], 255);
    assert_eq!(tile.get_pixel(128, 128).0[3], 0);
    assert_eq!(tile.get_pixel(200, 30).0[3], 0);
    assert_eq!(tile.get_pixel(30, 200).0[3], 0);
}

// =============================================================================
// Single-Band Sources
// =============================================================================

#[tokio::test]
async fn test_single_band_source_publishes_gray_alpha() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "gray.png",
        uniform_gray_png(512, 512, 9),
    ));
    queue.push_job(job_body("gray").to_string());

    let worker = Worker::new(JobRunner::new(
        queue,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(RecordingReporter::new()),
        test_config(),
    ));
    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );

    let tile = decode_tile(&store, "jobs/gray/scene/2/1/0.png");
    let gray = tile.to_luma_alpha8();
    assert_eq!(gray.get_pixel(40, 40).0, [9, 255]);

    // A uniform source stays uniform through every aggregation level
    let tile = decode_tile(&store, "jobs/gray/scene/0/0/0.png");
    let gray = tile.to_luma_alpha8();
    assert_eq!(gray.get_pixel(10, 10).0, [9, 255]);
}
