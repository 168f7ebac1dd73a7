//! Raster Tiler - a queue-driven Web Mercator tile pyramid builder.
//!
//! This binary wires the queue, storage, and pipeline components together
//! and runs the poll loop until killed.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raster_tiler::{
    config::Config,
    create_s3_client, create_sqs_client,
    pipeline::{JobRunner, Worker},
    queue::{NullStatusReporter, SqsJobQueue, SqsStatusReporter, StatusReporter},
    storage::S3ObjectStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Raster Tiler v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Job queue: {}", config.queue_url);
    match &config.status_queue_url {
        Some(url) => info!("  Status queue: {}", url),
        None => info!("  Status queue: none (status records dropped)"),
    }
    info!("  Region: {}", config.aws_region);
    if let Some(ref endpoint) = config.endpoint_url {
        info!("  Endpoint: {}", endpoint);
    }
    info!(
        "  Rendering: {}px tiles, {} default resampling, {} px/partition, {} parallel tasks",
        config.tile_size,
        config.default_resampling,
        config.max_pixels_per_partition,
        config.parallelism()
    );
    info!(
        "  Delivery: {} redeliveries max, {}s visibility heartbeat, {}s long poll",
        config.max_redeliveries, config.visibility_extension_secs, config.poll_wait_secs
    );

    // Create AWS clients
    let s3_client = create_s3_client(config.endpoint_url.as_deref(), &config.aws_region).await;
    let sqs_client = create_sqs_client(config.endpoint_url.as_deref(), &config.aws_region).await;

    let store = Arc::new(S3ObjectStore::new(s3_client));
    let queue = Arc::new(SqsJobQueue::new(sqs_client.clone(), config.queue_url.clone()));

    let reporter: Arc<dyn StatusReporter> = match &config.status_queue_url {
        Some(url) => Arc::new(SqsStatusReporter::new(sqs_client, url.clone())),
        None => Arc::new(NullStatusReporter),
    };

    let runner = JobRunner::new(queue, store, reporter, config);
    let worker = Worker::new(runner);

    // Runs until the process is killed; in-flight visibility windows lapse
    // on their own and the queue redelivers.
    worker.run().await;

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "raster_tiler=debug"
    } else {
        "raster_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
