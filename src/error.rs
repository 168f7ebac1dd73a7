use thiserror::Error;

/// Errors from the object storage gateway.
///
/// Transient failures are retried with bounded backoff inside the gateway;
/// what escapes here is either a definitive miss or an exhausted retry budget.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Network or service error that may succeed on retry
    #[error("Transient storage error for {uri}: {message}")]
    Transient { uri: String, message: String },

    /// Retry budget exhausted for a transient error
    #[error("Storage unavailable after {attempts} attempts for {uri}: {message}")]
    Exhausted {
        uri: String,
        attempts: u32,
        message: String,
    },
}

/// Errors from the job queue adapter.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Network or service error that may succeed on retry
    #[error("Transient queue error: {0}")]
    Transient(String),

    /// Retry budget exhausted; fatal for the current poll cycle only
    #[error("Queue unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
}

/// Errors from parsing and validating a job message.
///
/// All variants are non-retryable: the message is poison and must be
/// acknowledged (removed from the queue) after logging, never redelivered.
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// The message body is not valid JSON or is missing required fields
    #[error("Malformed job message: {0}")]
    Parse(String),

    /// A field parsed but failed semantic validation
    #[error("Invalid job descriptor field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failure scoped to a single raster partition.
///
/// Retryable: the job may be released back to the queue and re-executed,
/// and sibling partitions of the same job continue unaffected.
#[derive(Debug, Clone, Error)]
#[error("Partition {index} failed: {source}")]
pub struct PartitionError {
    /// Index of the failed partition within the job's partition grid
    pub index: usize,
    #[source]
    pub source: StorageError,
}

/// Errors raised while decoding source imagery or encoding tile artifacts.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// Source bytes could not be decoded as a supported image format
    #[error("Failed to decode source raster: {0}")]
    Decode(String),

    /// Tile canvas could not be encoded
    #[error("Failed to encode tile: {0}")]
    Encode(String),

    /// Band layout is not supported by the pipeline
    #[error("Unsupported band count: {0} (expected 1 or 3)")]
    UnsupportedBands(usize),

    /// Requested window falls outside the raster
    #[error("Window out of bounds: {col_off},{row_off} {width}x{height} in {raster_width}x{raster_height}")]
    WindowOutOfBounds {
        col_off: u32,
        row_off: u32,
        width: u32,
        height: u32,
        raster_width: u32,
        raster_height: u32,
    },
}

/// Aggregate job failure, classified for the ack-vs-release decision.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Poison input: logged and acknowledged, never redelivered
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Source raster could not be opened
    #[error("Failed to open source raster: {0}")]
    SourceUnavailable(#[from] StorageError),

    /// Source raster could not be decoded
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// One or more partitions failed; the first failure is carried
    #[error("{failed} of {total} partitions failed; first: {first}")]
    Partitions {
        failed: usize,
        total: usize,
        first: PartitionError,
    },

    /// Publishing a tile artifact failed after internal retries
    #[error("Failed to publish tile {key}: {source}")]
    Publish {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl PipelineError {
    /// Whether releasing the message for redelivery could help.
    ///
    /// Structural errors (bad descriptor, undecodable source) will fail
    /// identically on every delivery and are dropped instead.
    pub fn retryable(&self) -> bool {
        match self {
            PipelineError::Descriptor(_) => false,
            PipelineError::Raster(_) => false,
            PipelineError::SourceUnavailable(e) => !matches!(e, StorageError::NotFound(_)),
            PipelineError::Partitions { .. } => true,
            PipelineError::Publish { .. } => true,
        }
    }
}
