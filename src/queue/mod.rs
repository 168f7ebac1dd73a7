//! Job queue adapter.
//!
//! Abstracts the at-least-once queue contract: messages received here stay
//! invisible to other consumers for a visibility window, which the pipeline
//! extends periodically while legitimately working; a message is either
//! acknowledged (deleted) on a terminal outcome or released (visibility
//! zeroed) for immediate redelivery. Consumers MUST be idempotent — the same
//! job arriving twice is a normal case, not an edge case.
//!
//! [`StatusReporter`] is the job-progress side channel: start / finish /
//! failure records posted to an optional status queue for the next pipeline
//! stage to consume.

mod sqs;

pub use sqs::{create_sqs_client, SqsJobQueue, SqsStatusReporter};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::QueueError;

/// Pipeline stage name carried in status records.
pub const STAGE_NAME: &str = "tile";

// =============================================================================
// Job Message
// =============================================================================

/// One received queue message.
#[derive(Debug, Clone)]
pub struct JobMessage {
    /// Raw message body (job descriptor JSON)
    pub body: String,

    /// Opaque handle for acknowledge / release / extend operations
    pub handle: String,

    /// How many times the queue has delivered this message, this delivery
    /// included. Drives the dead-letter decision.
    pub receive_count: u32,
}

// =============================================================================
// Job Queue
// =============================================================================

/// At-least-once job queue.
///
/// Implementations absorb transient errors with bounded backoff; an
/// exhausted budget surfaces as [`QueueError::Unavailable`], which is fatal
/// for the current poll cycle only.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Poll for one message, waiting up to `wait_secs` (long poll).
    async fn receive(&self, wait_secs: u32) -> Result<Option<JobMessage>, QueueError>;

    /// Push the message's visibility window out by `secs` from now.
    async fn extend_visibility(&self, handle: &str, secs: u32) -> Result<(), QueueError>;

    /// Delete the message: the job reached a terminal outcome.
    async fn acknowledge(&self, handle: &str) -> Result<(), QueueError>;

    /// Zero the visibility window so the queue redelivers immediately.
    async fn release(&self, handle: &str) -> Result<(), QueueError>;
}

// =============================================================================
// Status Reporting
// =============================================================================

/// Terminal and progress states reported per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Started,
    Finished,
    Failed,
}

/// One status record, serialized as JSON for the status queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub job_id: String,
    pub stage: &'static str,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusRecord {
    pub fn started(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            stage: STAGE_NAME,
            status: JobStatus::Started,
            error: None,
        }
    }

    pub fn finished(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            stage: STAGE_NAME,
            status: JobStatus::Finished,
            error: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            stage: STAGE_NAME,
            status: JobStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Sink for job status records.
///
/// Reporting is best-effort: implementations log failures but never fail
/// the job over them.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, record: StatusRecord);
}

/// Reporter used when no status queue is configured.
#[derive(Debug, Default)]
pub struct NullStatusReporter;

#[async_trait]
impl StatusReporter for NullStatusReporter {
    async fn report(&self, _record: StatusRecord) {}
}

// =============================================================================
// Tests
// =============================================================================
