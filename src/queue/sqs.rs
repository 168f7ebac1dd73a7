use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::retry::{with_backoff, Attempt, BackoffPolicy, RetryError};

use super::{JobMessage, JobQueue, StatusRecord, StatusReporter};

/// SQS-backed implementation of [`JobQueue`].
///
/// Uses long polling for receive, `ChangeMessageVisibility` for both
/// extension and release, and `DeleteMessage` for acknowledge. The
/// `ApproximateReceiveCount` system attribute carries the redelivery count.
#[derive(Clone)]
pub struct SqsJobQueue {
    client: Client,
    queue_url: String,
    backoff: BackoffPolicy,
}

impl SqsJobQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Override the retry budget (mainly for tests).
    pub fn with_backoff(client: Client, queue_url: impl Into<String>, backoff: BackoffPolicy) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            backoff,
        }
    }

    fn map_retry_error(err: RetryError<String>) -> QueueError {
        match err {
            RetryError::Fatal(message) => QueueError::Transient(message),
            RetryError::Exhausted { attempts, last } => QueueError::Unavailable {
                attempts,
                message: last,
            },
        }
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn receive(&self, wait_secs: u32) -> Result<Option<JobMessage>, QueueError> {
        let output = with_backoff(self.backoff, "sqs.receive_message", || async {
            self.client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(1)
                .wait_time_seconds(wait_secs as i32)
                .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
                .send()
                .await
                .map_err(|e| Attempt::Transient(e.to_string()))
        })
        .await
        .map_err(Self::map_retry_error)?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let receive_count = message
            .attributes()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let (Some(body), Some(handle)) = (message.body(), message.receipt_handle()) else {
            warn!("Received SQS message without body or receipt handle, skipping");
            return Ok(None);
        };

        debug!(receive_count, "Received job message");
        Ok(Some(JobMessage {
            body: body.to_string(),
            handle: handle.to_string(),
            receive_count,
        }))
    }

    async fn extend_visibility(&self, handle: &str, secs: u32) -> Result<(), QueueError> {
        with_backoff(self.backoff, "sqs.change_message_visibility", || async {
            self.client
                .change_message_visibility()
                .queue_url(&self.queue_url)
                .receipt_handle(handle)
                .visibility_timeout(secs as i32)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| Attempt::Transient(e.to_string()))
        })
        .await
        .map_err(Self::map_retry_error)
    }

    async fn acknowledge(&self, handle: &str) -> Result<(), QueueError> {
        with_backoff(self.backoff, "sqs.delete_message", || async {
            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(handle)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| Attempt::Transient(e.to_string()))
        })
        .await
        .map_err(Self::map_retry_error)
    }

    async fn release(&self, handle: &str) -> Result<(), QueueError> {
        // Visibility zero makes the message immediately eligible for
        // redelivery to any consumer.
        self.extend_visibility(handle, 0).await
    }
}

// =============================================================================
// Status Reporter
// =============================================================================

/// Posts status records to an SQS status queue.
#[derive(Clone)]
pub struct SqsStatusReporter {
    client: Client,
    queue_url: String,
}

impl SqsStatusReporter {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl StatusReporter for SqsStatusReporter {
    async fn report(&self, record: StatusRecord) {
        let body = match serde_json::to_string(&record) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %record.job_id, error = %e, "Failed to serialize status record");
                return;
            }
        };

        // Best-effort: a lost status record must not fail the job.
        if let Err(e) = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
        {
            warn!(job_id = %record.job_id, error = %e, "Failed to post status record");
        }
    }
}

/// Create an SQS client with optional custom endpoint and region.
///
/// Use a custom endpoint for SQS-compatible services like ElasticMQ or
/// LocalStack; pass `None` for AWS.
pub async fn create_sqs_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;
    Client::new(&sdk_config)
}
