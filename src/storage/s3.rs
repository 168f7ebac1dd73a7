use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use crate::error::StorageError;
use crate::retry::{with_backoff, Attempt, BackoffPolicy, RetryError};

use super::ObjectStore;

/// S3-backed implementation of [`ObjectStore`].
///
/// Works against S3 or S3-compatible storage (MinIO, GCS, etc.). Transient
/// service errors are retried with bounded exponential backoff before a
/// typed [`StorageError`] escapes to the caller.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    backoff: BackoffPolicy,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Override the retry budget (mainly for tests).
    pub fn with_backoff(client: Client, backoff: BackoffPolicy) -> Self {
        Self { client, backoff }
    }

    /// Whether an S3 error message indicates a definitively missing object.
    ///
    /// The SDK surfaces NotFound through several layers; check the common
    /// patterns rather than one.
    fn is_not_found(message: &str) -> bool {
        message.contains("NoSuchKey") || message.contains("NotFound") || message.contains("404")
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let uri = format!("s3://{bucket}/{key}");

        let result = with_backoff(self.backoff, "s3.get_object", || async {
            let resp = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let is_not_found = e
                        .as_service_error()
                        .map(|se| se.is_no_such_key())
                        .unwrap_or(false)
                        || e.raw_response()
                            .map(|r| r.status().as_u16() == 404)
                            .unwrap_or(false)
                        || Self::is_not_found(&e.to_string());

                    if is_not_found {
                        Attempt::Fatal(StorageError::NotFound(uri.clone()))
                    } else {
                        Attempt::Transient(StorageError::Transient {
                            uri: uri.clone(),
                            message: e.to_string(),
                        })
                    }
                })?;

            resp.body
                .collect()
                .await
                .map(|data| data.into_bytes())
                .map_err(|e| {
                    Attempt::Transient(StorageError::Transient {
                        uri: uri.clone(),
                        message: e.to_string(),
                    })
                })
        })
        .await;

        match result {
            Ok(bytes) => Ok(bytes),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(StorageError::Exhausted {
                uri,
                attempts,
                message: last.to_string(),
            }),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let uri = format!("s3://{bucket}/{key}");

        let result = with_backoff(self.backoff, "s3.put_object", || {
            let body = data.clone();
            let uri = uri.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(body.into())
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        Attempt::Transient(StorageError::Transient {
                            uri,
                            message: e.to_string(),
                        })
                    })
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(StorageError::Exhausted {
                uri,
                attempts,
                message: last.to_string(),
            }),
        }
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO; path-style
/// addressing is forced in that case. For AWS S3, pass `None`.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
