//! Object store abstraction used to persist uploaded photos.
//!
//! Trait-based design with a mock implementation that's always available for testing,
//! so the request handler never needs a real bucket in unit tests.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as AwsS3SdkClient;
use thiserror::Error;
use tracing::debug;

use crate::retry::{RetryPolicy, RetryableError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    OperationFailed(String),
    #[error("S3 request could not be sent: {0}")]
    Dispatch(String),
}

impl RetryableError for StorageError {
    fn is_retryable(&self) -> bool {
        match self {
            StorageError::Dispatch(_) => true,
            StorageError::OperationFailed(_) => false,
        }
    }
}

/// Object store trait that both real and mock implementations use
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `bucket`/`key`, replacing whatever was there.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3 backed object store
pub struct S3Store {
    client: AwsS3SdkClient,
    retry_policy: RetryPolicy,
}

impl S3Store {
    pub fn new(client: AwsS3SdkClient, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let start_time = Instant::now();
        let size = body.len();

        let result = self
            .retry_policy
            .retry("s3_put_object", move || {
                // ByteStream consumes its input, so every attempt gets its own copy.
                let body = ByteStream::from(body.clone());
                async move {
                    self.client
                        .put_object()
                        .bucket(bucket)
                        .key(key)
                        .body(body)
                        .content_type(content_type)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| {
                            // SdkError's own Display drops the source chain.
                            let message = DisplayErrorContext(&e).to_string();
                            match e {
                                SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                                    StorageError::Dispatch(message)
                                }
                                _ => StorageError::OperationFailed(message),
                            }
                        })
                }
            })
            .await;

        let elapsed_time = start_time.elapsed().as_secs_f64();
        metrics::histogram!("facematch_external_call_duration_seconds", "call" => "s3_put_object")
            .record(elapsed_time);

        if result.is_ok() {
            debug!(bucket, key, size, "stored object");
        }

        result
    }
}

/// A single `put_object` call seen by a `MockObjectStore`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutObjectCall {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Mock object store for testing - always available, no conditional compilation needed
#[derive(Clone, Default)]
pub struct MockObjectStore {
    put_object_response: Option<StorageError>,
    calls: Arc<Mutex<Vec<PutObjectCall>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put_object()` call fail with `error`.
    pub fn put_object_err(mut self, error: StorageError) -> Self {
        self.put_object_response = Some(error);
        self
    }

    /// Every call received so far, failed ones included.
    pub fn calls(&self) -> Vec<PutObjectCall> {
        self.calls.lock().expect("poisoned mock lock").clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.calls
            .lock()
            .expect("poisoned mock lock")
            .push(PutObjectCall {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                body,
                content_type: content_type.to_owned(),
            });

        match &self.put_object_response {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
