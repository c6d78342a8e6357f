//! Face comparison against images that already live in the object store.
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_rekognition::error::{DisplayErrorContext, SdkError};
use aws_sdk_rekognition::types::{Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionSdkClient;
use thiserror::Error;
use tracing::debug;

use crate::retry::{RetryPolicy, RetryableError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    #[error("face comparison failed: {message}")]
    Service { message: String, retryable: bool },
    #[error("face comparison request could not be sent: {0}")]
    Dispatch(String),
}

impl RetryableError for ComparisonError {
    fn is_retryable(&self) -> bool {
        match self {
            ComparisonError::Service { retryable, .. } => *retryable,
            ComparisonError::Dispatch(_) => true,
        }
    }
}

/// An image stored in a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
    pub bucket: String,
    pub key: String,
}

impl StoredImage {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        }
    }

    fn as_rekognition_image(&self) -> Image {
        Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&self.bucket)
                    .name(&self.key)
                    .build(),
            )
            .build()
    }
}

/// A face in the target image that matched the source face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceMatch {
    /// Similarity percentage, between 0 and 100.
    pub similarity: f32,
}

#[async_trait]
pub trait FaceComparer: Send + Sync {
    /// Compare the face in `source` with the faces in `target`.
    /// Returns matches ordered as the service ranks them; only matches at or above
    /// `similarity_threshold` are returned, as decided by the service.
    async fn compare_faces(
        &self,
        source: &StoredImage,
        target: &StoredImage,
        similarity_threshold: f32,
    ) -> Result<Vec<FaceMatch>, ComparisonError>;
}

pub struct RekognitionComparer {
    client: RekognitionSdkClient,
    retry_policy: RetryPolicy,
}

impl RekognitionComparer {
    pub fn new(client: RekognitionSdkClient, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
        }
    }
}

#[async_trait]
impl FaceComparer for RekognitionComparer {
    async fn compare_faces(
        &self,
        source: &StoredImage,
        target: &StoredImage,
        similarity_threshold: f32,
    ) -> Result<Vec<FaceMatch>, ComparisonError> {
        let start_time = Instant::now();

        let result = self
            .retry_policy
            .retry("rekognition_compare_faces", move || async move {
                self.client
                    .compare_faces()
                    .source_image(source.as_rekognition_image())
                    .target_image(target.as_rekognition_image())
                    .similarity_threshold(similarity_threshold)
                    .send()
                    .await
                    .map_err(|e| {
                        let message = DisplayErrorContext(&e).to_string();
                        match e {
                            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                                ComparisonError::Dispatch(message)
                            }
                            _ => {
                                let retryable = e.as_service_error().is_some_and(|se| {
                                    se.is_throttling_exception()
                                        || se.is_provisioned_throughput_exceeded_exception()
                                        || se.is_internal_server_error()
                                });
                                ComparisonError::Service { message, retryable }
                            }
                        }
                    })
            })
            .await;

        let elapsed_time = start_time.elapsed().as_secs_f64();
        metrics::histogram!("facematch_external_call_duration_seconds", "call" => "rekognition_compare_faces")
            .record(elapsed_time);

        let output = result?;

        // Matches without a similarity score carry nothing the caller can use.
        let matches: Vec<FaceMatch> = output
            .face_matches()
            .iter()
            .filter_map(|m| m.similarity().map(|similarity| FaceMatch { similarity }))
            .collect();

        debug!(
            source = %source.key,
            target = %target.key,
            matches = matches.len(),
            "compared faces"
        );

        Ok(matches)
    }
}

/// A single `compare_faces` call seen by a `MockFaceComparer`.
#[derive(Clone, Debug, PartialEq)]
pub struct CompareFacesCall {
    pub source: StoredImage,
    pub target: StoredImage,
    pub similarity_threshold: f32,
}

/// Mock face comparer for testing - always available, no conditional compilation needed
#[derive(Clone, Default)]
pub struct MockFaceComparer {
    response: Option<Result<Vec<FaceMatch>, ComparisonError>>,
    calls: Arc<Mutex<Vec<CompareFacesCall>>>,
}

impl MockFaceComparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up the response for every `compare_faces()` call. Without one, no matches are returned.
    pub fn compare_faces_ret(mut self, response: Result<Vec<FaceMatch>, ComparisonError>) -> Self {
        self.response = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<CompareFacesCall> {
        self.calls.lock().expect("poisoned mock lock").clone()
    }
}

#[async_trait]
impl FaceComparer for MockFaceComparer {
    async fn compare_faces(
        &self,
        source: &StoredImage,
        target: &StoredImage,
        similarity_threshold: f32,
    ) -> Result<Vec<FaceMatch>, ComparisonError> {
        self.calls
            .lock()
            .expect("poisoned mock lock")
            .push(CompareFacesCall {
                source: source.clone(),
                target: target.clone(),
                similarity_threshold,
            });

        match &self.response {
            Some(response) => response.clone(),
            None => Ok(Vec::new()),
        }
    }
}
