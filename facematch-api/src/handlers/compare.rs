use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facematch_common::faces::{ComparisonError, FaceMatch, StoredImage};
use facematch_common::storage::StorageError;
use serde_derive::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::app::AppState;
use crate::upload::{accept_upload, UploadError, UploadedImage};

pub const NO_IMAGE_MESSAGE: &str = "Nenhuma imagem enviada";
pub const NO_MATCH_MESSAGE: &str = "Nenhuma correspondência encontrada";
pub const GENERAL_ERROR_MESSAGE: &str = "Erro geral";

#[derive(Serialize, Debug, PartialEq)]
pub struct MatchResponse {
    pub r#match: bool,
    /// Similarity of the best match, with exactly two decimals.
    pub similarity: String,
    /// Outcome of the CRM update, as reported by the updater.
    pub salesforce: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct NoMatchResponse {
    pub r#match: bool,
    pub message: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum CompareResponse {
    Match(MatchResponse),
    NoMatch(NoMatchResponse),
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Every way a compare request can fail, before or during the pipeline.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("{}", NO_IMAGE_MESSAGE)]
    NoImage,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error("failed to access temporary upload: {0}")]
    TempFile(#[from] std::io::Error),
}

impl CompareError {
    fn outcome(&self) -> &'static str {
        match self {
            CompareError::NoImage => "no_image",
            CompareError::Upload(UploadError::Io(_)) => "error",
            CompareError::Upload(_) => "rejected",
            CompareError::Storage(_)
            | CompareError::Comparison(_)
            | CompareError::TempFile(_) => "error",
        }
    }
}

impl IntoResponse for CompareError {
    fn into_response(self) -> Response {
        metrics::counter!("facematch_compare_total", "outcome" => self.outcome()).increment(1);

        match self {
            CompareError::NoImage => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: NO_IMAGE_MESSAGE.to_owned(),
                    details: None,
                }),
            ),

            CompareError::Upload(
                UploadError::NotAnImage | UploadError::UnexpectedField(_) | UploadError::Multipart(_),
            ) => {
                warn!("rejected upload: {}", self);
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: self.to_string(),
                        details: None,
                    }),
                )
            }

            CompareError::Upload(UploadError::Io(_))
            | CompareError::Storage(_)
            | CompareError::Comparison(_)
            | CompareError::TempFile(_) => {
                error!("compare request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: GENERAL_ERROR_MESSAGE.to_owned(),
                        details: Some(self.to_string()),
                    }),
                )
            }
        }
        .into_response()
    }
}

/// Render a similarity percentage the way clients expect it: two decimals, as a string.
pub fn format_similarity(similarity: f32) -> String {
    format!("{:.2}", similarity)
}

pub async fn post_compare(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CompareResponse>, CompareError> {
    let Ok(mut multipart) = multipart else {
        return Err(CompareError::NoImage);
    };

    let upload = accept_upload(&mut multipart, &state.settings.uploads_dir)
        .await?
        .ok_or(CompareError::NoImage)?;

    debug!(
        file_name = upload.file_name.as_deref().unwrap_or_default(),
        content_type = %upload.content_type,
        "accepted upload"
    );

    let best_match = match find_best_match(&state, &upload).await {
        Ok(best_match) => best_match,
        Err(e) => {
            upload.discard_quietly().await;
            return Err(e);
        }
    };

    if let Err(e) = upload.discard().await {
        // Same treatment as any other failure: one more removal attempt, then a 500.
        upload.discard_quietly().await;
        return Err(CompareError::TempFile(e));
    }

    let Some(best_match) = best_match else {
        info!("no matching face found");
        metrics::counter!("facematch_compare_total", "outcome" => "no_match").increment(1);

        return Ok(Json(CompareResponse::NoMatch(NoMatchResponse {
            r#match: false,
            message: NO_MATCH_MESSAGE.to_owned(),
        })));
    };

    let mut fields = Map::new();
    fields.insert(state.settings.verified_field.clone(), Value::Bool(true));

    let salesforce = state
        .updater
        .update_account(&state.settings.account_id, &fields)
        .await;

    info!(similarity = best_match.similarity, "face matched");
    metrics::counter!("facematch_compare_total", "outcome" => "match").increment(1);

    Ok(Json(CompareResponse::Match(MatchResponse {
        r#match: true,
        similarity: format_similarity(best_match.similarity),
        salesforce,
    })))
}

/// Store the upload under a fresh key, then compare it with the reference image.
/// Only the first match reported by the comparison service is kept.
async fn find_best_match(
    state: &AppState,
    upload: &UploadedImage,
) -> Result<Option<FaceMatch>, CompareError> {
    let content = tokio::fs::read(&upload.path).await?;
    let target_key = state.keys.next_key();
    let bucket = state.settings.bucket.as_str();

    state
        .store
        .put_object(bucket, &target_key, content, &upload.content_type)
        .await?;

    let matches = state
        .comparer
        .compare_faces(
            &StoredImage::new(bucket, &state.settings.source_key),
            &StoredImage::new(bucket, &target_key),
            state.settings.similarity_threshold,
        )
        .await?;

    Ok(matches.into_iter().next())
}
