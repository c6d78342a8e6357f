//! Multipart upload stage: accepts a single image under the `target` field and parks it in a
//! temporary file until the request is done with it.
use std::io;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Multipart, MultipartError};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

pub const TARGET_FIELD: &str = "target";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Only image files are allowed")]
    NotAnImage,
    #[error("Unexpected field: {0}")]
    UnexpectedField(String),
    #[error("failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("failed to store upload: {0}")]
    Io(#[from] io::Error),
}

/// An uploaded image waiting in the uploads directory.
#[derive(Debug)]
pub struct UploadedImage {
    pub path: PathBuf,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl UploadedImage {
    /// Remove the temporary file.
    pub async fn discard(&self) -> io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }

    /// Remove the temporary file, logging instead of failing.
    pub async fn discard_quietly(&self) {
        if let Err(e) = self.discard().await {
            error!(
                path = %self.path.display(),
                "failed to remove temporary upload: {}",
                e
            );
        }
    }
}

fn is_image(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("image/"))
}

/// Read the multipart body, storing the `target` file under `uploads_dir`.
///
/// Text fields are ignored. Any other file field, a second `target` file, or a `target` file
/// that is not an image is rejected. Nothing is left in `uploads_dir` when this returns an error.
pub async fn accept_upload(
    multipart: &mut Multipart,
    uploads_dir: &Path,
) -> Result<Option<UploadedImage>, UploadError> {
    let mut upload: Option<UploadedImage> = None;

    let result = read_fields(multipart, uploads_dir, &mut upload).await;

    match result {
        Ok(()) => Ok(upload),
        Err(e) => {
            if let Some(upload) = upload {
                upload.discard_quietly().await;
            }
            Err(e)
        }
    }
}

async fn read_fields(
    multipart: &mut Multipart,
    uploads_dir: &Path,
    upload: &mut Option<UploadedImage>,
) -> Result<(), UploadError> {
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_owned();

        let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
            debug!(field = field_name, "ignoring non-file multipart field");
            continue;
        };

        if field_name != TARGET_FIELD || upload.is_some() {
            return Err(UploadError::UnexpectedField(field_name));
        }

        let content_type = field.content_type().map(ToOwned::to_owned);
        if !is_image(content_type.as_deref()) {
            return Err(UploadError::NotAnImage);
        }

        let data = field.bytes().await?;
        let path = uploads_dir.join(Uuid::new_v4().simple().to_string());
        tokio::fs::write(&path, &data).await?;

        debug!(
            path = %path.display(),
            size = data.len(),
            "stored upload in temporary file"
        );

        *upload = Some(UploadedImage {
            path,
            content_type: content_type.unwrap_or_default(),
            file_name: Some(file_name),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_image_content_types_are_accepted() {
        assert!(is_image(Some("image/jpeg")));
        assert!(is_image(Some("image/png")));
        assert!(!is_image(Some("application/pdf")));
        assert!(!is_image(Some("text/plain")));
        assert!(!is_image(None));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload");
        tokio::fs::write(&path, b"jpeg").await.unwrap();

        let upload = UploadedImage {
            path: path.clone(),
            content_type: "image/jpeg".to_owned(),
            file_name: None,
        };
        upload.discard().await.unwrap();

        assert!(!path.exists());
        assert!(upload.discard().await.is_err());
    }
}
