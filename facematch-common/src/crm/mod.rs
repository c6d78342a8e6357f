//! # CRM
//!
//! Salesforce REST integration: an OAuth2 password-grant token provider and an updater that
//! applies partial updates to a single record.
use std::time;

use reqwest::header;
use thiserror::Error;

use crate::retry::RetryableError;

pub mod auth;
pub mod updater;

pub use auth::{CrmSession, PasswordGrantTokenProvider, SalesforceCredentials};
pub use updater::{AccountUpdater, MockAccountUpdater, SalesforceUpdater, UpdateAccountCall};

/// Enumeration of errors that can happen while talking to the CRM.
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{operation} request failed: {error}")]
    Request {
        operation: &'static str,
        error: reqwest::Error,
    },
    #[error("{operation} returned status {status}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid CRM url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CrmError {
    /// The most useful description of the failure: the remote response body when the CRM
    /// answered, the transport error otherwise.
    pub fn detail(&self) -> String {
        match self {
            CrmError::Status { body, .. } if !body.is_empty() => body.clone(),
            _ => self.to_string(),
        }
    }
}

impl RetryableError for CrmError {
    fn is_retryable(&self) -> bool {
        match self {
            CrmError::Request { error, .. } => error.is_timeout() || error.is_connect(),
            CrmError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            CrmError::InvalidUrl(_) => false,
        }
    }
}

/// Build the HTTP client shared by the token provider and the updater.
pub fn http_client(request_timeout: time::Duration) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent("facematch CRM client")
        .timeout(request_timeout)
        .build()
}

/// Turn a non-success response into a `CrmError::Status`, keeping its body for diagnostics.
async fn error_for_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CrmError::Status {
        operation,
        status,
        body,
    })
}
