use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{error_for_status, CrmError};
use crate::retry::RetryPolicy;

/// Credentials for the OAuth2 password grant.
#[derive(Clone)]
pub struct SalesforceCredentials {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

/// A freshly issued access token and the instance it is valid for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrmSession {
    pub access_token: String,
    pub instance_url: String,
}

/// Obtains a new `CrmSession` on every call; sessions are never cached.
pub struct PasswordGrantTokenProvider {
    client: reqwest::Client,
    credentials: SalesforceCredentials,
    retry_policy: RetryPolicy,
}

impl PasswordGrantTokenProvider {
    pub fn new(
        client: reqwest::Client,
        credentials: SalesforceCredentials,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            credentials,
            retry_policy,
        }
    }

    fn token_url(&self) -> Result<Url, CrmError> {
        let login_url = self.credentials.login_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{login_url}/services/oauth2/token"))?)
    }

    pub async fn authenticate(&self) -> Result<CrmSession, CrmError> {
        let token_url = self.token_url()?;
        let params = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];

        let token_url = &token_url;
        let params = &params;

        let session = self
            .retry_policy
            .retry("crm_authenticate", move || async move {
                let response = self
                    .client
                    .post(token_url.clone())
                    .query(params)
                    .send()
                    .await
                    .map_err(|error| CrmError::Request {
                        operation: "authenticate",
                        error,
                    })?;

                error_for_status("authenticate", response)
                    .await?
                    .json::<CrmSession>()
                    .await
                    .map_err(|error| CrmError::Request {
                        operation: "authenticate",
                        error,
                    })
            })
            .await?;

        debug!(instance_url = %session.instance_url, "authenticated with CRM");

        Ok(session)
    }
}
