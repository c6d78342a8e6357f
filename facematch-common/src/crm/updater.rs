use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{error, info};
use url::Url;

use super::{error_for_status, CrmError, CrmSession, PasswordGrantTokenProvider};
use crate::retry::RetryPolicy;

/// Applies partial updates to CRM records.
///
/// Updates never fail from the caller's point of view: the outcome is reported as a
/// human-readable message, and success can only be told apart from failure by its content.
#[async_trait]
pub trait AccountUpdater: Send + Sync {
    async fn update_account(&self, account_id: &str, fields: &Map<String, Value>) -> String;
}

pub struct SalesforceUpdater {
    client: reqwest::Client,
    token_provider: PasswordGrantTokenProvider,
    api_version: String,
    sobject: String,
    retry_policy: RetryPolicy,
}

impl SalesforceUpdater {
    pub fn new(
        client: reqwest::Client,
        token_provider: PasswordGrantTokenProvider,
        api_version: &str,
        sobject: &str,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            token_provider,
            api_version: api_version.to_owned(),
            sobject: sobject.to_owned(),
            retry_policy,
        }
    }

    fn record_url(&self, session: &CrmSession, account_id: &str) -> Result<Url, CrmError> {
        let instance_url = session.instance_url.trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{instance_url}/services/data/{}/sobjects/{}/{account_id}",
            self.api_version, self.sobject
        ))?)
    }

    /// Authenticate, then PATCH `fields` onto the record.
    pub async fn try_update_account(
        &self,
        account_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), CrmError> {
        let session = self.token_provider.authenticate().await?;
        let record_url = self.record_url(&session, account_id)?;

        let record_url = &record_url;
        let session = &session;

        self.retry_policy
            .retry("crm_update_account", move || async move {
                let response = self
                    .client
                    .patch(record_url.clone())
                    .bearer_auth(&session.access_token)
                    .json(fields)
                    .send()
                    .await
                    .map_err(|error| CrmError::Request {
                        operation: "update account",
                        error,
                    })?;

                error_for_status("update account", response).await?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl AccountUpdater for SalesforceUpdater {
    async fn update_account(&self, account_id: &str, fields: &Map<String, Value>) -> String {
        let start_time = Instant::now();
        let result = self.try_update_account(account_id, fields).await;

        let elapsed_time = start_time.elapsed().as_secs_f64();
        metrics::histogram!("facematch_external_call_duration_seconds", "call" => "crm_update_account")
            .record(elapsed_time);

        match result {
            Ok(()) => {
                info!(account_id, "updated CRM account");
                format!("{} {account_id} atualizado com sucesso.", self.sobject)
            }
            Err(err) => {
                error!(account_id, "failed to update CRM account: {}", err);
                format!("Erro ao atualizar {}: {}", self.sobject, err.detail())
            }
        }
    }
}

/// A single `update_account` call seen by a `MockAccountUpdater`.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateAccountCall {
    pub account_id: String,
    pub fields: Map<String, Value>,
}

/// Mock updater for testing - always available, no conditional compilation needed
#[derive(Clone)]
pub struct MockAccountUpdater {
    message: String,
    calls: Arc<Mutex<Vec<UpdateAccountCall>>>,
}

impl MockAccountUpdater {
    /// Every call answers with `message`.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<UpdateAccountCall> {
        self.calls.lock().expect("poisoned mock lock").clone()
    }
}

#[async_trait]
impl AccountUpdater for MockAccountUpdater {
    async fn update_account(&self, account_id: &str, fields: &Map<String, Value>) -> String {
        self.calls
            .lock()
            .expect("poisoned mock lock")
            .push(UpdateAccountCall {
                account_id: account_id.to_owned(),
                fields: fields.clone(),
            });

        self.message.clone()
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::crm::{http_client, SalesforceCredentials};

    fn updater(login_url: String) -> SalesforceUpdater {
        let client = http_client(std::time::Duration::from_secs(5)).unwrap();
        let token_provider = PasswordGrantTokenProvider::new(
            client.clone(),
            SalesforceCredentials {
                login_url,
                client_id: "client-id".to_owned(),
                client_secret: "client-secret".to_owned(),
                username: "user@example.com".to_owned(),
                password: "hunter2".to_owned(),
            },
            RetryPolicy::no_retries(),
        );

        SalesforceUpdater::new(
            client,
            token_provider,
            "v60.0",
            "Account",
            RetryPolicy::no_retries(),
        )
    }

    fn verified_fields() -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("isVerified__c".to_owned(), Value::Bool(true));
        fields
    }

    fn mock_token(server: &MockServer) -> httpmock::Mock {
        let instance_url = server.base_url();
        server.mock(|when, then| {
            when.method(POST).path("/services/oauth2/token");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "access_token": "token-123",
                    "instance_url": instance_url,
                }));
        })
    }

    #[tokio::test]
    async fn test_update_account_patches_record() {
        let server = MockServer::start();
        let token_mock = mock_token(&server);
        let patch_mock = server.mock(|when, then| {
            when.method("PATCH")
                .path("/services/data/v60.0/sobjects/Account/001Hr000027BzOhIAK")
                .header("authorization", "Bearer token-123")
                .json_body(json!({"isVerified__c": true}));
            then.status(204);
        });

        let message = updater(server.base_url())
            .update_account("001Hr000027BzOhIAK", &verified_fields())
            .await;

        token_mock.assert();
        patch_mock.assert();
        assert_eq!(message, "Account 001Hr000027BzOhIAK atualizado com sucesso.");
    }

    #[tokio::test]
    async fn test_update_account_reports_token_failure_as_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/services/oauth2/token");
            then.status(400).body(r#"{"error":"invalid_grant"}"#);
        });
        let patch_mock = server.mock(|when, then| {
            when.method("PATCH");
            then.status(204);
        });

        let message = updater(server.base_url())
            .update_account("001Hr000027BzOhIAK", &verified_fields())
            .await;

        patch_mock.assert_hits(0);
        assert_eq!(
            message,
            r#"Erro ao atualizar Account: {"error":"invalid_grant"}"#
        );
    }

    #[tokio::test]
    async fn test_update_account_reports_rejected_patch_body() {
        let server = MockServer::start();
        mock_token(&server);
        server.mock(|when, then| {
            when.method("PATCH")
                .path("/services/data/v60.0/sobjects/Account/missing");
            then.status(404)
                .body(r#"[{"errorCode":"NOT_FOUND","message":"The requested resource does not exist"}]"#);
        });

        let message = updater(server.base_url())
            .update_account("missing", &verified_fields())
            .await;

        assert!(message.starts_with("Erro ao atualizar Account: "));
        assert!(message.contains("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_update_account_reports_unreachable_login_url() {
        // Nothing listens on port 9 locally.
        let message = updater("http://127.0.0.1:9".to_owned())
            .update_account("001Hr000027BzOhIAK", &verified_fields())
            .await;

        assert!(message.starts_with("Erro ao atualizar Account: authenticate request failed"));
    }

    #[tokio::test]
    async fn test_mock_account_updater_records_calls() {
        let updater = MockAccountUpdater::new("ok");

        let message = updater.update_account("abc", &verified_fields()).await;

        assert_eq!(message, "ok");
        assert_eq!(
            updater.calls(),
            vec![UpdateAccountCall {
                account_id: "abc".to_owned(),
                fields: verified_fields(),
            }]
        );
    }
}
