use std::path::PathBuf;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use facematch_common::aws::StaticCredentials;
use facematch_common::crm::SalesforceCredentials;
use facematch_common::retry::RetryPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3002")]
    pub port: u16,

    #[envconfig(default = "uploads")]
    pub uploads_dir: PathBuf,

    #[envconfig(default = "10000000")]
    pub max_body_size: usize,

    #[envconfig(default = "100")]
    pub concurrency_limit: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(default = "wallace.jpg")]
    pub source_image_key: String,

    #[envconfig(default = "80")]
    pub similarity_threshold: f32,

    #[envconfig(default = "001Hr000027BzOhIAK")]
    pub crm_account_id: String,

    #[envconfig(default = "isVerified__c")]
    pub crm_verified_field: String,

    #[envconfig(nested = true)]
    pub aws: AwsConfig,

    #[envconfig(nested = true)]
    pub salesforce: SalesforceConfig,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct AwsConfig {
    pub aws_region: String,

    pub aws_access_key_id: Option<String>,

    pub aws_secret_access_key: Option<String>,

    /// Override for S3 compatible stores such as MinIO.
    pub aws_endpoint_url: Option<String>,

    pub aws_bucket: NonEmptyString,
}

impl AwsConfig {
    /// Static credentials when both halves are set; the SDK default chain is used otherwise.
    pub fn static_credentials(&self) -> Option<StaticCredentials> {
        match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id: access_key_id.to_owned(),
                secret_access_key: secret_access_key.to_owned(),
            }),
            _ => None,
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct SalesforceConfig {
    #[envconfig(from = "SF_LOGIN_URL")]
    pub login_url: String,

    #[envconfig(from = "SF_CLIENT_ID")]
    pub client_id: String,

    #[envconfig(from = "SF_CLIENT_SECRET")]
    pub client_secret: String,

    #[envconfig(from = "SF_USERNAME")]
    pub username: String,

    #[envconfig(from = "SF_PASSWORD")]
    pub password: String,

    #[envconfig(from = "SF_API_VERSION", default = "v60.0")]
    pub api_version: String,

    #[envconfig(from = "SF_SOBJECT", default = "Account")]
    pub sobject: String,

    #[envconfig(from = "SF_REQUEST_TIMEOUT", default = "10000")]
    pub request_timeout: EnvMsDuration,
}

impl SalesforceConfig {
    pub fn credentials(&self) -> SalesforceCredentials {
        SalesforceCredentials {
            login_url: self.login_url.to_owned(),
            client_id: self.client_id.to_owned(),
            client_secret: self.client_secret.to_owned(),
            username: self.username.to_owned(),
            password: self.password.to_owned(),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "RETRY_MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    #[envconfig(from = "RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(from = "RETRY_INITIAL_INTERVAL", default = "200")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "RETRY_MAXIMUM_INTERVAL", default = "2000")]
    pub maximum_interval: EnvMsDuration,
}

impl RetryPolicyConfig {
    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy::build(self.backoff_coefficient, self.initial_interval.0)
            .maximum_interval(self.maximum_interval.0)
            .max_attempts(self.max_attempts)
            .provide()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
