use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;

/// Static credentials, used instead of the SDK's default provider chain when configured.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Load one `SdkConfig` shared by the S3 and Rekognition clients.
pub async fn load_sdk_config(
    region: &str,
    credentials: Option<StaticCredentials>,
    endpoint: Option<&str>,
) -> SdkConfig {
    let mut aws_config_builder =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_owned()));

    if let Some(credentials) = credentials {
        aws_config_builder = aws_config_builder.credentials_provider(Credentials::new(
            credentials.access_key_id,
            credentials.secret_access_key,
            None,
            None,
            "facematch-env",
        ));
    }

    if let Some(endpoint) = endpoint {
        aws_config_builder = aws_config_builder.endpoint_url(endpoint);
    }

    aws_config_builder.load().await
}

/// Build an S3 client, switching to path-style addressing for custom endpoints such as MinIO.
pub fn s3_client(sdk_config: &SdkConfig, custom_endpoint: bool) -> aws_sdk_s3::Client {
    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(sdk_config);
    if custom_endpoint {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }

    aws_sdk_s3::Client::from_conf(s3_config_builder.build())
}

pub fn rekognition_client(sdk_config: &SdkConfig) -> aws_sdk_rekognition::Client {
    aws_sdk_rekognition::Client::new(sdk_config)
}
