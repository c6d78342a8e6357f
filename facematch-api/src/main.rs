//! Serve `POST /compare`: store an uploaded photo, compare it with the reference face and flag
//! the CRM account on a match.
use std::sync::Arc;

use envconfig::Envconfig;
use eyre::Result;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use facematch_api::config::Config;
use facematch_api::handlers::{AppState, CompareSettings};
use facematch_api::keys::{SystemTime, TargetKeyGenerator};
use facematch_common::crm::{self, PasswordGrantTokenProvider, SalesforceUpdater};
use facematch_common::faces::RekognitionComparer;
use facematch_common::metrics::setup_metrics_recorder;
use facematch_common::storage::S3Store;
use facematch_common::aws;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
}

async fn listen(app: axum::Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .expect("failed to create uploads directory");

    let retry_policy = config.retry_policy.provide();

    let sdk_config = aws::load_sdk_config(
        &config.aws.aws_region,
        config.aws.static_credentials(),
        config.aws.aws_endpoint_url.as_deref(),
    )
    .await;
    let store = S3Store::new(
        aws::s3_client(&sdk_config, config.aws.aws_endpoint_url.is_some()),
        retry_policy.clone(),
    );
    let comparer = RekognitionComparer::new(aws::rekognition_client(&sdk_config), retry_policy.clone());

    let http_client = crm::http_client(config.salesforce.request_timeout.0)
        .expect("failed to construct reqwest client for CRM");
    let token_provider = PasswordGrantTokenProvider::new(
        http_client.clone(),
        config.salesforce.credentials(),
        retry_policy.clone(),
    );
    let updater = SalesforceUpdater::new(
        http_client,
        token_provider,
        &config.salesforce.api_version,
        &config.salesforce.sobject,
        retry_policy,
    );

    let state = AppState {
        store: Arc::new(store),
        comparer: Arc::new(comparer),
        updater: Arc::new(updater),
        keys: Arc::new(TargetKeyGenerator::new(SystemTime {})),
        settings: Arc::new(CompareSettings {
            bucket: config.aws.aws_bucket.as_str().to_owned(),
            source_key: config.source_image_key.to_owned(),
            similarity_threshold: config.similarity_threshold,
            account_id: config.crm_account_id.to_owned(),
            verified_field: config.crm_verified_field.to_owned(),
            uploads_dir: config.uploads_dir.to_owned(),
        }),
    };

    let recorder_handle = if config.export_prometheus {
        Some(setup_metrics_recorder().expect("failed to install prometheus recorder"))
    } else {
        None
    };

    let app = facematch_api::router(
        state,
        config.max_body_size,
        config.concurrency_limit,
        recorder_handle,
    );

    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => error!("failed to start facematch http server, {}", e),
    }
}
