use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use facematch_common::crm::AccountUpdater;
use facematch_common::faces::FaceComparer;
use facematch_common::storage::ObjectStore;
use tower::limit::ConcurrencyLimitLayer;

use super::compare;
use crate::keys::TargetKeyGenerator;

/// What the compare pipeline needs to know besides its collaborators.
pub struct CompareSettings {
    pub bucket: String,
    pub source_key: String,
    pub similarity_threshold: f32,
    pub account_id: String,
    pub verified_field: String,
    pub uploads_dir: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub comparer: Arc<dyn FaceComparer>,
    pub updater: Arc<dyn AccountUpdater>,
    pub keys: Arc<TargetKeyGenerator>,
    pub settings: Arc<CompareSettings>,
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No background loop to check, just axum health
        .route(
            "/compare",
            routing::post(compare::post_compare)
                .with_state(state)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
}

pub async fn index() -> &'static str {
    "facematch api"
}
