use axum::routing::{get, post};
use axum::Router;

use crate::config::Config;
use crate::server::{api, static_files, AppState};

pub fn router(state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(api::health))
        .route("/api/datasets", get(api::datasets))
        .route("/api/datasets/:slug/rows", get(api::rows))
        .route("/api/datasets/:slug/import", post(api::enqueue_import))
        .route("/api/datasets/:slug/scan", post(api::enqueue_scan))
        .fallback(api::not_found)
        .with_state(state);

    static_files::mount_media(api_routes, &config.media(), &config.media_roots)
}
