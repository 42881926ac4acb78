use std::sync::Arc;

use crate::config::Config;
use crate::jobs::runner::JobRunner;
use crate::jobs::JobQueue;
use crate::store::Store;

pub mod api;
pub mod routes;
pub mod static_files;

/// Caller identity header. Authentication happens in front of this service.
pub const USER_HEADER: &str = "x-voicetable-user";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jobs: Arc<dyn JobQueue>,
}

pub async fn run_server(config: Config, store: Arc<dyn Store>) -> std::io::Result<()> {
    let (sender, runner) = JobRunner::new(Arc::clone(&store), config.media());
    let runner_handle = runner.spawn();

    let state = AppState {
        store,
        jobs: Arc::new(sender),
    };
    let app = routes::router(state, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("voicetable server listening on http://{}", config.bind);
    let served = axum::serve(listener, app).await;
    runner_handle.abort();
    served
}
