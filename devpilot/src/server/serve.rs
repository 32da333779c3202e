//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::options::ServerOptions;
use crate::errors::PilotError;
use crate::server::handlers::{
    delete_handler, deploy_handler, get_project_handler, health_handler, list_projects_handler,
    logs_handler, redeploy_handler, restart_handler, start_handler, stop_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>, cors_origin: Option<&str>) -> Router {
    let app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deploy
        .route("/deploy", post(deploy_handler))
        // Projects
        .route("/project", get(list_projects_handler))
        .route("/project/{id}", get(get_project_handler))
        .route("/project/{id}/redeploy", post(redeploy_handler))
        .route("/project/{id}/start", post(start_handler))
        .route("/project/{id}/stop", post(stop_handler))
        .route("/project/{id}/restart", post(restart_handler))
        .route("/project/{id}/logs", get(logs_handler))
        .route("/project/{id}/delete", delete(delete_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::exact(origin))
                .allow_methods(Any)
                .allow_headers(Any),
        ),
        Some(Err(e)) => {
            warn!("Ignoring invalid CORS origin: {}", e);
            app
        }
        None => app,
    }
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PilotError>>, PilotError> {
    let app = router(state, options.cors_origin.as_deref());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PilotError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PilotError::ServerError(e.to_string()))
    });

    Ok(handle)
}
