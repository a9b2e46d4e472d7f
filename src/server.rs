use std::path::PathBuf;
use std::sync::Arc;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use crate::config::ServerConfig;
use crate::Result;

pub const REPORT_ROUTE: &str = "/evil_twin_output";

pub struct ServerState {
    pub report_path: PathBuf,
}

pub fn router(report_path: PathBuf) -> Router {
    Router::new()
        .route(REPORT_ROUTE, get(get_report))
        .with_state(Arc::new(ServerState { report_path }))
}

/// Returns the last written report byte for byte.
pub async fn get_report(State(state): State<Arc<ServerState>>) -> Response {
    match tokio::fs::read(&state.report_path).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "JSON file not found."})),
        )
            .into_response(),
        Err(err) => {
            log::error!("Failed to read {}: {}", state.report_path.display(), err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn serve(config: &ServerConfig, report_path: PathBuf) -> Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!(
        "Serving {} at http://{}{}",
        report_path.display(),
        addr,
        REPORT_ROUTE
    );

    axum::serve(listener, router(report_path)).await?;
    Ok(())
}
