//! Liveness and readiness endpoints.

use std::net::SocketAddr;
use std::future::Future;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::error::{Result, ServerError};
use crate::nats::NatsClient;

pub fn router(nats: NatsClient) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(nats)
}

/// Serve the health endpoints until `shutdown` resolves.
pub async fn serve<F>(port: u16, nats: NatsClient, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Config(format!("cannot bind health port {}: {}", port, e)))?;
    tracing::info!("Health endpoints listening on {}", addr);

    axum::serve(listener, router(nats))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Transport(format!("health server failed: {}", e)))
}

/// Health check endpoint (liveness)
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "nango-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint - verifies NATS connection
async fn readiness_check(
    State(nats): State<NatsClient>,
) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
    if nats.is_connected() {
        Ok(Json(serde_json::json!({
            "status": "ready",
            "service": "nango-server",
            "nats": "connected"
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_reports_service() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "nango-server");
    }
}
