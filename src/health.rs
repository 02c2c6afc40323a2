//! Liveness endpoint for hosting platforms that expect a bound HTTP port.
//!
//! - `GET /` - running status and the number of incidents tracked so far
//! - `GET /health` - `{"status":"healthy"}`

use crate::monitor::IncidentCounter;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PORT: u16 = 10000;

pub fn router(counter: Arc<IncidentCounter>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(counter)
}

async fn index(State(counter): State<Arc<IncidentCounter>>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "message": "Status page tracker is active",
        "tracked_incidents": counter.get(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Binds `0.0.0.0:port`.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
}

/// Serves until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    counter: Arc<IncidentCounter>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Health endpoint listening");
    }

    axum::serve(listener, router(counter))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("Health endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn get_json(url: &str) -> (u16, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        let body = response.text().await.unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn test_endpoints() {
        let counter = Arc::new(IncidentCounter::new());
        counter.increment();
        counter.increment();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, Arc::clone(&counter), cancel.clone()));

        let (status, body) = get_json(&format!("http://{addr}/health")).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "healthy" }));

        let (status, body) = get_json(&format!("http://{addr}/")).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "running");
        assert_eq!(body["tracked_incidents"], 2);
        assert!(body["message"].is_string());

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            Arc::new(IncidentCounter::new()),
            cancel.clone(),
        ));

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
