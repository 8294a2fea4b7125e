//! Health Server
//!
//! Serves `GET /health` for either role.

use crate::domain::ports::HealthSource;
use crate::infrastructure::shutdown::ShutdownController;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct HealthServer {
    source: Arc<dyn HealthSource>,
}

impl HealthServer {
    pub fn new(source: Arc<dyn HealthSource>) -> Self {
        Self { source }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.source.clone())
    }

    /// Serve until shutdown, then let in-flight requests finish.
    pub async fn run(&self, listener: TcpListener, shutdown: ShutdownController) -> anyhow::Result<()> {
        tracing::info!("health endpoint listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

async fn health_handler(State(source): State<Arc<dyn HealthSource>>) -> impl IntoResponse {
    Json(source.report().await)
}
