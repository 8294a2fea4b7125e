//! Health Source Port
//!
//! Read-only counters exposed on the health endpoint.

use async_trait::async_trait;

/// Something that can describe its health as a JSON document.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn report(&self) -> serde_json::Value;
}
