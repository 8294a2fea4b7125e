//! Log Sink Port
//!
//! Where an adapter hands incoming envelopes for fan-out to drains.

use crate::domain::entities::LogEnvelope;
use async_trait::async_trait;

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Forward an envelope to every drain bound to its source app.
    ///
    /// Returns the number of drains written. Delivery is best effort.
    async fn dispatch(&self, envelope: &LogEnvelope) -> usize;
}
