//! Log Writer Port
//!
//! Defines the per-binding egress connection and the factory that builds it.

use crate::domain::entities::{Binding, LogEnvelope, WriterState};
use crate::domain::errors::{WriteError, WriterCreationError};
use async_trait::async_trait;
use std::sync::Arc;

/// Egress connection for one binding.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Frame and write one envelope. On failure the envelope is dropped.
    async fn write(&self, envelope: &LogEnvelope) -> Result<(), WriteError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);

    fn state(&self) -> WriterState;
}

/// Builds writers for bindings.
///
/// Construction must not perform I/O; connections are dialed lazily.
pub trait WriterFactory: Send + Sync {
    fn create(&self, binding: &Binding) -> Result<Arc<dyn LogWriter>, WriterCreationError>;
}
