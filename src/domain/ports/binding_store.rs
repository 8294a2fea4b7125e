//! Binding Store Port
//!
//! Defines the adapter-side table of bindings behind the control server.

use crate::domain::entities::Binding;
use crate::domain::errors::WriterCreationError;
use async_trait::async_trait;

/// Concurrent table of bindings held by one adapter.
///
/// This is the inbound port the control server calls into. Every operation
/// must be safe under unbounded concurrent callers.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Snapshot of held bindings.
    async fn list(&self) -> Vec<Binding>;

    /// Hold a binding and start its writer. Adding a held binding is a no-op.
    async fn add(&self, binding: Binding) -> Result<(), WriterCreationError>;

    /// Drop a binding and close its writer. Deleting an absent binding is a no-op.
    async fn delete(&self, binding: &Binding);

    /// Number of held bindings.
    async fn count(&self) -> usize;
}
