//! Adapter Client Port
//!
//! Defines the control surface of a single adapter as seen by the scheduler.

use crate::domain::entities::Binding;
use crate::domain::errors::AdapterError;
use async_trait::async_trait;

/// Control calls against one adapter node.
///
/// All three calls are idempotent on the adapter, so callers may retry them
/// freely.
#[async_trait]
pub trait AdapterClient: Send + Sync {
    /// Network address identifying this adapter.
    fn addr(&self) -> &str;

    /// List the bindings the adapter currently holds.
    async fn list(&self) -> Result<Vec<Binding>, AdapterError>;

    /// Ask the adapter to start delivering for a binding.
    async fn create(&self, binding: &Binding) -> Result<(), AdapterError>;

    /// Ask the adapter to stop delivering for a binding.
    async fn delete(&self, binding: &Binding) -> Result<(), AdapterError>;
}
