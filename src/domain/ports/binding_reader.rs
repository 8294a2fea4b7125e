//! Binding Reader Port
//!
//! Defines the interface for reading desired bindings from the upstream provider.

use crate::domain::entities::BindingSet;
use crate::domain::errors::FetchError;
use async_trait::async_trait;

/// Source of truth for which bindings should exist.
///
/// This is an outbound port. Implementations page through the provider and
/// return either the complete set or an error; partial reads are never
/// returned.
#[async_trait]
pub trait BindingReader: Send + Sync {
    /// Fetch the full desired set.
    async fn fetch_all(&self) -> Result<BindingSet, FetchError>;

    /// Size of the last successful fetch, 0 before the first one.
    fn last_count(&self) -> usize;
}
