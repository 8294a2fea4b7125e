//! DashMap Binding Store
//!
//! Implements BindingStore using DashMap for concurrent access. Each entry
//! owns the egress writer for its binding.

use crate::domain::entities::{Binding, LogEnvelope, WriterState};
use crate::domain::errors::WriterCreationError;
use crate::domain::ports::{BindingStore, LogSink, LogWriter, WriterFactory};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;

/// DashMap-backed binding store.
///
/// Add and delete for one binding are serialized by the map's shard lock,
/// so a binding never gets two writers. Operations on different bindings
/// do not wait on each other beyond shard contention.
pub struct DashMapBindingStore {
    entries: DashMap<Binding, Arc<dyn LogWriter>>,
    factory: Arc<dyn WriterFactory>,
}

impl DashMapBindingStore {
    pub fn new(factory: Arc<dyn WriterFactory>) -> Self {
        Self {
            entries: DashMap::new(),
            factory,
        }
    }

    /// Writer state per held binding, sorted by binding.
    pub fn states(&self) -> Vec<(Binding, WriterState)> {
        let mut states: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Drop every binding and close its writer.
    pub async fn close_all(&self) {
        let keys: Vec<Binding> = self.entries.iter().map(|e| e.key().clone()).collect();
        let count = keys.len();
        for key in keys {
            self.delete(&key).await;
        }
        tracing::info!("closed {} drain writers", count);
    }
}

#[async_trait]
impl BindingStore for DashMapBindingStore {
    async fn list(&self) -> Vec<Binding> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    async fn add(&self, binding: Binding) -> Result<(), WriterCreationError> {
        match self.entries.entry(binding) {
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                let writer = self.factory.create(slot.key())?;
                tracing::info!(binding = %slot.key(), "binding added");
                slot.insert(writer);
                Ok(())
            }
        }
    }

    async fn delete(&self, binding: &Binding) {
        if let Some((binding, writer)) = self.entries.remove(binding) {
            writer.close().await;
            tracing::info!(binding = %binding, "binding removed");
        }
    }

    async fn count(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl LogSink for DashMapBindingStore {
    /// Failed writes are logged and the envelope is dropped for that drain.
    async fn dispatch(&self, envelope: &LogEnvelope) -> usize {
        let targets: Vec<(Binding, Arc<dyn LogWriter>)> = self
            .entries
            .iter()
            .filter(|e| e.key().app_id == envelope.source_id)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let results = join_all(targets.iter().map(|(_, w)| w.write(envelope))).await;

        let mut delivered = 0;
        for ((binding, _), result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(drain = %binding.drain, "dropped envelope: {}", e),
            }
        }
        delivered
    }
}
