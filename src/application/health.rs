//! Health reporting for both roles.

use crate::application::AdapterPool;
use crate::domain::ports::{BindingReader, BindingStore, HealthSource};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Scheduler-side counters: what the provider wants versus what the fleet
/// holds. The two differ while converging or while an adapter is down.
pub struct HealthReporter {
    reader: Arc<dyn BindingReader>,
    pool: Arc<AdapterPool>,
}

impl HealthReporter {
    pub fn new(reader: Arc<dyn BindingReader>, pool: Arc<AdapterPool>) -> Self {
        Self { reader, pool }
    }

    /// Size of the last successful fetch.
    pub fn desired_count(&self) -> usize {
        self.reader.last_count()
    }

    /// Bindings held by reachable adapters, queried live.
    pub async fn actual_count(&self) -> usize {
        self.pool.count().await
    }
}

#[async_trait]
impl HealthSource for HealthReporter {
    async fn report(&self) -> serde_json::Value {
        json!({
            "desired_count": self.desired_count(),
            "actual_count": self.actual_count().await,
            "adapter_count": self.pool.len(),
        })
    }
}

/// Adapter-side counter.
pub struct AdapterHealth {
    store: Arc<dyn BindingStore>,
}

impl AdapterHealth {
    pub fn new(store: Arc<dyn BindingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthSource for AdapterHealth {
    async fn report(&self) -> serde_json::Value {
        json!({ "drain_count": self.store.count().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::DashMapBindingStore;
    use crate::domain::ports::{AdapterClient, BindingReader};
    use crate::domain::services::PlacementPolicy;
    use crate::test_support::{binding, set, FakeAdapter, FakeReader, FakeWriterFactory};

    fn pool(adapters: &[Arc<FakeAdapter>]) -> Arc<AdapterPool> {
        let clients: Vec<Arc<dyn AdapterClient>> = adapters
            .iter()
            .map(|a| a.clone() as Arc<dyn AdapterClient>)
            .collect();
        Arc::new(AdapterPool::new(clients, PlacementPolicy::default(), 3))
    }

    #[tokio::test]
    async fn test_counts_before_first_fetch() {
        let reporter = HealthReporter::new(FakeReader::new(set(&["a", "b"])), pool(&[]));

        assert_eq!(reporter.desired_count(), 0);
        assert_eq!(reporter.actual_count().await, 0);
    }

    #[tokio::test]
    async fn test_counts_track_reader_and_fleet() {
        let reader = FakeReader::new(set(&["a", "b", "c"]));
        reader.fetch_all().await.unwrap();
        let adapters = vec![
            FakeAdapter::with_bindings("a0", &[binding("a")]),
            FakeAdapter::with_bindings("a1", &[binding("b")]),
        ];
        let reporter = HealthReporter::new(reader, pool(&adapters));

        assert_eq!(reporter.desired_count(), 3);
        assert_eq!(reporter.actual_count().await, 2);

        adapters[1].set_unreachable(true);
        assert_eq!(reporter.actual_count().await, 1);
    }

    #[tokio::test]
    async fn test_scheduler_report_json() {
        let reader = FakeReader::new(set(&["a"]));
        reader.fetch_all().await.unwrap();
        let adapters = vec![FakeAdapter::with_bindings("a0", &[binding("a")])];
        let reporter = HealthReporter::new(reader, pool(&adapters));

        let report = reporter.report().await;

        assert_eq!(
            report,
            json!({"desired_count": 1, "actual_count": 1, "adapter_count": 1})
        );
    }

    #[tokio::test]
    async fn test_adapter_report_json() {
        let store = Arc::new(DashMapBindingStore::new(Arc::new(FakeWriterFactory::default())));
        store.add(binding("a")).await.unwrap();
        store.add(binding("b")).await.unwrap();

        let report = AdapterHealth::new(store).report().await;

        assert_eq!(report, json!({"drain_count": 2}));
    }
}
