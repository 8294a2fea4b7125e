//! Orchestrator - periodic convergence loop
//!
//! Each cycle reads the desired bindings, lists what the fleet holds, and
//! issues the creates and deletes that close the gap.

use crate::application::AdapterPool;
use crate::domain::entities::{ActualSet, Binding, BindingSet};
use crate::domain::ports::BindingReader;
use crate::domain::services::Reconciler;
use crate::infrastructure::shutdown::ShutdownController;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Upper bound on in-flight control calls within one cycle
const MAX_IN_FLIGHT: usize = 32;

/// Outcome of one convergence cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub desired: usize,
    pub actual: usize,
    pub added: usize,
    pub add_failures: usize,
    pub removed: usize,
    pub remove_failures: usize,
    pub pruned: usize,
    /// Why the cycle did nothing, if it was skipped
    pub skipped: Option<String>,
}

impl CycleReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Orchestrator - drives the fleet toward the provider's binding set.
///
/// A cycle:
/// 1. Fetches the desired set; a failed fetch skips the cycle
/// 2. Lists the fleet; skips if no adapter answered
/// 3. Creates missing bindings and deletes stale ones
/// 4. Prunes desired bindings held by more than one adapter
///
/// A failed create or delete is logged and retried implicitly next cycle.
pub struct Orchestrator {
    reader: Arc<dyn BindingReader>,
    pool: Arc<AdapterPool>,
}

impl Orchestrator {
    pub fn new(reader: Arc<dyn BindingReader>, pool: Arc<AdapterPool>) -> Self {
        Self { reader, pool }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let desired = match self.reader.fetch_all().await {
            Ok(desired) => desired,
            Err(e) => {
                tracing::warn!("skipping cycle, fetch failed: {}", e);
                return CycleReport::skipped(format!("fetch failed: {}", e));
            }
        };

        let actual = match self.pool.list_all().await {
            Ok(actual) => actual,
            Err(e) => {
                tracing::warn!("skipping cycle, cannot list adapters: {}", e);
                return CycleReport::skipped(format!("list failed: {}", e));
            }
        };
        if !actual.unreachable().is_empty() {
            tracing::warn!(unreachable = ?actual.unreachable(), "converging with partial view");
        }

        let plan = Reconciler::plan(&desired, &actual.bindings());
        let mut report = CycleReport {
            desired: desired.len(),
            actual: actual.len(),
            ..CycleReport::default()
        };

        let (added, add_failures) = self.apply(plan.to_add, Op::Create).await;
        let (removed, remove_failures) = self.apply(plan.to_remove, Op::Delete).await;
        report.added = added;
        report.add_failures = add_failures;
        report.removed = removed;
        report.remove_failures = remove_failures;
        report.pruned = self.prune(&desired, &actual).await;

        tracing::info!(
            desired = report.desired,
            actual = report.actual,
            added = report.added,
            add_failures = report.add_failures,
            removed = report.removed,
            remove_failures = report.remove_failures,
            pruned = report.pruned,
            "cycle complete"
        );
        report
    }

    /// Run cycles every `interval` until shutdown. The first cycle starts
    /// immediately.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: ShutdownController) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            tracing::info!("orchestrator stopped");
        })
    }

    async fn apply(&self, bindings: Vec<Binding>, op: Op) -> (usize, usize) {
        let results: Vec<bool> = stream::iter(bindings)
            .map(|binding| async move {
                let result = match op {
                    Op::Create => self.pool.create(&binding).await.map(|addr| {
                        tracing::debug!(binding = %binding, adapter = %addr, "binding created");
                    }),
                    Op::Delete => self.pool.delete(&binding).await.map(|()| {
                        tracing::debug!(binding = %binding, "binding deleted");
                    }),
                };
                if let Err(e) = &result {
                    tracing::warn!(binding = %binding, "{} failed: {}", op.name(), e);
                }
                result.is_ok()
            })
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await;

        let ok = results.iter().filter(|ok| **ok).count();
        (ok, results.len() - ok)
    }

    async fn prune(&self, desired: &BindingSet, actual: &ActualSet) -> usize {
        let extra: Vec<(Binding, String)> = actual
            .duplicates()
            .into_iter()
            .filter(|(binding, _)| desired.contains(*binding))
            .flat_map(|(binding, owners)| {
                owners[1..]
                    .iter()
                    .map(move |owner| (binding.clone(), owner.clone()))
            })
            .collect();

        let results: Vec<bool> = stream::iter(extra)
            .map(|(binding, owner)| async move {
                match self.pool.delete_from(&owner, &binding).await {
                    Ok(()) => {
                        tracing::info!(binding = %binding, adapter = %owner, "pruned duplicate");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(binding = %binding, adapter = %owner, "prune failed: {}", e);
                        false
                    }
                }
            })
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await;

        results.into_iter().filter(|ok| *ok).count()
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Create,
    Delete,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}
