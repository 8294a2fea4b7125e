//! Adapter Pool - the fleet as one logical target
//!
//! Spreads creates across adapters with a placement policy and retries
//! on transport failure. Deletes and lists fan out to every adapter and
//! tolerate individual adapters being down.

use crate::domain::entities::{ActualSet, Binding};
use crate::domain::errors::PoolError;
use crate::domain::ports::AdapterClient;
use crate::domain::services::PlacementPolicy;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the pool last learned about one adapter.
#[derive(Debug, Clone, Copy, Default)]
struct Known {
    load: usize,
    unreachable: bool,
}

/// Client-side view over every adapter.
///
/// Placement history is not tracked, so a delete is broadcast to all
/// adapters. Per adapter the pool keeps the binding count it reported
/// last, which feeds `LeastBindings` placement, and whether the last call
/// to it failed in transport. Adapters last seen down are tried after
/// every other candidate.
pub struct AdapterPool {
    adapters: Vec<Arc<dyn AdapterClient>>,
    policy: PlacementPolicy,
    max_create_attempts: usize,
    cursor: AtomicUsize,
    /// Indexed like `adapters`
    known: Mutex<Vec<Known>>,
}

impl AdapterPool {
    pub fn new(
        adapters: Vec<Arc<dyn AdapterClient>>,
        policy: PlacementPolicy,
        max_create_attempts: usize,
    ) -> Self {
        let known = vec![Known::default(); adapters.len()];
        Self {
            adapters,
            policy,
            max_create_attempts: max_create_attempts.max(1),
            cursor: AtomicUsize::new(0),
            known: Mutex::new(known),
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn addrs(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.addr()).collect()
    }

    /// Place a binding on one adapter.
    ///
    /// Tries up to `max_create_attempts` distinct adapters in policy order,
    /// known-reachable adapters first, moving on when an adapter is
    /// unreachable. A rejection is final: the binding itself is bad and
    /// every adapter would refuse it.
    ///
    /// Returns the address of the adapter that accepted the binding.
    pub async fn create(&self, binding: &Binding) -> Result<String, PoolError> {
        if self.adapters.is_empty() {
            return Err(PoolError::NoAdapters);
        }

        let n = self.adapters.len();
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        let order = {
            let known = self.known.lock();
            let loads: Vec<usize> = known.iter().map(|k| k.load).collect();
            let mut order = self.policy.candidate_order(n, cursor, &loads);
            // Stable, so policy order holds within each group
            order.sort_by_key(|&i| known.get(i).is_some_and(|k| k.unreachable));
            order
        };
        let attempts = self.max_create_attempts.min(n);

        for &idx in order.iter().take(attempts) {
            let adapter = &self.adapters[idx];
            match adapter.create(binding).await {
                Ok(()) => {
                    if let Some(k) = self.known.lock().get_mut(idx) {
                        k.load += 1;
                        k.unreachable = false;
                    }
                    return Ok(adapter.addr().to_string());
                }
                Err(e) if e.is_transport() => {
                    self.mark_unreachable(idx);
                    tracing::warn!(binding = %binding, "create failed, trying next adapter: {}", e);
                }
                Err(e) => return Err(PoolError::Rejected(e.to_string())),
            }
        }

        Err(PoolError::Exhausted { attempts })
    }

    /// Remove a binding from every adapter.
    ///
    /// Succeeds if any adapter answered. Adapters that do not hold the
    /// binding acknowledge anyway.
    pub async fn delete(&self, binding: &Binding) -> Result<(), PoolError> {
        if self.adapters.is_empty() {
            return Err(PoolError::NoAdapters);
        }

        let results = join_all(self.adapters.iter().map(|a| a.delete(binding))).await;

        let mut unreachable = 0;
        for (idx, result) in results.iter().enumerate() {
            match result {
                Ok(()) => {}
                Err(e) if e.is_transport() => {
                    tracing::warn!(binding = %binding, "delete failed: {}", e);
                    self.mark_unreachable(idx);
                    unreachable += 1;
                }
                Err(e) => tracing::warn!(binding = %binding, "delete refused: {}", e),
            }
        }

        if unreachable == self.adapters.len() {
            return Err(PoolError::AllUnreachable(unreachable));
        }
        Ok(())
    }

    /// Remove a binding from one named adapter only.
    pub async fn delete_from(&self, addr: &str, binding: &Binding) -> Result<(), PoolError> {
        let (idx, adapter) = self
            .adapters
            .iter()
            .enumerate()
            .find(|(_, a)| a.addr() == addr)
            .ok_or_else(|| PoolError::UnknownAdapter(addr.to_string()))?;

        if let Err(e) = adapter.delete(binding).await {
            if e.is_transport() {
                self.mark_unreachable(idx);
            }
            return Err(e.into());
        }
        if let Some(k) = self.known.lock().get_mut(idx) {
            k.load = k.load.saturating_sub(1);
            k.unreachable = false;
        }
        Ok(())
    }

    /// Merge every reachable adapter's bindings.
    ///
    /// Unreachable adapters are recorded in the result rather than failing
    /// the call; their bindings are unknown, not absent.
    pub async fn list_all(&self) -> Result<ActualSet, PoolError> {
        if self.adapters.is_empty() {
            return Err(PoolError::NoAdapters);
        }

        let results = join_all(self.adapters.iter().map(|a| a.list())).await;

        let mut actual = ActualSet::new();
        let mut loads = Vec::with_capacity(self.adapters.len());
        for (adapter, result) in self.adapters.iter().zip(results) {
            match result {
                Ok(bindings) => {
                    loads.push(Some(bindings.len()));
                    for binding in bindings {
                        actual.insert(binding, adapter.addr());
                    }
                }
                Err(e) => {
                    tracing::warn!("list failed: {}", e);
                    loads.push(None);
                    actual.mark_unreachable(adapter.addr());
                }
            }
        }

        {
            let mut known = self.known.lock();
            for (k, load) in known.iter_mut().zip(&loads) {
                match load {
                    Some(load) => {
                        k.load = *load;
                        k.unreachable = false;
                    }
                    None => k.unreachable = true,
                }
            }
        }

        if actual.unreachable().len() == self.adapters.len() {
            return Err(PoolError::AllUnreachable(self.adapters.len()));
        }
        Ok(actual)
    }

    fn mark_unreachable(&self, idx: usize) {
        if let Some(k) = self.known.lock().get_mut(idx) {
            k.unreachable = true;
        }
    }

    /// Total bindings across reachable adapters. Undercounts while an
    /// adapter is down.
    pub async fn count(&self) -> usize {
        let results = join_all(self.adapters.iter().map(|a| a.list())).await;
        results.iter().filter_map(|r| r.as_ref().ok()).map(Vec::len).sum()
    }
}
