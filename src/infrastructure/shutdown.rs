//! Graceful Shutdown Handler
//!
//! Coordinates shutdown between the reconcile loop, the adapter listeners and
//! the health endpoint. Shutdown is level-triggered: a task that starts
//! waiting after shutdown began returns immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Shutdown coordinator.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<bool>>,
    /// In-flight control and ingress connections
    active_connections: Arc<AtomicUsize>,
    drain_complete: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            active_connections: Arc::new(AtomicUsize::new(0)),
            drain_complete: Arc::new(Notify::new()),
        }
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        let first = self.tx.send_if_modified(|down| {
            let changed = !*down;
            *down = true;
            changed
        });
        if first {
            tracing::info!("initiating graceful shutdown");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives as long as self, so this only errors if it is dropped
        let _ = rx.wait_for(|down| *down).await;
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Track a connection until the guard is dropped.
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            controller: self.clone(),
        }
    }

    fn connection_ended(&self) {
        let prev = self.active_connections.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.drain_complete.notify_waiters();
        }
    }

    /// Wait for in-flight connections to finish, up to `timeout`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.drain_complete.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active_connections() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "drain timeout: {} connections still active",
                    self.active_connections()
                );
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight connection.
pub struct ConnectionGuard {
    controller: ShutdownController,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.controller.connection_ended();
    }
}

/// Resolve on Ctrl+C or SIGTERM and initiate shutdown.
///
/// If a handler cannot be installed that signal is ignored; the other one
/// still works.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
        _ = controller.wait() => {}
    }

    controller.shutdown();
}
