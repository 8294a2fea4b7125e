//! drain-router Library
//!
//! Routes application logs to syslog-over-TLS drains. A scheduler keeps a
//! fleet of adapters converged on the set of drain bindings published by an
//! upstream provider; each adapter holds one egress writer per binding.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use application::{AdapterPool, HealthReporter, Orchestrator};
pub use config::{load_config, Config, Role};
pub use domain::entities::{ActualSet, Binding, BindingSet, LogEnvelope, MessageType};
pub use domain::ports::{
    AdapterClient, BindingReader, BindingStore, LogSink, LogWriter, WriterFactory,
};
pub use domain::services::{PlacementPolicy, Reconciler};
