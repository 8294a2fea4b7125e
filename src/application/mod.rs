//! Application Layer - Use cases
//!
//! Coordinates the domain services and ports into the scheduler's
//! convergence loop and the health surfaces of both roles.

mod adapter_pool;
mod health;
mod orchestrator;

pub use adapter_pool::AdapterPool;
pub use health::{AdapterHealth, HealthReporter};
pub use orchestrator::{CycleReport, Orchestrator};
