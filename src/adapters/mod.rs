//! Adapters Layer
//!
//! Inbound adapters drive the application (control server, health endpoint).
//! Outbound adapters implement the domain ports (provider API, adapter RPC,
//! binding store, drain egress).

pub mod inbound;
pub mod outbound;
