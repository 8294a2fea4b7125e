//! Domain Layer
//!
//! Core types, ports and pure services. Nothing in here performs I/O;
//! adapters implement the ports and the application layer wires them.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
