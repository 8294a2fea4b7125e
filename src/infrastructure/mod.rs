//! Infrastructure Layer
//!
//! Cross-cutting concerns: shutdown coordination, TLS material, and the
//! control-plane wire format.

pub mod control_protocol;
pub mod shutdown;
pub mod tls;

pub use control_protocol::{ControlProtocolError, ControlRequest, ControlResponse};
pub use shutdown::{shutdown_signal, ConnectionGuard, ShutdownController};
pub use tls::{TlsError, TlsFiles};
