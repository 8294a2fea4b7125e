//! Domain Services
//!
//! Pure logic with no I/O: set reconciliation, adapter placement and
//! syslog framing.

pub mod placement;
pub mod reconciler;
pub mod syslog;

pub use placement::PlacementPolicy;
pub use reconciler::{ReconcilePlan, Reconciler};
