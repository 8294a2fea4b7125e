//! Domain Errors
//!
//! Error taxonomy shared by the ports and the services built on them.

use std::time::Duration;

/// Reading desired state from the upstream provider failed.
///
/// Any failed page discards the whole read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("provider returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("malformed page: {0}")]
    Malformed(String),
}

/// A writer for a binding could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriterCreationError {
    #[error("invalid drain URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported drain scheme: {0}")]
    UnsupportedScheme(String),
    #[error("drain URL has no host or port: {0}")]
    MissingHost(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Writing a frame to a drain failed. The frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("dial {addr} failed: {reason}")]
    Dial { addr: String, reason: String },
    #[error("{op} to {addr} timed out after {after:?}")]
    Timeout {
        op: &'static str,
        addr: String,
        after: Duration,
    },
    #[error("write to {addr} failed: {reason}")]
    Io { addr: String, reason: String },
    #[error("writer is closed")]
    Closed,
}

/// A control call against one adapter failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Adapter unreachable or connection broken mid-call
    #[error("adapter {addr} unreachable: {reason}")]
    Transport { addr: String, reason: String },
    #[error("adapter {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },
    /// Adapter answered with something we did not ask for
    #[error("adapter {addr} protocol error: {reason}")]
    Protocol { addr: String, reason: String },
    /// Adapter answered but refused the binding
    #[error("adapter {addr} rejected binding: {reason}")]
    Rejected { addr: String, reason: String },
}

impl AdapterError {
    /// Whether another adapter might succeed where this one failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Protocol { .. }
        )
    }
}

/// Fleet-level failures from the adapter pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("adapter pool is empty")]
    NoAdapters,
    #[error("no adapter accepted the binding after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error("binding rejected: {0}")]
    Rejected(String),
    #[error("all {0} adapters unreachable")]
    AllUnreachable(usize),
    #[error("no adapter with address {0}")]
    UnknownAdapter(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
