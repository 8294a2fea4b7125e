//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of drain routing.
//! They have no I/O dependencies and contain only business logic.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A single drain target: forward one application's logs to one URL.
///
/// Bindings are immutable. Equality and hashing cover all three fields,
/// so a changed drain URL for the same app is a different binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    /// Application identifier (opaque)
    pub app_id: String,
    /// Hostname written into the syslog header
    pub hostname: String,
    /// Drain URL, e.g. `syslog-tls://logs.example.com:6514`
    pub drain: String,
}

impl Binding {
    pub fn new(
        app_id: impl Into<String>,
        hostname: impl Into<String>,
        drain: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            hostname: hostname.into(),
            drain: drain.into(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) -> {}", self.app_id, self.hostname, self.drain)
    }
}

/// The desired state returned by one poll of the upstream provider.
pub type BindingSet = HashSet<Binding>;

/// Bindings currently held across the adapter fleet.
///
/// Each binding is annotated with the adapters that reported holding it.
/// Adapters that could not be queried are listed in `unreachable`; their
/// bindings are unknown rather than absent.
#[derive(Debug, Clone, Default)]
pub struct ActualSet {
    owners: HashMap<Binding, Vec<String>>,
    unreachable: Vec<String>,
}

impl ActualSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `adapter` holds `binding`.
    pub fn insert(&mut self, binding: Binding, adapter: &str) {
        let owners = self.owners.entry(binding).or_default();
        if !owners.iter().any(|a| a == adapter) {
            owners.push(adapter.to_string());
        }
    }

    /// Record that `adapter` could not be listed.
    pub fn mark_unreachable(&mut self, adapter: &str) {
        self.unreachable.push(adapter.to_string());
    }

    /// Flattened view, ignoring ownership.
    pub fn bindings(&self) -> BindingSet {
        self.owners.keys().cloned().collect()
    }

    pub fn contains(&self, binding: &Binding) -> bool {
        self.owners.contains_key(binding)
    }

    /// Adapters holding `binding`, in the order they were reported.
    pub fn owners(&self, binding: &Binding) -> &[String] {
        self.owners.get(binding).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bindings held by more than one adapter.
    pub fn duplicates(&self) -> Vec<(&Binding, &[String])> {
        let mut dups: Vec<_> = self
            .owners
            .iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(b, owners)| (b, owners.as_slice()))
            .collect();
        dups.sort_by(|a, b| a.0.cmp(b.0));
        dups
    }

    pub fn unreachable(&self) -> &[String] {
        &self.unreachable
    }

    /// Number of distinct bindings.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Out,
    Err,
}

/// A single log line emitted by an application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// Application that emitted the line; matched against `Binding::app_id`
    pub source_id: String,
    /// Emitting component, e.g. `APP`, `RTR`, `STG`
    pub source_type: String,
    /// Instance index of the emitter
    pub instance_id: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp_nanos: i64,
    pub message_type: MessageType,
    pub message: Vec<u8>,
}

impl LogEnvelope {
    pub fn new(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        instance_id: impl Into<String>,
        timestamp_nanos: i64,
        message_type: MessageType,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_type: source_type.into(),
            instance_id: instance_id.into(),
            timestamp_nanos,
            message_type,
            message: message.into(),
        }
    }
}

/// Lifecycle of an egress connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriterState {
    /// No connection yet, or a dial is in progress
    Connecting,
    /// Connection established and last write succeeded
    Open,
    /// Closed on request; further writes are rejected
    Closed,
    /// Last dial or write failed; the next write redials
    Errored,
}

impl WriterState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closed => 2,
            Self::Errored => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::Closed,
            3 => Self::Errored,
            _ => Self::Connecting,
        }
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}
