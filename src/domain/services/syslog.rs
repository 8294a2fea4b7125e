//! Syslog Framing
//!
//! Encodes log envelopes as octet-counted RFC 5424 frames:
//!
//! ```text
//! <len> <PRI>1 <timestamp> <hostname> <app-id> [<source-type>/<instance>] - - <message>\n
//! ```
//!
//! `<len>` is the byte length of everything after the first space. A
//! receiver relies on it to find the end of the frame, so it must be exact.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{SecondsFormat, TimeZone, Utc};

use crate::domain::entities::{Binding, LogEnvelope, MessageType};

/// Facility `user` (1), severity `informational` (6).
pub const PRI_OUT: u8 = 14;
/// Facility `user` (1), severity `error` (3).
pub const PRI_ERR: u8 = 11;

const SYSLOG_VERSION: u8 = 1;

pub fn priority(message_type: MessageType) -> u8 {
    match message_type {
        MessageType::Out => PRI_OUT,
        MessageType::Err => PRI_ERR,
    }
}

/// RFC 3339 UTC timestamp with nanosecond precision.
pub fn format_timestamp(nanos: i64) -> String {
    Utc.timestamp_nanos(nanos)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Encode one envelope as a complete frame, length prefix included.
///
/// # Example
/// ```
/// use drain_router::domain::entities::{Binding, LogEnvelope, MessageType};
/// use drain_router::domain::services::syslog::encode_frame;
///
/// let binding = Binding::new("test-app-id", "test-hostname", "syslog-tls://a:1");
/// let env = LogEnvelope::new("test-app-id", "APP", "2", 12345678, MessageType::Out, "just a test");
/// let frame = encode_frame(&binding, &env);
/// assert!(frame.starts_with(b"87 <14>1 "));
/// ```
pub fn encode_frame(binding: &Binding, envelope: &LogEnvelope) -> Bytes {
    let header = format!(
        "<{}>{} {} {} {} [{}/{}] - - ",
        priority(envelope.message_type),
        SYSLOG_VERSION,
        format_timestamp(envelope.timestamp_nanos),
        binding.hostname,
        binding.app_id,
        envelope.source_type,
        envelope.instance_id,
    );

    let body_len = header.len() + envelope.message.len() + 1;
    let prefix = format!("{} ", body_len);

    let mut buf = BytesMut::with_capacity(prefix.len() + body_len);
    buf.put_slice(prefix.as_bytes());
    buf.put_slice(header.as_bytes());
    buf.put_slice(&envelope.message);
    buf.put_u8(b'\n');
    buf.freeze()
}
