//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use crate::domain::errors::WriterCreationError;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// The only drain scheme this system delivers to.
pub const SYSLOG_TLS_SCHEME: &str = "syslog-tls";

/// Parsed drain destination.
///
/// Validates that a drain URL is well formed, uses a supported scheme and
/// names a host and port to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainUrl {
    scheme: String,
    host: String,
    port: u16,
    opted_in: bool,
}

impl DrainUrl {
    /// Parse a drain URL.
    ///
    /// # Examples
    /// ```
    /// use drain_router::domain::value_objects::DrainUrl;
    ///
    /// let url = DrainUrl::parse("syslog-tls://logs.example.com:6514").unwrap();
    /// assert_eq!(url.addr(), "logs.example.com:6514");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, WriterCreationError> {
        let url = reqwest::Url::parse(raw)
            .map_err(|e| WriterCreationError::InvalidUrl(format!("{}: {}", raw, e)))?;

        if url.scheme() != SYSLOG_TLS_SCHEME {
            return Err(WriterCreationError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| WriterCreationError::MissingHost(raw.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| WriterCreationError::MissingHost(raw.to_string()))?;

        let opted_in = url
            .query_pairs()
            .any(|(k, v)| k == "drain-version" && v == "2.0");

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            opted_in,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as an IP literal, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// `host:port` suitable for dialing.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Whether the drain carries the `drain-version=2.0` opt-in marker.
    pub fn is_opted_in(&self) -> bool {
        self.opted_in
    }
}

/// Inclusive range of IP addresses, written as `start-end`.
///
/// Used to blacklist drain destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    start: IpAddr,
    end: IpAddr,
}

impl IpRange {
    pub fn new(start: IpAddr, end: IpAddr) -> Result<Self, IpRangeError> {
        if start.is_ipv4() != end.is_ipv4() {
            return Err(IpRangeError::MixedFamilies);
        }
        if start > end {
            return Err(IpRangeError::Inverted);
        }
        Ok(Self { start, end })
    }

    /// Check whether `ip` falls inside the range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.start.is_ipv4() && ip >= self.start && ip <= self.end
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| IpRangeError::Malformed(s.to_string()))?;
        let start: IpAddr = start
            .trim()
            .parse()
            .map_err(|_| IpRangeError::Malformed(s.to_string()))?;
        let end: IpAddr = end
            .trim()
            .parse()
            .map_err(|_| IpRangeError::Malformed(s.to_string()))?;
        Self::new(start, end)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Errors parsing an [`IpRange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpRangeError {
    #[error("malformed IP range {0:?}, expected start-end")]
    Malformed(String),
    #[error("IP range mixes IPv4 and IPv6")]
    MixedFamilies,
    #[error("IP range start is after end")]
    Inverted,
}
