//! API Binding Reader
//!
//! Implements BindingReader against the upstream provider's paginated
//! drain API:
//!
//! ```text
//! GET {base}/internal/v4/syslog_drain_urls?batch_size={n}&next_id={id}
//! { "results": { "<app_id>": { "hostname": "...", "drains": ["..."] } }, "next_id": 50 }
//! ```
//!
//! Drains that fail to parse, that are blacklisted or that lack the opt-in
//! marker (when required) are filtered out here, before the orchestrator
//! ever sees them.

use crate::domain::entities::{Binding, BindingSet};
use crate::domain::errors::FetchError;
use crate::domain::ports::BindingReader;
use crate::domain::value_objects::{DrainUrl, IpRange};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DRAIN_PATH: &str = "/internal/v4/syslog_drain_urls";

#[derive(Debug, Deserialize)]
struct DrainPage {
    #[serde(default)]
    results: HashMap<String, AppDrains>,
    next_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AppDrains {
    hostname: String,
    #[serde(default)]
    drains: Vec<String>,
}

/// TLS material for talking to the provider.
#[derive(Debug, Clone, Default)]
pub struct ApiTlsOptions {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub skip_verify: bool,
}

/// Build the HTTP client used to poll the provider.
pub fn build_http_client(tls: &ApiTlsOptions, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .danger_accept_invalid_certs(tls.skip_verify);

    if let Some(ca) = &tls.ca_file {
        let pem = std::fs::read(ca)?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
    }

    match (&tls.cert_file, &tls.key_file) {
        (Some(cert), Some(key)) => {
            let mut pem = std::fs::read(cert)?;
            pem.extend_from_slice(b"\n");
            pem.extend(std::fs::read(key)?);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }
        (None, None) => {}
        _ => anyhow::bail!("API client certificate and key must be set together"),
    }

    Ok(builder.build()?)
}

/// Upper bound on one host lookup when checking the blacklist.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Name resolution used by blacklist checks.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Lookups made during one fetch, by host. `None` is a failed lookup.
type Resolved = HashMap<String, Option<Vec<IpAddr>>>;

/// Decides whether a drain URL may be bound.
#[derive(Clone)]
pub struct DrainFilter {
    blacklist: Vec<IpRange>,
    require_opt_in: bool,
    resolver: Arc<dyn HostResolver>,
    resolve_timeout: Duration,
}

impl Default for DrainFilter {
    fn default() -> Self {
        Self::new(Vec::new(), false)
    }
}

impl fmt::Debug for DrainFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainFilter")
            .field("blacklist", &self.blacklist)
            .field("require_opt_in", &self.require_opt_in)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

impl DrainFilter {
    pub fn new(blacklist: Vec<IpRange>, require_opt_in: bool) -> Self {
        Self {
            blacklist,
            require_opt_in,
            resolver: Arc::new(SystemResolver),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Parse and vet one drain. Returns `None` if it must be skipped.
    pub async fn admit(&self, raw: &str) -> Option<DrainUrl> {
        self.vet(raw, &mut Resolved::new()).await
    }

    async fn vet(&self, raw: &str, resolved: &mut Resolved) -> Option<DrainUrl> {
        let url = match DrainUrl::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(drain = raw, "skipping drain: {}", e);
                return None;
            }
        };

        if self.require_opt_in && !url.is_opted_in() {
            tracing::debug!(drain = raw, "skipping drain without opt-in");
            return None;
        }

        if !self.blacklist.is_empty() && self.is_blacklisted(&url, resolved).await {
            tracing::info!(drain = raw, "skipping blacklisted drain");
            return None;
        }

        Some(url)
    }

    async fn is_blacklisted(&self, url: &DrainUrl, resolved: &mut Resolved) -> bool {
        if let Some(ip) = url.ip() {
            return self.in_blacklist(ip);
        }

        let ips = match resolved.get(url.host()) {
            Some(hit) => hit.clone(),
            None => {
                let ips = self.lookup(url).await;
                resolved.insert(url.host().to_string(), ips.clone());
                ips
            }
        };

        match ips {
            Some(ips) if !ips.is_empty() => ips.into_iter().any(|ip| self.in_blacklist(ip)),
            // Nothing to check against counts as blacklisted
            _ => true,
        }
    }

    fn in_blacklist(&self, ip: IpAddr) -> bool {
        self.blacklist.iter().any(|r| r.contains(ip))
    }

    async fn lookup(&self, url: &DrainUrl) -> Option<Vec<IpAddr>> {
        let resolving = self.resolver.resolve(url.host(), url.port());
        match tokio::time::timeout(self.resolve_timeout, resolving).await {
            Ok(Ok(ips)) => Some(ips),
            Ok(Err(e)) => {
                tracing::debug!(host = url.host(), "drain host did not resolve: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    host = url.host(),
                    "drain host resolution timed out after {:?}",
                    self.resolve_timeout
                );
                None
            }
        }
    }
}

/// Paginated reader over the provider API.
pub struct ApiBindingReader {
    client: reqwest::Client,
    url: String,
    batch_size: usize,
    filter: DrainFilter,
    last_count: AtomicUsize,
}

impl ApiBindingReader {
    pub fn new(client: reqwest::Client, base_url: &str, batch_size: usize, filter: DrainFilter) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), DRAIN_PATH),
            batch_size: batch_size.max(1),
            filter,
            last_count: AtomicUsize::new(0),
        }
    }

    async fn fetch_page(&self, next_id: u64) -> Result<DrainPage, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("batch_size", self.batch_size as u64), ("next_id", next_id)])
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<DrainPage>()
            .await
            .map_err(|e| FetchError::Malformed(format!("page at next_id={}: {}", next_id, e)))
    }
}

#[async_trait]
impl BindingReader for ApiBindingReader {
    async fn fetch_all(&self) -> Result<BindingSet, FetchError> {
        let mut bindings = BindingSet::new();
        let mut resolved = Resolved::new();
        let mut cursor = 0u64;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(cursor).await?;
            pages += 1;

            let page_len = page.results.len();
            for (app_id, app) in page.results {
                for drain in app.drains {
                    if self.filter.vet(&drain, &mut resolved).await.is_some() {
                        bindings.insert(Binding::new(app_id.clone(), app.hostname.clone(), drain));
                    }
                }
            }

            if page_len == 0 || page_len < self.batch_size {
                break;
            }
            let Some(next_id) = page.next_id else {
                break;
            };
            if next_id <= cursor {
                return Err(FetchError::Malformed(format!(
                    "next_id {} does not advance past {}",
                    next_id, cursor
                )));
            }
            cursor = next_id;
        }

        tracing::debug!(pages, bindings = bindings.len(), "fetched desired bindings");
        self.last_count.store(bindings.len(), Ordering::SeqCst);
        Ok(bindings)
    }

    fn last_count(&self) -> usize {
        self.last_count.load(Ordering::SeqCst)
    }
}
