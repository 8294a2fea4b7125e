//! drain-router - syslog drain scheduler and adapter
//!
//! This is the composition root that wires together all the components.
//! `DRAIN_ROUTER_ROLE` picks which half of the system this process runs.

use anyhow::Context;
use drain_router::adapters::inbound::{ControlServer, HealthServer, LogIngressServer};
use drain_router::adapters::outbound::{
    build_http_client, ApiBindingReader, ApiTlsOptions, DashMapBindingStore, DrainFilter,
    RpcAdapterClient, TlsWriterFactory,
};
use drain_router::application::{AdapterHealth, AdapterPool, HealthReporter, Orchestrator};
use drain_router::config::{load_config, Config, Role};
use drain_router::domain::ports::{AdapterClient, BindingReader};
use drain_router::infrastructure::tls::{egress_client_config, TlsFiles};
use drain_router::infrastructure::{shutdown_signal, ShutdownController};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::fmt::format::FmtSpan;

/// How long the adapter waits for open connections to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!("starting drain-router role={} health={}", cfg.role, cfg.health_addr);

    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match cfg.role {
        Role::Scheduler => run_scheduler(cfg, shutdown).await,
        Role::Adapter => run_adapter(cfg, shutdown).await,
    }
}

fn control_tls(cfg: &Config) -> anyhow::Result<TlsFiles> {
    let (Some(cert), Some(key), Some(ca)) = (&cfg.cert_file, &cfg.key_file, &cfg.ca_file) else {
        anyhow::bail!("control-plane TLS material is not configured");
    };
    Ok(TlsFiles::new(cert, key, ca))
}

async fn run_scheduler(cfg: Config, shutdown: ShutdownController) -> anyhow::Result<()> {
    // ===== COMPOSITION ROOT =====

    // 1. Upstream provider
    let api_url = cfg.api_url.clone().context("DRAIN_ROUTER_API_URL is required")?;
    let api_tls = ApiTlsOptions {
        cert_file: cfg.api_cert_file.as_ref().map(PathBuf::from),
        key_file: cfg.api_key_file.as_ref().map(PathBuf::from),
        ca_file: cfg.api_ca_file.as_ref().map(PathBuf::from),
        skip_verify: cfg.api_skip_cert_verify,
    };
    let http = build_http_client(&api_tls, cfg.api_timeout())?;
    let filter = DrainFilter::new(cfg.blacklist.clone(), cfg.require_opt_in)
        .with_resolve_timeout(cfg.api_timeout());
    let reader: Arc<dyn BindingReader> =
        Arc::new(ApiBindingReader::new(http, &api_url, cfg.api_batch_size, filter));

    // 2. Adapter fleet
    let client_tls = control_tls(&cfg)?
        .client_config(false)
        .context("loading control-plane client TLS")?;
    let mut clients: Vec<Arc<dyn AdapterClient>> = Vec::with_capacity(cfg.adapter_addrs.len());
    for addr in &cfg.adapter_addrs {
        let client = RpcAdapterClient::new(
            addr.clone(),
            &cfg.adapter_common_name,
            client_tls.clone(),
            cfg.rpc_timeout(),
        )?;
        clients.push(Arc::new(client));
    }
    let pool = Arc::new(AdapterPool::new(clients, cfg.placement, cfg.max_create_attempts));
    tracing::info!(
        adapters = pool.len(),
        placement = %cfg.placement,
        interval_secs = cfg.api_polling_interval_secs,
        "scheduler configured"
    );

    // 3. Convergence loop
    let orchestrator = Arc::new(Orchestrator::new(reader.clone(), pool.clone()));
    let loop_handle = orchestrator.spawn(cfg.api_polling_interval(), shutdown.clone());

    // 4. Health endpoint
    let health = HealthServer::new(Arc::new(HealthReporter::new(reader, pool)));
    let listener = TcpListener::bind(cfg.health_addr)
        .await
        .with_context(|| format!("binding health endpoint {}", cfg.health_addr))?;
    let served = health.run(listener, shutdown.clone()).await;

    // The health server only returns early on error; stop the loop either way
    shutdown.shutdown();
    loop_handle.await?;
    served?;

    tracing::info!("scheduler stopped");
    Ok(())
}

async fn run_adapter(cfg: Config, shutdown: ShutdownController) -> anyhow::Result<()> {
    // ===== COMPOSITION ROOT =====

    // 1. Egress
    let egress_tls = egress_client_config(
        cfg.egress_ca_file.as_deref().map(Path::new),
        cfg.skip_cert_verify,
    )
    .context("building egress TLS config")?;
    if cfg.skip_cert_verify {
        tracing::warn!("drain certificate verification is disabled");
    }
    let factory = Arc::new(TlsWriterFactory::new(
        egress_tls,
        cfg.dial_timeout(),
        cfg.write_timeout(),
    ));
    let store = Arc::new(DashMapBindingStore::new(factory));

    // 2. Control server
    let server_tls = control_tls(&cfg)?
        .server_config()
        .context("loading control-plane server TLS")?;
    let control = ControlServer::new(server_tls.clone(), store.clone(), shutdown.clone());

    // 3. Log ingress
    let ingress = LogIngressServer::new(server_tls, store.clone(), shutdown.clone());

    // 4. Health endpoint
    let health = HealthServer::new(Arc::new(AdapterHealth::new(store.clone())));
    let listener = TcpListener::bind(cfg.health_addr)
        .await
        .with_context(|| format!("binding health endpoint {}", cfg.health_addr))?;

    let result = tokio::try_join!(
        control.run(cfg.adapter_listen_addr),
        ingress.run(cfg.ingress_addr),
        health.run(listener, shutdown.clone()),
    );
    shutdown.shutdown();

    if !shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!(
            remaining = shutdown.active_connections(),
            "connections still open after drain timeout"
        );
    }
    store.close_all().await;
    result?;

    tracing::info!("adapter stopped");
    Ok(())
}
