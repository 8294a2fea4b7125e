//! Control Server Adapter
//!
//! Accepts mutually authenticated TLS connections from the scheduler and
//! serves list/create/delete calls against the adapter's binding store.

use crate::domain::ports::BindingStore;
use crate::infrastructure::control_protocol::{
    read_frame, write_frame, ControlProtocolError, ControlRequest, ControlResponse,
};
use crate::infrastructure::shutdown::{ConnectionGuard, ShutdownController};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Control Server - inbound adapter for the scheduler's control calls.
///
/// Each connection is served in its own task and may carry any number of
/// sequential request/response exchanges.
pub struct ControlServer {
    acceptor: TlsAcceptor,
    store: Arc<dyn BindingStore>,
    shutdown: ShutdownController,
}

impl ControlServer {
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn BindingStore>,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
            store,
            shutdown,
        }
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("control server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning
                    tracing::warn!("control accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let store = self.store.clone();
            let shutdown = self.shutdown.clone();
            let guard = self.shutdown.connection_guard();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(acceptor, store, shutdown, guard, stream, peer).await
                {
                    tracing::debug!("control connection from {} ended: {}", peer, e);
                }
            });
        }

        tracing::info!("control server stopped accepting connections");
        Ok(())
    }

    async fn handle_connection(
        acceptor: TlsAcceptor,
        store: Arc<dyn BindingStore>,
        shutdown: ShutdownController,
        _guard: ConnectionGuard,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), ControlProtocolError> {
        let mut tls = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                tracing::warn!("control handshake with {} failed: {}", peer, e);
                return Ok(());
            }
            Err(_) => {
                tracing::warn!("control handshake with {} timed out", peer);
                return Ok(());
            }
        };
        tracing::debug!("control connection from {}", peer);

        loop {
            let request = tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                request = read_frame::<_, ControlRequest>(&mut tls) => request?,
            };
            let Some(request) = request else {
                return Ok(());
            };

            tracing::debug!("{} from {}", request.name(), peer);
            let response = dispatch(store.as_ref(), request).await;
            write_frame(&mut tls, &response).await?;
        }
    }
}

/// Apply one control request to the store.
pub async fn dispatch(store: &dyn BindingStore, request: ControlRequest) -> ControlResponse {
    match request {
        ControlRequest::ListBindings => ControlResponse::Bindings(store.list().await),
        ControlRequest::CreateBinding(binding) => {
            let shown = binding.to_string();
            match store.add(binding).await {
                Ok(()) => ControlResponse::Ack,
                Err(e) => {
                    tracing::warn!(binding = %shown, "rejected binding: {}", e);
                    ControlResponse::Rejected(e.to_string())
                }
            }
        }
        ControlRequest::DeleteBinding(binding) => {
            store.delete(&binding).await;
            ControlResponse::Ack
        }
    }
}
