//! Log Ingress Adapter
//!
//! Accepts mutually authenticated TLS streams of log envelopes from the
//! log pipeline and hands each one to the adapter's sink. Frames use the
//! control protocol's length-prefixed bincode encoding, one `LogEnvelope`
//! per frame, with no replies.

use crate::domain::entities::LogEnvelope;
use crate::domain::ports::LogSink;
use crate::infrastructure::control_protocol::{read_frame, ControlProtocolError};
use crate::infrastructure::shutdown::{ConnectionGuard, ShutdownController};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Ingress server for envelope streams.
///
/// A connection stays open for as long as the sender keeps it open. A
/// frame that does not decode ends that connection only.
pub struct LogIngressServer {
    acceptor: TlsAcceptor,
    sink: Arc<dyn LogSink>,
    shutdown: ShutdownController,
}

impl LogIngressServer {
    pub fn new(config: Arc<ServerConfig>, sink: Arc<dyn LogSink>, shutdown: ShutdownController) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
            sink,
            shutdown,
        }
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("log ingress listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("ingress accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let sink = self.sink.clone();
            let shutdown = self.shutdown.clone();
            let guard = self.shutdown.connection_guard();

            tokio::spawn(async move {
                match Self::handle_stream(acceptor, sink, shutdown, guard, stream, peer).await {
                    Ok(received) => {
                        tracing::debug!(received, "ingress stream from {} closed", peer)
                    }
                    Err(e) => tracing::warn!("ingress stream from {} dropped: {}", peer, e),
                }
            });
        }

        tracing::info!("log ingress stopped accepting connections");
        Ok(())
    }

    /// Returns how many envelopes the stream carried.
    async fn handle_stream(
        acceptor: TlsAcceptor,
        sink: Arc<dyn LogSink>,
        shutdown: ShutdownController,
        _guard: ConnectionGuard,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<u64, ControlProtocolError> {
        let mut tls = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                tracing::warn!("ingress handshake with {} failed: {}", peer, e);
                return Ok(0);
            }
            Err(_) => {
                tracing::warn!("ingress handshake with {} timed out", peer);
                return Ok(0);
            }
        };

        let mut received = 0u64;
        loop {
            let frame = tokio::select! {
                _ = shutdown.wait() => return Ok(received),
                frame = read_frame::<_, LogEnvelope>(&mut tls) => frame?,
            };
            let Some(envelope) = frame else {
                return Ok(received);
            };

            received += 1;
            sink.dispatch(&envelope).await;
        }
    }
}
