//! RPC Adapter Client
//!
//! Implements AdapterClient over the mutually authenticated control
//! protocol. One client per adapter; it keeps a single connection open and
//! reuses it across calls.

use crate::domain::entities::Binding;
use crate::domain::errors::AdapterError;
use crate::domain::ports::AdapterClient;
use crate::infrastructure::control_protocol::{
    read_frame, write_frame, ControlProtocolError, ControlRequest, ControlResponse,
};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

type Conn = TlsStream<TcpStream>;

/// Control client for one adapter.
///
/// Connection failures are reported per call and never cached: the next
/// call dials again. A call on a reused connection that fails with an I/O
/// error is retried once on a fresh connection, since the adapter may have
/// closed an idle stream. All control calls are idempotent.
pub struct RpcAdapterClient {
    addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    timeout: Duration,
    conn: Mutex<Option<Conn>>,
}

impl RpcAdapterClient {
    /// `common_name` is the name the adapter's certificate is checked against.
    pub fn new(
        addr: impl Into<String>,
        common_name: &str,
        config: Arc<ClientConfig>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let server_name = ServerName::try_from(common_name.to_string())
            .map_err(|e| anyhow::anyhow!("invalid adapter common name {:?}: {}", common_name, e))?;

        Ok(Self {
            addr: addr.into(),
            server_name,
            connector: TlsConnector::from(config),
            timeout,
            conn: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<Conn, AdapterError> {
        let tcp = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| self.transport(e))?;
        tcp.set_nodelay(true).map_err(|e| self.transport(e))?;
        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| self.transport(e))?;
        tracing::debug!(adapter = %self.addr, "control connection established");
        Ok(tls)
    }

    /// The timeout covers the exchange only, not the wait for the
    /// connection, so calls queued behind a slow one are not cut short.
    async fn call(&self, request: &ControlRequest) -> Result<ControlResponse, AdapterError> {
        let mut slot = self.conn.lock().await;
        match tokio::time::timeout(self.timeout, self.exchange(&mut slot, request)).await {
            Ok(result) => result,
            Err(_) => {
                // A half-finished exchange leaves the stream unusable
                *slot = None;
                Err(AdapterError::Timeout {
                    addr: self.addr.clone(),
                    after: self.timeout,
                })
            }
        }
    }

    async fn exchange(
        &self,
        slot: &mut Option<Conn>,
        request: &ControlRequest,
    ) -> Result<ControlResponse, AdapterError> {
        if let Some(mut stream) = slot.take() {
            match round_trip(&mut stream, request).await {
                Ok(response) => {
                    *slot = Some(stream);
                    return Ok(response);
                }
                Err(ControlProtocolError::Io(e)) => {
                    tracing::debug!(adapter = %self.addr, "stale control connection: {}", e);
                }
                Err(e) => return Err(self.protocol(e)),
            }
        }

        let mut stream = self.connect().await?;
        let response = round_trip(&mut stream, request).await.map_err(|e| match e {
            ControlProtocolError::Io(e) => self.transport(e),
            other => self.protocol(other),
        })?;
        *slot = Some(stream);
        Ok(response)
    }

    fn transport(&self, e: impl std::fmt::Display) -> AdapterError {
        AdapterError::Transport {
            addr: self.addr.clone(),
            reason: e.to_string(),
        }
    }

    fn protocol(&self, e: impl std::fmt::Display) -> AdapterError {
        AdapterError::Protocol {
            addr: self.addr.clone(),
            reason: e.to_string(),
        }
    }

    fn unexpected(&self, request: &ControlRequest, response: ControlResponse) -> AdapterError {
        match response {
            ControlResponse::Rejected(reason) => AdapterError::Rejected {
                addr: self.addr.clone(),
                reason,
            },
            other => self.protocol(format!("unexpected reply to {}: {:?}", request.name(), other)),
        }
    }
}

async fn round_trip(
    stream: &mut Conn,
    request: &ControlRequest,
) -> Result<ControlResponse, ControlProtocolError> {
    write_frame(stream, request).await?;
    read_frame(stream).await?.ok_or_else(|| {
        ControlProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "adapter closed the connection",
        ))
    })
}

#[async_trait]
impl AdapterClient for RpcAdapterClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn list(&self) -> Result<Vec<Binding>, AdapterError> {
        let request = ControlRequest::ListBindings;
        match self.call(&request).await? {
            ControlResponse::Bindings(bindings) => Ok(bindings),
            other => Err(self.unexpected(&request, other)),
        }
    }

    async fn create(&self, binding: &Binding) -> Result<(), AdapterError> {
        let request = ControlRequest::CreateBinding(binding.clone());
        match self.call(&request).await? {
            ControlResponse::Ack => Ok(()),
            other => Err(self.unexpected(&request, other)),
        }
    }

    async fn delete(&self, binding: &Binding) -> Result<(), AdapterError> {
        let request = ControlRequest::DeleteBinding(binding.clone());
        match self.call(&request).await? {
            ControlResponse::Ack => Ok(()),
            other => Err(self.unexpected(&request, other)),
        }
    }
}
