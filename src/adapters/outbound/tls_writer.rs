//! TLS Egress Writer
//!
//! Implements LogWriter by writing octet-counted syslog frames over a TLS
//! stream to the binding's drain. The connection is dialed lazily and
//! redialed on the first write after a failure.

use crate::domain::entities::{Binding, LogEnvelope, WriterState};
use crate::domain::errors::{WriteError, WriterCreationError};
use crate::domain::ports::{LogWriter, WriterFactory};
use crate::domain::services::syslog::encode_frame;
use crate::domain::value_objects::DrainUrl;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Builds a [`TlsWriter`] per binding.
pub struct TlsWriterFactory {
    connector: TlsConnector,
    dial_timeout: Duration,
    write_timeout: Duration,
}

impl TlsWriterFactory {
    pub fn new(config: Arc<ClientConfig>, dial_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(config),
            dial_timeout,
            write_timeout,
        }
    }
}

impl WriterFactory for TlsWriterFactory {
    fn create(&self, binding: &Binding) -> Result<Arc<dyn LogWriter>, WriterCreationError> {
        let url = DrainUrl::parse(&binding.drain)?;
        let server_name = ServerName::try_from(url.host().to_string())
            .map_err(|e| WriterCreationError::Tls(format!("{}: {}", url.host(), e)))?;

        Ok(Arc::new(TlsWriter {
            binding: binding.clone(),
            addr: url.addr(),
            server_name,
            connector: self.connector.clone(),
            conn: Mutex::new(None),
            state: AtomicU8::new(WriterState::Connecting.as_u8()),
            closed: AtomicBool::new(false),
            dial_timeout: self.dial_timeout,
            write_timeout: self.write_timeout,
        }))
    }
}

/// Egress connection for one binding.
///
/// Writes are serialized through the connection slot so frames never
/// interleave on the wire.
pub struct TlsWriter {
    binding: Binding,
    addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    conn: Mutex<Option<TlsStream<TcpStream>>>,
    state: AtomicU8,
    closed: AtomicBool,
    dial_timeout: Duration,
    write_timeout: Duration,
}

impl TlsWriter {
    fn set_state(&self, state: WriterState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    async fn dial(&self) -> Result<TlsStream<TcpStream>, WriteError> {
        self.set_state(WriterState::Connecting);

        let connect = async {
            let tcp = TcpStream::connect(&self.addr).await?;
            tcp.set_nodelay(true)?;
            self.connector.connect(self.server_name.clone(), tcp).await
        };

        match tokio::time::timeout(self.dial_timeout, connect).await {
            Ok(Ok(stream)) => {
                tracing::debug!(drain = %self.binding.drain, "drain connection established");
                Ok(stream)
            }
            Ok(Err(e)) => Err(WriteError::Dial {
                addr: self.addr.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(WriteError::Timeout {
                op: "dial",
                addr: self.addr.clone(),
                after: self.dial_timeout,
            }),
        }
    }
}

#[async_trait]
impl LogWriter for TlsWriter {
    async fn write(&self, envelope: &LogEnvelope) -> Result<(), WriteError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriteError::Closed);
        }

        let frame = encode_frame(&self.binding, envelope);
        let mut conn = self.conn.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriteError::Closed);
        }

        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => match self.dial().await {
                Ok(stream) => stream,
                Err(e) => {
                    self.set_state(WriterState::Errored);
                    return Err(e);
                }
            },
        };

        let send = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        };

        match tokio::time::timeout(self.write_timeout, send).await {
            Ok(Ok(())) => {
                *conn = Some(stream);
                self.set_state(WriterState::Open);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(WriterState::Errored);
                Err(WriteError::Io {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.set_state(WriterState::Errored);
                Err(WriteError::Timeout {
                    op: "write",
                    addr: self.addr.clone(),
                    after: self.write_timeout,
                })
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut conn = self.conn.lock().await;
        if let Some(mut stream) = conn.take() {
            // Best effort close_notify; the socket is dropped either way
            let _ = tokio::time::timeout(self.write_timeout, stream.shutdown()).await;
        }
        self.set_state(WriterState::Closed);
    }

    fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::SeqCst))
    }
}
