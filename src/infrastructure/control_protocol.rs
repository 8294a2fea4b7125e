//! Control Protocol
//!
//! Wire format for the scheduler-to-adapter control surface. Each message
//! is a big-endian `u32` length followed by a bincode body. One request is
//! answered by exactly one response on the same connection; connections
//! are reused for many calls.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::entities::Binding;

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Calls the scheduler makes against an adapter. All are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    ListBindings,
    CreateBinding(Binding),
    DeleteBinding(Binding),
}

impl ControlRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListBindings => "list_bindings",
            Self::CreateBinding(_) => "create_binding",
            Self::DeleteBinding(_) => "delete_binding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Bindings(Vec<Binding>),
    Ack,
    /// The adapter refused the request; retrying elsewhere will not help
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ControlProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode failed: {0}")]
    Encode(bincode::Error),
    #[error("decode failed: {0}")]
    Decode(bincode::Error),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Serialize `msg` into a length-prefixed frame.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, ControlProtocolError> {
    let data = bincode::serialize(msg).map_err(ControlProtocolError::Encode)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(ControlProtocolError::FrameTooLarge(data.len()));
    }

    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&data);
    Ok(out)
}

pub fn decode_message<T: DeserializeOwned>(body: &[u8]) -> Result<T, ControlProtocolError> {
    bincode::deserialize(body).map_err(ControlProtocolError::Decode)
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), ControlProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_message(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` if the peer closed the connection
/// cleanly before a new frame started.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ControlProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("connection closed after {} header bytes", filled),
            )
            .into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ControlProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_message(&body).map(Some)
}
