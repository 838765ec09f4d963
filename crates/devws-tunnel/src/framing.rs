//! Length-prefixed framing over an ordered byte stream.
//!
//! Each frame is a big-endian `u32` length followed by that many bytes of
//! JSON. The transport underneath can be SSH stdio, OS pipes or a socket;
//! the framing only assumes ordered delivery.

use std::io;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope;

/// Upper bound for a single frame. Anything larger is a protocol violation,
/// not a big message.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Protocol error. Fatal to the session; a partial result is discarded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("stream closed in the middle of a frame")]
    UnexpectedEof,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Write one framed message.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = envelope::encode(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
///
/// Returns `None` on a clean end of stream (EOF exactly on a frame
/// boundary). EOF inside a frame is an error.
///
/// # Errors
/// Returns an error for oversized frames, malformed payloads or I/O
/// failures.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(ProtocolError::Io(err)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::UnexpectedEof);
        }
        Err(err) => return Err(ProtocolError::Io(err)),
    }

    envelope::decode(&payload).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::AgentMessage;
    use devws_core::{LogLevel, LogMessage};

    #[tokio::test]
    async fn roundtrip_preserves_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let messages: Vec<AgentMessage> = (0..5)
            .map(|i| AgentMessage::Log {
                message: LogMessage::new(LogLevel::Info, format!("step {i}")),
            })
            .collect();

        for msg in &messages {
            write_message(&mut client, msg).await.unwrap();
        }
        drop(client);

        let mut received = Vec::new();
        while let Some(msg) = read_message::<_, AgentMessage>(&mut server).await.unwrap() {
            received.push(msg);
        }
        assert_eq!(received, messages);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let write = tokio::spawn(async move {
            let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
            let _ = client.write_all(&len.to_be_bytes()).await;
        });

        let err = read_message::<_, AgentMessage>(&mut server)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
        write.await.unwrap();
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        client.write_all(b"partial").await.unwrap();
        drop(client);

        let err = read_message::<_, AgentMessage>(&mut server)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEof));
    }
}
