//! Length-prefixed frame codec shared by every AI-OS daemon.
//!
//! Frame layout: `[u32 big-endian length][payload]`. The payload is a UTF-8
//! JSON object. The same layout is used in both directions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Payload cap for the agent daemon (64 KiB)
pub const AGENT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    TooLarge { len: usize, max: usize },

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Protocol violations close the connection silently; everything else is transport.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, FrameError::TooLarge { .. } | FrameError::Json(_))
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before
/// sending any header byte. The length is checked against `max` before any
/// payload byte is read or allocated.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(Some(payload)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(e.into()),
    }
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it as JSON.
pub async fn read_json<R, T>(reader: &mut R, max: usize) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max).await? {
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
        None => Ok(None),
    }
}

/// Encode a value as JSON and write it as one frame.
pub async fn write_json<W, T>(writer: &mut W, value: &T, max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload, max).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frame_layout_is_big_endian() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"{}", 64).await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, vec![0, 0, 0, 2, b'{', b'}']);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let frame = read_frame(&mut server, 64).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_before_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&(1_000_000u32).to_be_bytes()).await.unwrap();

        let err = read_frame(&mut server, AGENT_MAX_MESSAGE_SIZE).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { len: 1_000_000, .. }));
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_truncated_header_and_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server, 64).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated));

        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 10, b'{']).await.unwrap();
        drop(client);
        let err = read_frame(&mut server, 64).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[tokio::test]
    async fn test_sequential_frames_on_one_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_json(&mut client, &serde_json::json!({"cmd": "status"}), 1024)
            .await
            .unwrap();
        write_json(&mut client, &serde_json::json!({"cmd": "clear"}), 1024)
            .await
            .unwrap();

        let first: serde_json::Value = read_json(&mut server, 1024).await.unwrap().unwrap();
        let second: serde_json::Value = read_json(&mut server, 1024).await.unwrap().unwrap();
        assert_eq!(first["cmd"], "status");
        assert_eq!(second["cmd"], "clear");
    }

    #[tokio::test]
    async fn test_write_refuses_oversized_payload() {
        let (mut client, _server) = tokio::io::duplex(64);
        let err = write_frame(&mut client, &[b'x'; 65], 64).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { len: 65, max: 64 }));
    }
}
