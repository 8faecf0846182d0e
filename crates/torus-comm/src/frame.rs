//! Length-prefixed bincode framing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::CommError;

/// Upper bound on a single frame. A 1024x1024 bit board is 128 KiB, so this
/// leaves generous headroom while rejecting garbage length prefixes.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Write one message as a `u32` little-endian length followed by its
/// bincode encoding.
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<(), CommError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(CommError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. An EOF before the length prefix surfaces as an
/// `UnexpectedEof` i/o error, which accept loops treat as a clean hang-up.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, CommError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CommError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        id: u32,
        payload: Vec<u8>,
    }

    #[tokio::test]
    async fn frames_round_trip() {
        let message = Probe {
            id: 7,
            payload: vec![1, 2, 3, 4, 5],
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &message).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: Probe = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn consecutive_frames_do_not_bleed() {
        let first = Probe { id: 1, payload: vec![0xaa; 17] };
        let second = Probe { id: 2, payload: vec![] };

        let mut buf = Vec::new();
        write_frame(&mut buf, &first).await.unwrap();
        write_frame(&mut buf, &second).await.unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame::<Probe, _>(&mut cursor).await.unwrap(), first);
        assert_eq!(read_frame::<Probe, _>(&mut cursor).await.unwrap(), second);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        let mut cursor = Cursor::new(buf);
        let err = read_frame::<Probe, _>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, CommError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn truncated_frame_surfaces_as_io_error() {
        let message = Probe { id: 9, payload: vec![1; 32] };
        let mut buf = Vec::new();
        write_frame(&mut buf, &message).await.unwrap();
        buf.truncate(buf.len() - 8);

        let mut cursor = Cursor::new(buf);
        let err = read_frame::<Probe, _>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, CommError::Io(_)));
    }
}
