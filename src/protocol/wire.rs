//! Wire format for the TCP peer group
//!
//! Frames are serialized with MessagePack (rmp-serde) and prefixed with a
//! 4-byte little-endian length field:
//!
//! ```text
//! [4 bytes: frame length][N bytes: MessagePack frame]
//! ```
//!
//! # Link Setup
//!
//! ```text
//! Rank a (a > b)                  Rank b
//!     |-------- connect ----------->|
//!     |-------- HELLO(a) ---------->|
//!     |<======= DATA / BARRIER ====>|
//! ```
//!
//! One TCP stream carries both directions of a pair, so every ordered pair of
//! peers sees its messages in send order.

use crate::protocol::{Envelope, Rank};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Both ends of a link must agree on it; bump on breaking wire changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame a peer will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Frames exchanged between peer processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame on every link, sent by the connecting side
    Hello(HelloFrame),
    /// A protocol message
    Data(Envelope),
    /// A peer reached the final barrier (sent to rank 0)
    BarrierEnter { rank: Rank },
    /// Rank 0 saw every peer at the barrier
    BarrierRelease,
}

/// Link handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloFrame {
    pub protocol_version: u32,
    pub rank: Rank,
    pub group_size: usize,
}

/// Serialize a frame to bytes, length prefix included
pub fn serialize_frame(frame: &Frame) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(frame)
        .context("Failed to serialize frame")?;

    let len = u32::try_from(body.len())
        .context("Frame does not fit a u32 length prefix")?;
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(&body);

    Ok(framed)
}

/// Deserialize a frame from bytes
///
/// Returns (frame, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    let Some(len_bytes) = buf.get(..4) else {
        anyhow::bail!("Buffer too small for frame length (need 4 bytes, got {})", buf.len());
    };
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;

    let Some(body) = buf.get(4..4 + len) else {
        anyhow::bail!("Incomplete frame (need {} bytes, got {})", 4 + len, buf.len());
    };

    let frame = rmp_serde::from_slice(body)
        .context("Failed to deserialize frame")?;

    Ok((frame, 4 + len))
}

/// Read one complete frame from a stream
pub async fn read_frame<R>(stream: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await
        .context("Failed to read frame length")?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("Frame too large: {} bytes (max {})", len, MAX_FRAME_LEN);
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await
        .context("Failed to read frame body")?;

    let frame = rmp_serde::from_slice(&body)
        .context("Failed to deserialize frame")?;

    Ok(frame)
}

/// Write one frame to a stream and flush it
pub async fn write_frame<W>(stream: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_frame(frame)?;

    stream.write_all(&framed).await
        .context("Failed to write frame")?;
    stream.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Tag;

    #[test]
    fn test_serialize_deserialize_data() {
        let frame = Frame::Data(Envelope::new(2, 1, Tag::DoWork, Some(137)));

        let bytes = serialize_frame(&frame).unwrap();
        let (decoded, consumed) = deserialize_frame(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_serialize_deserialize_stop() {
        let frame = Frame::Data(Envelope::new(0, 3, Tag::StopWork, None));

        let bytes = serialize_frame(&frame).unwrap();
        let (decoded, _) = deserialize_frame(&bytes).unwrap();

        match decoded {
            Frame::Data(env) => {
                assert_eq!(env.tag, Tag::StopWork);
                assert_eq!(env.payload, None);
                assert_eq!(env.dest, 3);
            }
            other => panic!("Wrong frame type: {:?}", other),
        }
    }

    #[test]
    fn test_tag_travels_as_code() {
        // An envelope with an out-of-range tag code must not decode
        let bytes = rmp_serde::to_vec(&(0usize, 2usize, 7u8, Option::<i64>::None)).unwrap();
        assert!(rmp_serde::from_slice::<Envelope>(&bytes).is_err());

        let bytes = rmp_serde::to_vec(&(0usize, 2usize, 2u8, Option::<i64>::None)).unwrap();
        let env: Envelope = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(env.tag, Tag::StopWork);
    }

    #[test]
    fn test_frame_length_prefix() {
        let bytes = serialize_frame(&Frame::BarrierRelease).unwrap();

        assert!(bytes.len() >= 4);
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + len);
    }

    #[test]
    fn test_incomplete_frame() {
        let bytes = serialize_frame(&Frame::BarrierEnter { rank: 3 }).unwrap();

        assert!(deserialize_frame(&bytes[..2]).is_err());
        assert!(deserialize_frame(&bytes[..bytes.len() - 1]).is_err());
    }

    #[tokio::test]
    async fn test_read_write_stream() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        let hello = Frame::Hello(HelloFrame {
            protocol_version: PROTOCOL_VERSION,
            rank: 2,
            group_size: 4,
        });
        write_frame(&mut a, &hello).await.unwrap();
        write_frame(&mut a, &Frame::Data(Envelope::new(2, 0, Tag::DoWork, Some(2)))).await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap(), hello);
        match read_frame(&mut b).await.unwrap() {
            Frame::Data(env) => assert_eq!(env.payload, Some(2)),
            other => panic!("Wrong frame type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut a, &len).await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(err.to_string().contains("Frame too large"));
    }
}
