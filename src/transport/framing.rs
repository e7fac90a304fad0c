//! Length-prefixed frame reader/writer for the four RPCs.
//!
//! Wire format per frame: `[u32 method_tag][u8 flags][u32 payload_len][payload]`,
//! all integers big-endian. `flags` bit 0 is the continuation bit, set on
//! every frame of a `SendObservations` payload except the last, so a large
//! observation can be streamed across several frames and reassembled by the
//! receiver.

use crate::errors::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

pub const FLAG_CONTINUATION: u8 = 0b0000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MethodTag {
    Ready = 1,
    SendPolicyInstructions = 2,
    SendObservations = 3,
    GetActions = 4,
}

impl MethodTag {
    pub fn from_u32(tag: u32) -> Result<Self, TransportError> {
        match tag {
            1 => Ok(MethodTag::Ready),
            2 => Ok(MethodTag::SendPolicyInstructions),
            3 => Ok(MethodTag::SendObservations),
            4 => Ok(MethodTag::GetActions),
            _ => Err(TransportError::CorruptHeader),
        }
    }
}

pub struct Frame {
    pub method: MethodTag,
    pub continuation: bool,
    pub payload: Vec<u8>,
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    method: MethodTag,
    continuation: bool,
    payload: &[u8],
) -> Result<(), TransportError> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }
    writer.write_u32(method as u32).await?;
    writer
        .write_u8(if continuation { FLAG_CONTINUATION } else { 0 })
        .await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, TransportError> {
    let tag = read_u32_or_eof(reader).await?;
    let method = MethodTag::from_u32(tag)?;
    let flags = reader.read_u8().await?;
    let len = reader.read_u32().await? as usize;
    if len > MAX_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_BYTES,
        });
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| TransportError::PrematureEnd {
            bytes_received: 0,
            bytes_expected: len,
        })?;
    Ok(Frame {
        method,
        continuation: flags & FLAG_CONTINUATION != 0,
        payload,
    })
}

async fn read_u32_or_eof<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, TransportError> {
    let mut buf = [0u8; 4];
    let mut read = 0;
    while read < 4 {
        let n = reader.read(&mut buf[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            return Err(TransportError::PrematureEnd {
                bytes_received: read,
                bytes_expected: 4,
            });
        }
        read += n;
    }
    Ok(u32::from_be_bytes(buf))
}

/// Read and concatenate frames until one with `continuation == false`
/// arrives, reassembling a chunked `SendObservations` payload.
pub async fn read_chunked_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(MethodTag, Vec<u8>), TransportError> {
    let mut buf = Vec::new();
    loop {
        let frame = read_frame(reader).await?;
        buf.extend_from_slice(&frame.payload);
        if !frame.continuation {
            return Ok((frame.method, buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_single_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MethodTag::Ready, false, b"hello")
            .await
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.method, MethodTag::Ready);
        assert!(!frame.continuation);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn reassembles_chunked_payload_across_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MethodTag::SendObservations, true, b"part1-")
            .await
            .unwrap();
        write_frame(&mut buf, MethodTag::SendObservations, false, b"part2")
            .await
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let (method, payload) = read_chunked_payload(&mut cursor).await.unwrap();
        assert_eq!(method, MethodTag::SendObservations);
        assert_eq!(payload, b"part1-part2");
    }

    #[tokio::test]
    async fn rejects_unknown_method_tag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&99u32.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await;
        assert!(matches!(err, Err(TransportError::CorruptHeader)));
    }

    #[tokio::test]
    async fn rejects_oversized_payload_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MethodTag::Ready as u32).to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&((MAX_PAYLOAD_BYTES + 1) as u32).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await;
        assert!(matches!(err, Err(TransportError::PayloadTooLarge { .. })));
    }
}
