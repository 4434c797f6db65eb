//! Outer stream framing: the wire codec (`fabric_wire::Message`) describes a
//! self-delimiting frame's *contents*, but a duplex TCP stream still needs a
//! length prefix to know where one frame ends and the next begins: frames
//! here are length-prefixed rather than flag-delimited.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::PeerError;

/// 4-byte big-endian length prefix ahead of each encoded [`fabric_wire::Message`].
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), PeerError> {
    let len = u32::try_from(bytes.len())
    .map_err(|_| PeerError::Wire(fabric_wire::WireError::MalformedMessage("frame too large to prefix")))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Vec<u8>, PeerError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_size {
        return Err(PeerError::Wire(fabric_wire::WireError::FrameTooLarge(len, max_frame_size)));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrips_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, b"hello").await.unwrap();
        let received = read_frame(&mut server, 1024).await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn read_frame_rejects_oversize_length_prefix() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, &vec![0u8; 100]).await.unwrap();
        let err = read_frame(&mut server, 10).await.unwrap_err();
        assert!(matches!(err, PeerError::Wire(fabric_wire::WireError::FrameTooLarge(100, 10))));
    }
}
