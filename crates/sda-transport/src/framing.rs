//! `[4-byte big-endian length][payload]` framing shared by the UDP
//! broadcast channel and the fast TCP side-channel.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, TransportError};

/// Maximum UDP datagram payload size (65 507 bytes, the largest UDP payload
/// that fits in a single IPv4 datagram).
pub const MAX_UDP_SIZE: usize = 65_507;

/// Prefix `payload` with its 4-byte big-endian length.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parse a single framed message out of a full in-memory buffer (used for
/// UDP datagrams, which arrive as one indivisible buffer).
///
/// # Errors
///
/// Returns [`TransportError::ProtocolViolation`] if the advertised length
/// does not match the remaining buffer.
pub fn unframe(buf: &[u8]) -> Result<&[u8]> {
    if buf.len() < 4 {
        return Err(TransportError::ProtocolViolation(
            "frame shorter than length prefix".to_string(),
        ));
    }
    let (len_bytes, rest) = buf.split_at(4);
    let advertised = u32::from_be_bytes(len_bytes.try_into().expect("4 bytes")) as usize;
    if advertised != rest.len() {
        return Err(TransportError::ProtocolViolation(format!(
            "advertised length {advertised} does not match remaining {} bytes",
            rest.len()
        )));
    }
    Ok(rest)
}

/// Write one framed message to an async stream (used by the fast TCP
/// side-channel, whose messages do not arrive as one indivisible datagram).
pub async fn write_framed<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message from an async stream.
pub async fn read_framed<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_unframe_roundtrip() {
        let payload = b"hello world";
        let framed = frame(payload);
        assert_eq!(unframe(&framed).unwrap(), payload);
    }

    #[test]
    fn unframe_rejects_truncated() {
        assert!(unframe(&[0, 0, 0]).is_err());
    }

    #[test]
    fn unframe_rejects_mismatched_length() {
        let mut framed = frame(b"hello");
        framed.push(0xff); // trailing garbage byte not accounted for
        assert!(unframe(&framed).is_err());
    }

    #[tokio::test]
    async fn write_read_framed_roundtrip() {
        let mut buf = Vec::new();
        write_framed(&mut buf, b"payload").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_framed(&mut cursor).await.unwrap();
        assert_eq!(out, b"payload");
    }
}
